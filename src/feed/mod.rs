use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::model::Value;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotValues {
    pub analog: BTreeMap<String, f64>,
    pub boolean: BTreeMap<String, bool>,
}

/// Every value obtained in one poll cycle, under a single timestamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: NaiveDateTime,
    pub values: SnapshotValues,
}

impl Snapshot {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Snapshot {
            timestamp,
            values: SnapshotValues::default(),
        }
    }

    pub fn insert(&mut self, tag_name: String, value: Value) {
        match value {
            Value::Analog(analog) => {
                self.values.analog.insert(tag_name, analog);
            }
            Value::Boolean(boolean) => {
                self.values.boolean.insert(tag_name, boolean);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.analog.len() + self.values.boolean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fan-out of snapshots to live subscribers.
///
/// Each subscriber has its own bounded queue; one that falls behind loses the
/// oldest snapshots instead of slowing the publisher.
#[derive(Clone)]
pub struct LiveFeed {
    sender: broadcast::Sender<Arc<Snapshot>>,
}

impl LiveFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        LiveFeed { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Returns how many subscribers the snapshot was queued for.
    pub fn publish(&self, snapshot: Snapshot) -> usize {
        match self.sender.send(Arc::new(snapshot)) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No live subscribers, snapshot dropped");
                0
            }
        }
    }
}
