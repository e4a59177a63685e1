use chrono::SubsecRound;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::data::Storage;
use crate::feed::{LiveFeed, Snapshot};
use crate::link::{LinkState, PlcLink, TagDriver, TagRead};
use crate::model::TagMetadata;

/// What happened during one poll cycle.
#[derive(Debug, Default, PartialEq)]
pub struct CycleReport {
    pub connected: bool,
    pub read: usize,
    pub absent: usize,
    pub persisted: usize,
    pub without_metadata: usize,
    pub published: Option<Snapshot>,
}

pub struct Poller<D: TagDriver> {
    link: PlcLink<D>,
    storage: Storage,
    feed: LiveFeed,
    analog_tags: Vec<String>,
    boolean_tags: Vec<String>,
    metadata: HashMap<String, TagMetadata>,
    unknown_metadata: HashSet<String>,
    interval: Duration,
    state_tx: watch::Sender<LinkState>,
}

impl<D: TagDriver> Poller<D> {
    pub fn new(
        link: PlcLink<D>,
        storage: Storage,
        feed: LiveFeed,
        analog_tags: Vec<String>,
        boolean_tags: Vec<String>,
        interval: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(link.state());

        Poller {
            link,
            storage,
            feed,
            analog_tags,
            boolean_tags,
            metadata: HashMap::new(),
            unknown_metadata: HashSet::new(),
            interval,
            state_tx,
        }
    }

    /// Seeds the metadata cache so reads don't go to storage.
    pub fn with_metadata(mut self, metadata: Vec<TagMetadata>) -> Self {
        self.metadata = metadata
            .into_iter()
            .map(|record| (record.info.tag_name.clone(), record))
            .collect();
        self
    }

    /// Read-only view of the link state, for the status endpoint.
    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    pub fn link(&self) -> &PlcLink<D> {
        &self.link
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.link.state());
    }

    /// Polls until `shutdown` flips to true or its sender goes away. A cycle
    /// already running is always finished before leaving.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let span = info_span!("Poller", interval = ?self.interval);

        async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                let report = self.poll_once().await;
                debug!(
                    "Cycle done: {} read, {} absent, {} persisted",
                    report.read, report.absent, report.persisted
                );
            }

            info!("Polling stopped, closing PLC link");
            self.link.close().await;
            self.publish_state();
        }
        .instrument(span)
        .await
    }

    pub async fn poll_once(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        if !self.link.is_connected() {
            self.state_tx.send_replace(LinkState::Connecting);
            let connected = self.link.connect().await;
            self.publish_state();
            if !connected {
                return report;
            }
        }
        report.connected = true;

        let mut reads = vec![];
        for tags in [self.analog_tags.clone(), self.boolean_tags.clone()] {
            match self.link.read_batch(&tags).await {
                Ok(batch) => reads.extend(batch),
                Err(err) => {
                    warn!("Batch read failed, will reconnect next cycle: {}", err);
                    break;
                }
            }
        }
        self.publish_state();

        // Storage keeps microseconds, live subscribers get the same instant
        let timestamp = chrono::Local::now().naive_local().trunc_subsecs(6);
        let mut snapshot = Snapshot::new(timestamp);

        for TagRead { tag_name, value } in reads {
            report.read += 1;

            let value = match value {
                Ok(value) => value,
                Err(err) => {
                    warn!("Invalid value for tag {}: {}", tag_name, err);
                    report.absent += 1;
                    continue;
                }
            };

            if !self.has_metadata(&tag_name) {
                report.without_metadata += 1;
            }

            match self
                .storage
                .save_reading(&tag_name, value.as_f64(), value.kind(), timestamp)
            {
                Ok(_) => report.persisted += 1,
                Err(err) => error!("Couldn't persist reading of {}: {}", tag_name, err),
            }

            snapshot.insert(tag_name, value);
        }

        if !snapshot.is_empty() {
            let receivers = self.feed.publish(snapshot.clone());
            debug!("Snapshot of {} tags sent to {} subscribers", snapshot.len(), receivers);
            report.published = Some(snapshot);
        }

        report
    }

    /// Cache first, storage once per unknown tag. A missing record never
    /// stops the reading from being stored.
    fn has_metadata(&mut self, tag_name: &str) -> bool {
        if self.metadata.contains_key(tag_name) {
            return true;
        }

        if self.unknown_metadata.contains(tag_name) {
            return false;
        }

        match self.storage.get_tag_metadata(tag_name) {
            Ok(Some(record)) => {
                self.metadata.insert(tag_name.to_string(), record);
                true
            }
            Ok(None) => {
                warn!("No metadata found for tag {}, storing reading without it", tag_name);
                self.unknown_metadata.insert(tag_name.to_string());
                false
            }
            Err(err) => {
                warn!("Couldn't look up metadata for tag {}: {}", tag_name, err);
                false
            }
        }
    }
}
