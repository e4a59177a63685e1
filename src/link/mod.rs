//! Connection to the controller.
//!
//! [`PlcLink`] owns a [`TagDriver`] and the connection state machine. Every
//! failure collapses the link back to [`LinkState::Disconnected`]; reconnecting
//! is left to the caller's next cycle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, DataQualityError, LinkError};
use crate::model::Value;

pub mod decode;
pub mod modbus;

pub use modbus::ModbusDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of reading one tag inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRead {
    pub tag_name: String,
    pub value: Result<Value, DataQualityError>,
}

impl TagRead {
    pub fn present(tag_name: impl Into<String>, value: Value) -> Self {
        TagRead {
            tag_name: tag_name.into(),
            value: Ok(value),
        }
    }

    pub fn absent(tag_name: impl Into<String>, reason: DataQualityError) -> Self {
        TagRead {
            tag_name: tag_name.into(),
            value: Err(reason),
        }
    }

    pub fn value(&self) -> Option<Value> {
        self.value.as_ref().ok().copied()
    }

    /// NaN and infinities can't be stored or sent as numbers, they count as absent.
    fn finite(self) -> Self {
        match self.value {
            Ok(Value::Analog(analog)) if !analog.is_finite() => TagRead {
                value: Err(DataQualityError::Decode(format!("{} is not a finite value", analog))),
                ..self
            },
            _ => self,
        }
    }
}

/// Request/response access to a controller.
///
/// Implementations must answer `read` with exactly one [`TagRead`] per
/// requested tag, in request order. Per-tag faults go inside the `TagRead`;
/// only transport failures are returned as `Err`.
#[async_trait]
pub trait TagDriver: Send {
    async fn open(&mut self) -> Result<(), ConnectionError>;

    async fn read(&mut self, tags: &[String]) -> Result<Vec<TagRead>, LinkError>;

    async fn close(&mut self) -> Result<(), LinkError>;
}

pub struct PlcLink<D: TagDriver> {
    driver: D,
    state: LinkState,
    canary_tag: String,
    timeout: Duration,
}

async fn bounded<T, E>(
    timeout: Duration,
    future: impl Future<Output = Result<T, E>>,
    on_timeout: E,
) -> Result<T, E> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout),
    }
}

impl<D: TagDriver> PlcLink<D> {
    pub fn new(driver: D, canary_tag: String, timeout: Duration) -> Self {
        PlcLink {
            driver,
            state: LinkState::Disconnected,
            canary_tag,
            timeout,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Opens the driver and verifies it with a canary read. Never fails past
    /// this point, problems are logged and reported as `false`.
    pub async fn connect(&mut self) -> bool {
        self.state = LinkState::Connecting;
        info!("Connecting to PLC");

        match self.try_connect().await {
            Ok(()) => {
                self.state = LinkState::Connected;
                info!("Connected to PLC");
                true
            }
            Err(err) => {
                warn!("Couldn't connect to PLC: {}", err);
                self.close().await;
                false
            }
        }
    }

    async fn try_connect(&mut self) -> Result<(), ConnectionError> {
        bounded(
            self.timeout,
            self.driver.open(),
            ConnectionError::Timeout(self.timeout),
        )
        .await?;

        let canary = vec![self.canary_tag.clone()];
        let reads = bounded(
            self.timeout,
            self.driver.read(&canary),
            LinkError::Timeout(self.timeout),
        )
        .await
        .map_err(|source| ConnectionError::Canary {
            tag: self.canary_tag.clone(),
            source,
        })?;

        match reads.into_iter().next().map(TagRead::finite) {
            Some(TagRead { value: Ok(value), .. }) => {
                debug!("Canary {} read {:?}", self.canary_tag, value);
                Ok(())
            }
            Some(TagRead { value: Err(source), .. }) => Err(ConnectionError::CanaryAbsent {
                tag: self.canary_tag.clone(),
                source,
            }),
            None => Err(ConnectionError::CanaryAbsent {
                tag: self.canary_tag.clone(),
                source: DataQualityError::Missing,
            }),
        }
    }

    /// Reads every tag in one driver request. The result lines up 1:1 with
    /// `tags`. On `Err` the link is already closed and `Disconnected`.
    pub async fn read_batch(&mut self, tags: &[String]) -> Result<Vec<TagRead>, LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }

        if tags.is_empty() {
            return Ok(vec![]);
        }

        let result = bounded(
            self.timeout,
            self.driver.read(tags),
            LinkError::Timeout(self.timeout),
        )
        .await
        .and_then(|reads| {
            if reads.len() == tags.len() {
                Ok(reads.into_iter().map(TagRead::finite).collect())
            } else {
                Err(LinkError::LengthMismatch {
                    expected: tags.len(),
                    got: reads.len(),
                })
            }
        });

        if let Err(err) = &result {
            warn!("PLC read failed, dropping connection: {}", err);
            self.close().await;
        }

        result
    }

    /// Releases the driver. Safe to call any number of times.
    pub async fn close(&mut self) {
        if let Err(err) = bounded(
            self.timeout,
            self.driver.close(),
            LinkError::Timeout(self.timeout),
        )
        .await
        {
            warn!("Error closing PLC connection: {}", err);
        }
        self.state = LinkState::Disconnected;
    }
}
