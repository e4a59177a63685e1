use std::time::Duration;

use thiserror::Error;

/// The link could not be opened or the canary read did not succeed.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("couldn't open link: {0}")]
    Open(String),
    #[error("opening link timed out after {0:?}")]
    Timeout(Duration),
    #[error("canary read of {tag} failed: {source}")]
    Canary {
        tag: String,
        #[source]
        source: LinkError,
    },
    #[error("canary tag {tag} returned no value: {source}")]
    CanaryAbsent {
        tag: String,
        #[source]
        source: DataQualityError,
    },
}

/// Transport level failure in the middle of a session.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link is not connected")]
    NotConnected,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("read timed out after {0:?}")]
    Timeout(Duration),
    #[error("driver answered {got} values for {expected} requested tags")]
    LengthMismatch { expected: usize, got: usize },
}

/// A single tag could not be read. The rest of the batch is unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataQualityError {
    #[error("tag is not mapped on the controller")]
    UnknownTag,
    #[error("device answered with exception {0}")]
    Exception(String),
    #[error("couldn't decode value: {0}")]
    Decode(String),
    #[error("device returned no value")]
    Missing,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("couldn't get a db connection: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored timestamp {0:?} is malformed")]
    Timestamp(String),
    #[error("stored tag kind {0:?} is unknown")]
    Kind(String),
}

/// Malformed history query input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Start and end dates are required")]
    MissingBound,
    #[error("{field} date {value:?} doesn't match format YYYY-MM-DD HH:MM")]
    BadFormat { field: &'static str, value: String },
    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: String, end: String },
}
