//! Polls a PLC for tag values, stores every reading in SQLite, streams each
//! poll cycle to live subscribers and answers historical range queries.

pub mod api;
pub mod common;
pub mod data;
pub mod error;
pub mod feed;
pub mod link;
pub mod model;
pub mod poller;
