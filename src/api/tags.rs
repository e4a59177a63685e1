use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::api::{error::ApiError, ApiState};
use crate::link::LinkState;
use crate::model::{TagMetadata, TagReading};

pub async fn list_tags(State(state): State<Arc<ApiState>>) -> Result<Json<Vec<TagMetadata>>, ApiError> {
    let metadata = state.storage.get_all_tag_metadata().map_err(|err| {
        error!("Error listing tag metadata: {}", err);
        ApiError::internal("Access to db failed")
    })?;

    Ok(Json(metadata))
}

pub async fn get_tag(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<Json<TagMetadata>, ApiError> {
    let metadata = state.storage.get_tag_metadata(&name).map_err(|err| {
        error!("Error reading metadata of {}: {}", name, err);
        ApiError::internal("Access to db failed")
    })?;

    metadata
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Tag metadata not found"))
}

pub async fn get_latest(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<Json<TagReading>, ApiError> {
    if !state.tags.contains(&name) {
        return Err(ApiError::not_found("Tag was not configured"));
    }

    let reading = state.storage.get_latest_reading(&name).map_err(|err| {
        error!("Error reading latest value of {}: {}", name, err);
        ApiError::internal("Access to db failed")
    })?;

    reading
        .map(Json)
        .ok_or_else(|| ApiError::not_found("No readings for tag"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub link_state: LinkState,
    pub live_subscribers: usize,
    pub configured_tags: usize,
}

pub async fn get_status(State(state): State<Arc<ApiState>>) -> Json<Status> {
    Json(Status {
        link_state: *state.link_state.borrow(),
        live_subscribers: state.feed.subscriber_count(),
        configured_tags: state.tags.len(),
    })
}
