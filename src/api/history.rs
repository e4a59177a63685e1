use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

use crate::api::{error::ApiError, ApiState};
use crate::data::Storage;
use crate::error::{StorageError, ValidationError};

/// Format of the `start` and `end` query parameters, local wall clock time.
pub const QUERY_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub timestamp: NaiveDateTime,
    pub tag_name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Time span actually covered by the returned rows, empty when there are none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualRange {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub data: Vec<HistoryRow>,
    pub query_range: QueryRange,
    pub actual_range: ActualRange,
}

fn parse_bound(field: &'static str, raw: Option<&str>) -> Result<NaiveDateTime, ValidationError> {
    let raw = raw
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or(ValidationError::MissingBound)?;

    NaiveDateTime::parse_from_str(raw, QUERY_FORMAT).map_err(|_| ValidationError::BadFormat {
        field,
        value: raw.to_string(),
    })
}

pub fn parse_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(NaiveDateTime, NaiveDateTime), ValidationError> {
    let start = parse_bound("start", start)?;
    let end = parse_bound("end", end)?;

    if start > end {
        return Err(ValidationError::InvertedRange {
            start: start.format(QUERY_FORMAT).to_string(),
            end: end.format(QUERY_FORMAT).to_string(),
        });
    }

    Ok((start, end))
}

/// Merges the history of every tag into one sequence ordered by timestamp.
/// Rows sharing a timestamp keep the order of `tags`.
pub fn query_history(
    storage: &Storage,
    tags: &[String],
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<HistoryResponse, StorageError> {
    let mut data = vec![];

    for tag in tags {
        let summary = storage.reading_summary(Some(tag))?;
        debug!(
            "Tag {} holds {} readings between {:?} and {:?}",
            tag, summary.count, summary.first, summary.last
        );

        let points = storage.get_historical_data(tag, start, end)?;
        debug!("Found {} readings of {} in requested range", points.len(), tag);

        data.extend(points.into_iter().map(|point| HistoryRow {
            timestamp: point.timestamp,
            tag_name: tag.clone(),
            value: point.value,
        }));
    }

    data.sort_by_key(|row| row.timestamp);

    let actual_range = ActualRange {
        start: data.first().map(|row| row.timestamp),
        end: data.last().map(|row| row.timestamp),
    };

    Ok(HistoryResponse {
        data,
        query_range: QueryRange { start, end },
        actual_range,
    })
}

pub async fn get_history(
    State(state): State<Arc<ApiState>>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(params) = params?;
    let (start, end) = parse_range(params.start.as_deref(), params.end.as_deref())?;

    // sqlite calls block, keep them off the async workers
    let storage = state.storage.clone();
    let tags = state.tags.clone();
    let response = tokio::task::spawn_blocking(move || query_history(&storage, &tags, start, end))
        .await
        .map_err(|err| {
            error!("History query task failed: {}", err);
            ApiError::internal("Couldn't fetch historical data")
        })?
        .map_err(|err| {
            error!("Error fetching historical data: {}", err);
            ApiError::internal("Couldn't fetch historical data")
        })?;

    Ok(Json(response))
}
