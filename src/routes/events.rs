//! Event Endpoints
//!
//! - `/events`: 프로세스 내 journal (sequence 기반 페이지네이션)
//! - `/events/history/:key`: DB 인덱스 조회 (loan id 또는 subject 주소)

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::{EventRepository, EventRow},
    error::ApiError,
    services::EventRecord,
    AppState,
};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub since: Option<u64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<EventRecord>,
    /// 다음 페이지 시작 sequence
    pub next: u64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub key: String,
    pub events: Vec<EventRow>,
}

/// GET /events?since=&limit=
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let since = query.since.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let mut events = state.protocol.events.events_since(since);
    events.truncate(limit);

    let next = events.last().map(|r| r.sequence + 1).unwrap_or(since);

    Json(EventsResponse { events, next })
}

/// GET /events/history/:key?limit=
pub async fn get_indexed_history(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let db = state
        .db
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("event index".to_string()))?;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT as u32).min(MAX_LIMIT as u32);
    let events = db.find_by_key(&key, limit).await?;

    Ok(Json(HistoryResponse { key, events }))
}
