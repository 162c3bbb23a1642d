//! Health Check Endpoint
//!
//! 프로세스 상태 + 의존성(DB) 상태 확인. DB가 설정되지 않은 경우
//! `database.configured = false`로 보고하고 상태는 healthy.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

/// Health check 응답
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: DatabaseStatus,
    pub accepted_schema_versions: Vec<u32>,
    pub freshness_window_secs: u64,
    pub events_emitted: u64,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct DatabaseStatus {
    pub configured: bool,
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// GET /health
pub async fn health_check(
    State(state): State<AppState>,
) -> Json<HealthResponse> {
    let db_status = match &state.db {
        Some(db) => {
            let db_start = std::time::Instant::now();
            match db.health_check().await {
                Ok(_) => DatabaseStatus {
                    configured: true,
                    connected: true,
                    latency_ms: Some(db_start.elapsed().as_millis() as u64),
                },
                Err(_) => DatabaseStatus {
                    configured: true,
                    connected: false,
                    latency_ms: None,
                },
            }
        }
        None => DatabaseStatus {
            configured: false,
            connected: false,
            latency_ms: None,
        },
    };

    let degraded = db_status.configured && !db_status.connected;

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "healthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status,
        accepted_schema_versions: state.protocol.governor.accepted_versions(),
        freshness_window_secs: state.protocol.escrow.freshness_window(),
        events_emitted: state.protocol.events.emitted(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
