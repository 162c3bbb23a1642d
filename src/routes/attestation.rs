//! Attestation Endpoints
//!
//! 증명 환경이 만든 proof + public outputs를 registry에 제출하고 자격을 조회.
//!
//! # Privacy Note
//!
//! - 원본 행동 데이터와 정확한 계산 과정은 절대 전송되지 않음
//! - 서버는 public outputs (score commitment, nullifier, version 등)만 봄

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    services::{Attestation, PublicOutputs},
    types::{amount_str, decode_hex, Address},
    AppState,
};

// ============ Request/Response Types ============

/// attestation 제출 요청
#[derive(Debug, Deserialize)]
pub struct SubmitAttestationRequest {
    pub subject: Address,
    /// proof bytes (hex)
    pub proof: String,
    pub public_outputs: PublicOutputs,
}

#[derive(Debug, Serialize)]
pub struct AttestationResponse {
    pub attestation: Attestation,
}

/// 자격 조회 쿼리
#[derive(Debug, Deserialize)]
pub struct EligibilityQuery {
    /// 비교할 최소 score (옵션)
    pub threshold: Option<String>,
    /// freshness window (초, 기본값: 서버 설정)
    pub max_age: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct EligibilityResponse {
    pub subject: Address,
    pub eligible: bool,
    pub fresh: bool,
    pub max_age: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meets_threshold: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", with = "opt_amount")]
    pub threshold: Option<u128>,
}

mod opt_amount {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Option<u128>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => super::amount_str::serialize(v, serializer),
            None => serializer.serialize_none(),
        }
    }
}

// ============ Handlers ============

/// POST /attestations
///
/// # Flow
///
/// 1. proof hex 디코딩
/// 2. registry.submit_attestation (검증 → nullifier → version)
/// 3. 기록된 attestation 반환
pub async fn submit_attestation(
    State(state): State<AppState>,
    Json(req): Json<SubmitAttestationRequest>,
) -> Result<(StatusCode, Json<AttestationResponse>), ApiError> {
    let proof = decode_hex(&req.proof)
        .map_err(|_| ApiError::BadRequest("proof must be hex encoded".to_string()))?;

    let _turn = state.sequencer.lock().await;
    let registry = &state.protocol.registry;

    registry.submit_attestation(&req.subject, &proof, &req.public_outputs)?;

    let attestation = registry
        .attestation(&req.subject)
        .ok_or(ApiError::InternalError)?;

    Ok((StatusCode::CREATED, Json(AttestationResponse { attestation })))
}

/// GET /attestations/:subject
pub async fn get_attestation(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> Result<Json<AttestationResponse>, ApiError> {
    let subject = Address::new(&subject)?;

    let attestation = state
        .protocol
        .registry
        .attestation(&subject)
        .ok_or_else(|| ApiError::NotFound(format!("attestation for {}", subject)))?;

    Ok(Json(AttestationResponse { attestation }))
}

/// GET /attestations/:subject/eligibility?threshold=&max_age=
pub async fn get_eligibility(
    State(state): State<AppState>,
    Path(subject): Path<String>,
    Query(query): Query<EligibilityQuery>,
) -> Result<Json<EligibilityResponse>, ApiError> {
    let subject = Address::new(&subject)?;
    let registry = &state.protocol.registry;

    let threshold = query
        .threshold
        .as_deref()
        .map(|raw| {
            raw.parse::<u128>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid number: {}", raw)))
        })
        .transpose()?;
    let max_age = query
        .max_age
        .unwrap_or_else(|| state.protocol.escrow.freshness_window());

    Ok(Json(EligibilityResponse {
        eligible: registry.is_eligible(&subject),
        fresh: registry.is_fresh(&subject, max_age),
        max_age,
        meets_threshold: threshold.map(|t| registry.meets_threshold(&subject, t)),
        threshold,
        subject,
    }))
}
