//! Account Endpoints
//!
//! 서명 요청에 넣을 다음 nonce 조회.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::{error::ApiError, types::Address, AppState};

#[derive(Debug, Serialize)]
pub struct NonceResponse {
    pub address: Address,
    pub nonce: u64,
}

/// GET /accounts/:address/nonce
pub async fn get_nonce(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<NonceResponse>, ApiError> {
    let address = Address::new(&address)?;
    let nonce = state.protocol.auth.nonce(&address);

    Ok(Json(NonceResponse { address, nonce }))
}
