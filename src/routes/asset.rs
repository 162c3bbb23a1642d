//! Asset Endpoints
//!
//! Underlying asset layer 조회 + allowance 설정.
//!
//! `mint`는 개발/테스트용 faucet. production 환경에서는 노출되지 않음 (404).
//! `approve`는 owner 서명 필수 (target = asset id, amount = 한도).

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, LendingError},
    routes::verify_caller,
    services::{Account, Action, AssetLedger},
    types::{amount_str, Address, AssetId},
    AppState,
};

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct MintRequest {
    pub to: Address,
    #[serde(with = "amount_str")]
    pub amount: u128,
}

/// escrow가 owner 잔고에서 가져갈 수 있는 한도 설정
#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub owner: Address,
    #[serde(with = "amount_str")]
    pub amount: u128,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub asset: AssetId,
    pub account: Address,
    #[serde(with = "amount_str")]
    pub balance: u128,
    #[serde(with = "amount_str")]
    pub allowance: u128,
}

fn balance(state: &AppState, asset: AssetId, account: Address) -> BalanceResponse {
    let ledger = &state.protocol.ledger;

    BalanceResponse {
        balance: ledger.balance_of(&asset, &Account::User(account.clone())),
        allowance: ledger.allowance(&asset, &account),
        asset,
        account,
    }
}

// ============ Handlers ============

/// POST /assets/:asset/mint
pub async fn mint(
    State(state): State<AppState>,
    Path(asset): Path<String>,
    Json(req): Json<MintRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    if state.config.is_production() {
        return Err(ApiError::NotFound("faucet".to_string()));
    }

    let asset = AssetId::new(&asset)?;
    if req.amount == 0 {
        return Err(ApiError::BadRequest("amount must be positive".to_string()));
    }

    let _turn = state.sequencer.lock().await;
    state
        .protocol
        .ledger
        .mint(&asset, &Account::User(req.to.clone()), req.amount)
        .map_err(LendingError::from)?;

    Ok(Json(balance(&state, asset, req.to)))
}

/// POST /assets/:asset/approve
pub async fn approve(
    State(state): State<AppState>,
    Path(asset): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let asset = AssetId::new(&asset)?;

    let _turn = state.sequencer.lock().await;
    verify_caller(
        &state,
        &req.owner,
        Action::Approve,
        asset.as_str(),
        req.amount,
        req.nonce,
        req.signature.as_deref(),
    )?;
    state.protocol.ledger.approve(&req.owner, &asset, req.amount);

    Ok(Json(balance(&state, asset, req.owner)))
}

/// GET /assets/:asset/balances/:address
pub async fn get_balance(
    State(state): State<AppState>,
    Path((asset, address)): Path<(String, String)>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let asset = AssetId::new(&asset)?;
    let account = Address::new(&address)?;

    Ok(Json(balance(&state, asset, account)))
}
