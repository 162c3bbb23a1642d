//! Loan Endpoints
//!
//! LoanEscrow state machine을 HTTP로 노출. 상태 변경 요청은 `sequencer`로
//! 직렬화되어 한 번에 하나씩 적용됨.
//!
//! 호출자 신원은 요청 body의 `caller` + EIP-191 `signature` + `nonce`로 전달.
//! 서명 대상은 (action, loan id, amount, nonce). 금액이 없는 동작은 amount 0.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, LendingError},
    routes::verify_caller,
    services::{Action, Loan, LoanTerms},
    types::{amount_str, Address, AssetId, LoanId},
    AppState,
};

// ============ Request/Response Types ============

/// 대출 생성 요청
///
/// `caller`는 borrower 또는 lender. 서명 target은 `id` (생략 시 빈 문자열),
/// amount는 `principal`.
#[derive(Debug, Deserialize)]
pub struct CreateLoanRequest {
    /// 생략 시 UUID v4 부여
    pub id: Option<LoanId>,
    pub caller: Address,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub signature: Option<String>,
    pub borrower: Address,
    pub lender: Address,
    pub loan_asset: AssetId,
    pub collateral_asset: AssetId,
    #[serde(with = "amount_str")]
    pub principal: u128,
    #[serde(with = "amount_str")]
    pub collateral_amount: u128,
    pub interest_rate_bps: u32,
    pub duration_days: u32,
    #[serde(with = "amount_str")]
    pub lender_threshold: u128,
}

impl CreateLoanRequest {
    fn into_terms(self) -> Result<LoanTerms, ApiError> {
        let id = match self.id {
            Some(id) => id,
            None => LoanId::new(&uuid::Uuid::new_v4().to_string())?,
        };

        Ok(LoanTerms {
            id,
            borrower: self.borrower,
            lender: self.lender,
            loan_asset: self.loan_asset,
            collateral_asset: self.collateral_asset,
            principal: self.principal,
            collateral_amount: self.collateral_amount,
            interest_rate_bps: self.interest_rate_bps,
            duration_days: self.duration_days,
            lender_threshold: self.lender_threshold,
        })
    }
}

/// 상태 전이 요청
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub caller: Address,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub signature: Option<String>,
}

/// 상환 요청
#[derive(Debug, Deserialize)]
pub struct RepaymentRequest {
    pub caller: Address,
    #[serde(with = "amount_str")]
    pub amount: u128,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub signature: Option<String>,
}

/// 대출 응답
#[derive(Debug, Serialize)]
pub struct LoanResponse {
    #[serde(flatten)]
    pub loan: Loan,
    #[serde(with = "amount_str")]
    pub remaining: u128,
    pub overdue: bool,
}

#[derive(Debug, Serialize)]
pub struct OverdueResponse {
    pub id: LoanId,
    pub overdue: bool,
}

#[derive(Debug, Serialize)]
pub struct BorrowerLoansResponse {
    pub borrower: Address,
    pub loans: Vec<LoanResponse>,
}

fn authorize(
    state: &AppState,
    req: &ActionRequest,
    action: Action,
    id: &LoanId,
) -> Result<(), ApiError> {
    verify_caller(
        state,
        &req.caller,
        action,
        id.as_str(),
        0,
        req.nonce,
        req.signature.as_deref(),
    )
}

fn respond(state: &AppState, loan: Loan) -> LoanResponse {
    LoanResponse {
        remaining: loan.remaining(),
        overdue: state.protocol.escrow.is_overdue(&loan.id),
        loan,
    }
}

// ============ Handlers ============

/// POST /loans
///
/// # Admission
///
/// borrower가 (1) attestation 보유, (2) freshness window 이내,
/// (3) lender_threshold 이상 score를 모두 만족해야 생성됨
pub async fn create_loan(
    State(state): State<AppState>,
    Json(req): Json<CreateLoanRequest>,
) -> Result<(StatusCode, Json<LoanResponse>), ApiError> {
    let target = req
        .id
        .as_ref()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default();

    let _turn = state.sequencer.lock().await;
    verify_caller(
        &state,
        &req.caller,
        Action::CreateLoan,
        &target,
        req.principal,
        req.nonce,
        req.signature.as_deref(),
    )?;
    if req.caller != req.borrower && req.caller != req.lender {
        return Err(LendingError::Unauthorized.into());
    }

    let terms = req.into_terms()?;
    let loan = state.protocol.escrow.create_loan(terms)?;

    Ok((StatusCode::CREATED, Json(respond(&state, loan))))
}

/// GET /loans/:id
pub async fn get_loan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LoanResponse>, ApiError> {
    let id = LoanId::new(&id)?;
    let loan = state.protocol.escrow.get_loan(&id)?;

    Ok(Json(respond(&state, loan)))
}

/// GET /loans/:id/overdue
pub async fn get_overdue(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OverdueResponse>, ApiError> {
    let id = LoanId::new(&id)?;
    let overdue = state.protocol.escrow.is_overdue(&id);

    Ok(Json(OverdueResponse { id, overdue }))
}

/// POST /loans/:id/collateral
pub async fn deposit_collateral(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ActionRequest>,
) -> Result<Json<LoanResponse>, ApiError> {
    let id = LoanId::new(&id)?;

    let _turn = state.sequencer.lock().await;
    authorize(&state, &req, Action::DepositCollateral, &id)?;
    let loan = state.protocol.escrow.deposit_collateral(&req.caller, &id)?;

    Ok(Json(respond(&state, loan)))
}

/// POST /loans/:id/fund
pub async fn fund_loan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ActionRequest>,
) -> Result<Json<LoanResponse>, ApiError> {
    let id = LoanId::new(&id)?;

    let _turn = state.sequencer.lock().await;
    authorize(&state, &req, Action::FundLoan, &id)?;
    let loan = state.protocol.escrow.fund_loan(&req.caller, &id)?;

    Ok(Json(respond(&state, loan)))
}

/// POST /loans/:id/repayments
pub async fn make_repayment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RepaymentRequest>,
) -> Result<Json<LoanResponse>, ApiError> {
    let id = LoanId::new(&id)?;

    let _turn = state.sequencer.lock().await;
    verify_caller(
        &state,
        &req.caller,
        Action::MakeRepayment,
        id.as_str(),
        req.amount,
        req.nonce,
        req.signature.as_deref(),
    )?;
    let loan = state
        .protocol
        .escrow
        .make_repayment(&req.caller, &id, req.amount)?;

    Ok(Json(respond(&state, loan)))
}

/// POST /loans/:id/default
pub async fn mark_defaulted(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ActionRequest>,
) -> Result<Json<LoanResponse>, ApiError> {
    let id = LoanId::new(&id)?;

    let _turn = state.sequencer.lock().await;
    authorize(&state, &req, Action::MarkDefaulted, &id)?;
    let loan = state.protocol.escrow.mark_defaulted(&req.caller, &id)?;

    Ok(Json(respond(&state, loan)))
}

/// POST /loans/:id/liquidate
pub async fn liquidate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ActionRequest>,
) -> Result<Json<LoanResponse>, ApiError> {
    let id = LoanId::new(&id)?;

    let _turn = state.sequencer.lock().await;
    authorize(&state, &req, Action::Liquidate, &id)?;
    let loan = state.protocol.escrow.liquidate(&req.caller, &id)?;

    Ok(Json(respond(&state, loan)))
}

/// GET /borrowers/:address/loans
pub async fn get_borrower_loans(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<BorrowerLoansResponse>, ApiError> {
    let borrower = Address::new(&address)?;

    let loans = state
        .protocol
        .escrow
        .loans_by_borrower(&borrower)
        .into_iter()
        .map(|loan| respond(&state, loan))
        .collect();

    Ok(Json(BorrowerLoansResponse { borrower, loans }))
}
