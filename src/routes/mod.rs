//! API Routes Module
//!
//! # Routes
//! - `/health` - 헬스 체크
//! - `/attestations/*` - attestation 제출, 자격 조회
//! - `/loans/*` - 대출 lifecycle
//! - `/borrowers/:address/loans` - borrower별 대출 목록
//! - `/assets/*` - underlying asset layer (잔고, allowance, 개발용 faucet)
//! - `/events/*` - 감사/인덱싱 이벤트
//! - `/accounts/:address/nonce` - 서명용 nonce
//!
//! 상태를 바꾸는 요청 (mint 제외)은 caller의 EIP-191 서명이 필요함.
//! 메시지 형식은 `services::auth::signing_message`.

pub mod account;
pub mod asset;
pub mod attestation;
pub mod events;
pub mod health;
pub mod loan;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{
    error::{ApiError, LendingError},
    services::Action,
    types::Address,
    AppState,
};

/// 서명된 caller 확인 + nonce 소비
///
/// `sequencer`를 잡은 상태에서 호출해야 nonce 순서가 요청 순서와 일치함.
pub(crate) fn verify_caller(
    state: &AppState,
    caller: &Address,
    action: Action,
    target: &str,
    amount: u128,
    nonce: u64,
    signature: Option<&str>,
) -> Result<(), ApiError> {
    let signature = signature.ok_or(LendingError::InvalidSignature)?;
    state
        .protocol
        .auth
        .authenticate(caller, action, target, amount, nonce, signature)?;
    Ok(())
}

/// 라우터 생성 (미들웨어 제외)
///
/// # Route Structure
///
/// ```text
/// GET  /health
///
/// POST /attestations                        - attestation 제출
/// GET  /attestations/:subject               - 현재 attestation
/// GET  /attestations/:subject/eligibility   - 자격/신선도/threshold 조회
///
/// POST /loans                               - 대출 생성
/// GET  /loans/:id                           - 대출 조회
/// GET  /loans/:id/overdue                   - 연체 여부
/// POST /loans/:id/collateral                - 담보 예치
/// POST /loans/:id/fund                      - 대출금 지급
/// POST /loans/:id/repayments                - 상환
/// POST /loans/:id/default                   - 연체 처리
/// POST /loans/:id/liquidate                 - 담보 청산
/// GET  /borrowers/:address/loans            - borrower 대출 목록
///
/// POST /assets/:asset/mint                  - 개발용 faucet
/// POST /assets/:asset/approve               - escrow allowance 설정
/// GET  /assets/:asset/balances/:address     - 잔고 조회
///
/// GET  /events                              - 이벤트 journal
/// GET  /events/history/:key                 - 인덱싱된 이벤트 (DB)
///
/// GET  /accounts/:address/nonce             - 다음 서명 nonce
/// ```
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))

        // Attestation
        .route("/attestations", post(attestation::submit_attestation))
        .route("/attestations/:subject", get(attestation::get_attestation))
        .route("/attestations/:subject/eligibility", get(attestation::get_eligibility))

        // Loan lifecycle
        .route("/loans", post(loan::create_loan))
        .route("/loans/:id", get(loan::get_loan))
        .route("/loans/:id/overdue", get(loan::get_overdue))
        .route("/loans/:id/collateral", post(loan::deposit_collateral))
        .route("/loans/:id/fund", post(loan::fund_loan))
        .route("/loans/:id/repayments", post(loan::make_repayment))
        .route("/loans/:id/default", post(loan::mark_defaulted))
        .route("/loans/:id/liquidate", post(loan::liquidate))
        .route("/borrowers/:address/loans", get(loan::get_borrower_loans))

        // Asset layer
        .route("/assets/:asset/mint", post(asset::mint))
        .route("/assets/:asset/approve", post(asset::approve))
        .route("/assets/:asset/balances/:address", get(asset::get_balance))

        // Events
        .route("/events", get(events::list_events))
        .route("/events/history/:key", get(events::get_indexed_history))

        // Caller auth
        .route("/accounts/:address/nonce", get(account::get_nonce))

        // 상태 주입
        .with_state(state)
}
