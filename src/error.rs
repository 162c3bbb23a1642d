//! Error Handling Module
//!
//! 두 계층의 에러 타입:
//! - `LendingError`: 프로토콜 코어 (registry, escrow, ledger) 도메인 에러
//! - `ApiError`: HTTP 계층 에러 (상태 코드 매핑)
//!
//! 모든 에러는 호출자에게 그대로 반환됨. 코어 내부에서 재시도하거나 삼키지 않음.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::types::{AssetId, LoanId};

/// 자산 이동 실패 (underlying asset layer)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("insufficient {asset} balance in {account}: have {available}, need {required}")]
    InsufficientBalance {
        asset: AssetId,
        account: String,
        available: u128,
        required: u128,
    },

    #[error("insufficient {asset} allowance from {owner}: have {available}, need {required}")]
    InsufficientAllowance {
        asset: AssetId,
        owner: String,
        available: u128,
        required: u128,
    },

    #[error("transfer hook rejected: {0}")]
    HookRejected(String),

    #[error("balance overflow for {asset} in {account}")]
    BalanceOverflow { asset: AssetId, account: String },
}

/// 에러 분류
///
/// 호출자가 대응 방법을 결정하는 기준
/// - Admission: 새 attestation 필요 또는 threshold 변경
/// - StateGuard / Value: 결정적, 같은 입력으로 재시도 무의미
/// - Custody: 잔고/allowance 문제 해결 후 재시도 가능
/// - Reentrancy: 프로그래밍 오류 또는 공격 신호
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Admission,
    StateGuard,
    Value,
    Custody,
    Reentrancy,
}

/// 프로토콜 코어 에러
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LendingError {
    // ============ Admission ============
    #[error("proof verification failed")]
    InvalidProof,

    #[error("nullifier already used for this subject")]
    NullifierReused,

    #[error("schema version {0} is not accepted")]
    UnsupportedVersion(u32),

    #[error("credit score below lender threshold")]
    InsufficientCreditScore,

    #[error("credit score attestation is stale")]
    CreditScoreExpired,

    #[error("no attestation recorded for borrower")]
    NoAttestation,

    #[error("signature does not match caller")]
    InvalidSignature,

    // ============ State guard ============
    #[error("loan {0} not found")]
    LoanNotFound(LoanId),

    #[error("loan {0} already exists")]
    LoanAlreadyExists(LoanId),

    #[error("caller is not allowed to perform this action")]
    Unauthorized,

    #[error("invalid loan state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("loan is not overdue")]
    NotOverdue,

    #[error("invalid nonce: expected {expected}, got {actual}")]
    InvalidNonce { expected: u64, actual: u64 },

    #[error("borrower and lender must be distinct non-null identities")]
    InvalidParticipants,

    #[error("loan asset and collateral asset must differ")]
    InvalidAssets,

    // ============ Value ============
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("duration must be at least one day")]
    InvalidDuration,

    #[error("repayment {amount} exceeds remaining balance {remaining}")]
    RepaymentExceedsBalance { amount: u128, remaining: u128 },

    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    // ============ Custody ============
    #[error("asset transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    // ============ Reentrancy ============
    #[error("reentrant call rejected")]
    ReentrantCall,
}

impl LendingError {
    pub fn category(&self) -> ErrorCategory {
        use LendingError::*;

        match self {
            InvalidProof
            | NullifierReused
            | UnsupportedVersion(_)
            | InsufficientCreditScore
            | CreditScoreExpired
            | NoAttestation
            | InvalidSignature => ErrorCategory::Admission,

            LoanNotFound(_)
            | LoanAlreadyExists(_)
            | Unauthorized
            | InvalidState { .. }
            | NotOverdue
            | InvalidNonce { .. }
            | InvalidParticipants
            | InvalidAssets => ErrorCategory::StateGuard,

            InvalidAmount
            | InvalidDuration
            | RepaymentExceedsBalance { .. }
            | ArithmeticOverflow(_)
            | InvalidAddress(_)
            | InvalidIdentifier(_) => ErrorCategory::Value,

            TransferFailed(_) => ErrorCategory::Custody,

            ReentrantCall => ErrorCategory::Reentrancy,
        }
    }

    /// 응답 body용 에러 코드
    pub fn code(&self) -> &'static str {
        use LendingError::*;

        match self {
            InvalidProof => "INVALID_PROOF",
            NullifierReused => "NULLIFIER_REUSED",
            UnsupportedVersion(_) => "UNSUPPORTED_VERSION",
            InsufficientCreditScore => "INSUFFICIENT_CREDIT_SCORE",
            CreditScoreExpired => "CREDIT_SCORE_EXPIRED",
            NoAttestation => "NO_ATTESTATION",
            InvalidSignature => "INVALID_SIGNATURE",
            LoanNotFound(_) => "LOAN_NOT_FOUND",
            LoanAlreadyExists(_) => "LOAN_ALREADY_EXISTS",
            Unauthorized => "UNAUTHORIZED",
            InvalidState { .. } => "INVALID_STATE",
            NotOverdue => "NOT_OVERDUE",
            InvalidNonce { .. } => "INVALID_NONCE",
            InvalidParticipants => "INVALID_PARTICIPANTS",
            InvalidAssets => "INVALID_ASSETS",
            InvalidAmount => "INVALID_AMOUNT",
            InvalidDuration => "INVALID_DURATION",
            RepaymentExceedsBalance { .. } => "REPAYMENT_EXCEEDS_BALANCE",
            ArithmeticOverflow(_) => "ARITHMETIC_OVERFLOW",
            InvalidAddress(_) => "INVALID_ADDRESS",
            InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            TransferFailed(_) => "TRANSFER_FAILED",
            ReentrantCall => "REENTRANT_CALL",
        }
    }
}

/// 코어 Result 타입
pub type LendingResult<T> = Result<T, LendingError>;

/// API 에러 타입
///
/// # Design Decision
///
/// 도메인 에러는 분류(category)에 따라 HTTP 상태 코드에 매핑됨
/// - Admission: 403
/// - StateGuard: 409 (not found 404, 권한 없음 403)
/// - Value: 422 (형식 오류 400)
/// - Custody: 402
/// - Reentrancy: 423
///
/// 민감한 내부 정보는 클라이언트에 노출하지 않음
#[derive(Debug, Error)]
pub enum ApiError {
    // ============ 400 Bad Request ============
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // ============ 404 Not Found ============
    #[error("Resource not found: {0}")]
    NotFound(String),

    // ============ Domain ============
    #[error(transparent)]
    Lending(#[from] LendingError),

    // ============ 500 Internal Server Error ============
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    InternalError,
}

/// API 에러 응답 구조
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn lending_status(err: &LendingError) -> StatusCode {
    match err {
        LendingError::LoanNotFound(_) => StatusCode::NOT_FOUND,
        LendingError::Unauthorized => StatusCode::FORBIDDEN,
        LendingError::InvalidAddress(_) | LendingError::InvalidIdentifier(_) => {
            StatusCode::BAD_REQUEST
        }
        other => match other.category() {
            ErrorCategory::Admission => StatusCode::FORBIDDEN,
            ErrorCategory::StateGuard => StatusCode::CONFLICT,
            ErrorCategory::Value => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::Custody => StatusCode::PAYMENT_REQUIRED,
            ErrorCategory::Reentrancy => StatusCode::LOCKED,
        },
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Lending(err) => lending_status(err),
            ApiError::DatabaseError(_) | ApiError::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            ApiError::BadRequest(msg) => ErrorResponse {
                error: msg.clone(),
                code: "BAD_REQUEST".to_string(),
                category: None,
                details: None,
            },
            ApiError::NotFound(resource) => ErrorResponse {
                error: format!("{} not found", resource),
                code: "NOT_FOUND".to_string(),
                category: None,
                details: None,
            },
            ApiError::Lending(err) => {
                if err.category() == ErrorCategory::Reentrancy {
                    tracing::error!("Reentrant call surfaced to API: {:?}", err);
                }
                ErrorResponse {
                    error: err.to_string(),
                    code: err.code().to_string(),
                    category: Some(err.category()),
                    details: None,
                }
            }

            // 5xx 서버 에러: 상세 정보 노출 안 함
            ApiError::DatabaseError(_) => {
                tracing::error!("Database error: {:?}", self);
                ErrorResponse {
                    error: "Database error occurred".to_string(),
                    code: "DATABASE_ERROR".to_string(),
                    category: None,
                    details: None,
                }
            }
            ApiError::InternalError => {
                tracing::error!("Internal error: {:?}", self);
                ErrorResponse {
                    error: "An internal error occurred".to_string(),
                    code: "INTERNAL_ERROR".to_string(),
                    category: None,
                    details: None,
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

/// SQLx 에러를 ApiError로 변환
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("SQLx error: {:?}", err);
        ApiError::DatabaseError(err.to_string())
    }
}

/// anyhow 에러를 ApiError로 변환
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Anyhow error: {:?}", err);
        ApiError::InternalError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(LendingError::NullifierReused.category(), ErrorCategory::Admission);
        assert_eq!(LendingError::NotOverdue.category(), ErrorCategory::StateGuard);
        assert_eq!(LendingError::InvalidAmount.category(), ErrorCategory::Value);
        assert_eq!(
            LendingError::TransferFailed(TransferError::HookRejected("x".into())).category(),
            ErrorCategory::Custody
        );
        assert_eq!(LendingError::ReentrantCall.category(), ErrorCategory::Reentrancy);
    }

    #[test]
    fn test_status_mapping() {
        let not_found = ApiError::Lending(LendingError::LoanNotFound(LoanId::new("L1").unwrap()));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let admission = ApiError::Lending(LendingError::InsufficientCreditScore);
        assert_eq!(admission.status(), StatusCode::FORBIDDEN);

        let guard = ApiError::Lending(LendingError::InvalidState {
            expected: "Active",
            actual: "Pending",
        });
        assert_eq!(guard.status(), StatusCode::CONFLICT);

        let reentrant = ApiError::Lending(LendingError::ReentrantCall);
        assert_eq!(reentrant.status(), StatusCode::LOCKED);

        let forged = ApiError::Lending(LendingError::InvalidSignature);
        assert_eq!(forged.status(), StatusCode::FORBIDDEN);

        let replay = ApiError::Lending(LendingError::InvalidNonce {
            expected: 2,
            actual: 1,
        });
        assert_eq!(replay.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_transfer_error_message() {
        let err = LendingError::from(TransferError::InsufficientBalance {
            asset: AssetId::new("USDC").unwrap(),
            account: "0xabc".to_string(),
            available: 5,
            required: 10,
        });
        assert!(err.to_string().contains("insufficient USDC balance"));
    }
}
