//! ZK Credit Lending Library
//!
//! # Overview
//!
//! 영지식 credit score attestation으로 자격을 확인하는 대출 프로토콜.
//! 원본 행동 데이터는 절대 서버에 오지 않고, 서버는 proof와 public outputs만 봄.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Routes (axum)                      │
//! └───────────────┬──────────────────────────────┬───────────┘
//!                 │                              │
//!                 ▼                              ▼
//! ┌──────────────────────────────┐   ┌─────────────────────┐
//! │      LendingProtocol         │   │  DB (event index)   │
//! │  EligibilityRegistry         │   │  PostgreSQL / sqlx  │
//! │  LoanEscrow ── AssetLedger   │──▶│                     │
//! │  EventLog                    │   └─────────────────────┘
//! └──────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 관리
//! - `error`: 에러 타입 및 HTTP 매핑
//! - `routes`: HTTP 엔드포인트 핸들러
//! - `services`: 프로토콜 코어 (registry, escrow, ledger, events)
//! - `db`: 이벤트 인덱싱
//! - `types`: 공통 타입 정의
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zk_credit_lending::{AppState, Config, LendingProtocol};
//!
//! let config = Config::from_env()?;
//! let protocol = LendingProtocol::from_config(&config)?;
//! let state = AppState::new(protocol, None, config);
//! let app = zk_credit_lending::routes::router(state);
//! ```

use std::sync::Arc;

use tokio::sync::Mutex;

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod types;


// Re-exports for convenience
pub use config::Config;
pub use db::Database;
pub use error::{ApiError, LendingError, LendingResult};
pub use services::{EligibilityRegistry, LendingProtocol, LoanEscrow};

/// 애플리케이션 전역 상태
#[derive(Clone)]
pub struct AppState {
    pub protocol: Arc<LendingProtocol>,
    /// 상태 변경 요청 직렬화 (한 번에 하나의 호출만 프로토콜을 변경)
    pub sequencer: Arc<Mutex<()>>,
    /// `DATABASE_URL` 미설정 시 None
    pub db: Option<Arc<Database>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(protocol: LendingProtocol, db: Option<Database>, config: Config) -> Self {
        Self {
            protocol: Arc::new(protocol),
            sequencer: Arc::new(Mutex::new(())),
            db: db.map(Arc::new),
            config: Arc::new(config),
        }
    }
}
