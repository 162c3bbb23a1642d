//! Services Module
//!
//! 프로토콜 코어 (동기, 외부 I/O 없음)
//!
//! # Services
//! - `EligibilityRegistry`: attestation 검증/기록, 자격 질의
//! - `LoanEscrow`: 대출 lifecycle state machine, custody
//! - `InMemoryAssetLedger`: underlying asset layer
//! - `EventLog`: 감사/인덱싱용 이벤트
//! - `CallerAuthenticator`: HTTP caller 서명 + nonce 검증
//! - `ProofVerifier`, `VersionGovernor`, `Clock`: 외부 협력자 인터페이스

pub mod auth;
pub mod clock;
pub mod escrow;
pub mod events;
pub mod governor;
pub mod guard;
pub mod ledger;
pub mod protocol;
pub mod registry;
pub mod verifier;

pub use auth::{signing_message, Action, CallerAuthenticator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use escrow::{total_repayment, Loan, LoanEscrow, LoanStatus, LoanTerms};
pub use events::{EventLog, EventRecord, LendingEvent};
pub use governor::{StaticVersionGovernor, VersionGovernor};
pub use guard::{GuardToken, ReentrancyGuard};
pub use ledger::{Account, AssetLedger, InMemoryAssetLedger, Transfer, TransferHook};
pub use protocol::LendingProtocol;
pub use registry::{Attestation, EligibilityRegistry};
pub use verifier::{KeccakAttestationVerifier, ProofVerifier, PublicOutputs};
