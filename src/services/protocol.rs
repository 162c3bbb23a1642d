//! Protocol wiring
//!
//! Registry, escrow, ledger, event log를 하나의 인스턴스로 조립.
//!
//! ```text
//!   ProofVerifier ─┐
//! VersionGovernor ─┼─▶ EligibilityRegistry ─▶ LoanEscrow ◀─ AssetLedger
//!           Clock ─┘            │                 │
//!                               └──▶ EventLog ◀───┘
//! ```

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::services::auth::CallerAuthenticator;
use crate::services::clock::{Clock, SystemClock};
use crate::services::escrow::LoanEscrow;
use crate::services::events::EventLog;
use crate::services::governor::StaticVersionGovernor;
use crate::services::ledger::InMemoryAssetLedger;
use crate::services::registry::EligibilityRegistry;
use crate::services::verifier::{KeccakAttestationVerifier, ProofVerifier};

pub struct LendingProtocol {
    pub events: Arc<EventLog>,
    pub governor: Arc<StaticVersionGovernor>,
    pub registry: Arc<EligibilityRegistry>,
    pub ledger: Arc<InMemoryAssetLedger>,
    pub escrow: Arc<LoanEscrow>,
    pub auth: Arc<CallerAuthenticator>,
}

impl LendingProtocol {
    pub fn new(
        verifier: Arc<dyn ProofVerifier>,
        governor: Arc<StaticVersionGovernor>,
        clock: Arc<dyn Clock>,
        freshness_window: u64,
    ) -> Self {
        Self::with_events(verifier, governor, clock, freshness_window, EventLog::new())
    }

    pub fn with_events(
        verifier: Arc<dyn ProofVerifier>,
        governor: Arc<StaticVersionGovernor>,
        clock: Arc<dyn Clock>,
        freshness_window: u64,
        events: EventLog,
    ) -> Self {
        let events = Arc::new(events);
        let ledger = Arc::new(InMemoryAssetLedger::new());

        let registry = Arc::new(EligibilityRegistry::new(
            verifier,
            governor.clone(),
            clock.clone(),
            events.clone(),
        ));

        let escrow = Arc::new(LoanEscrow::new(
            registry.clone(),
            ledger.clone(),
            clock,
            events.clone(),
            freshness_window,
        ));

        Self {
            events,
            governor,
            registry,
            ledger,
            escrow,
            auth: Arc::new(CallerAuthenticator::new()),
        }
    }

    /// 설정에서 생성
    ///
    /// # Verifier Key
    ///
    /// - production: `VERIFIER_KEY` 필수 (없으면 시작 실패)
    /// - 그 외: 없으면 랜덤 key 생성 (재시작 시 기존 proof 무효)
    pub fn from_config(config: &Config) -> Result<Self> {
        let verifier = match &config.verifier_key {
            Some(key) => KeccakAttestationVerifier::from_hex(key)
                .context("VERIFIER_KEY must be 32 bytes of hex")?,
            None if config.is_production() => {
                bail!("VERIFIER_KEY is required in production")
            }
            None => {
                tracing::warn!("VERIFIER_KEY not set, generating an ephemeral key");
                KeccakAttestationVerifier::generate()
            }
        };

        let governor = Arc::new(StaticVersionGovernor::new(
            config.accepted_schema_versions.iter().copied(),
        ));

        Ok(Self::with_events(
            Arc::new(verifier),
            governor,
            Arc::new(SystemClock),
            config.freshness_window_secs,
            EventLog::with_retention(config.event_retention),
        ))
    }
}
