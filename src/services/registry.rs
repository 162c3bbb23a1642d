//! Eligibility Registry
//!
//! "이 subject는 현재 기준을 만족하는 유효하고 신선한 attestation을 보유하고 있다"에
//! 대한 replay-safe 기록.
//!
//! # Flow
//!
//! ```text
//! submit_attestation(subject, proof, outputs)
//!   1. ProofVerifier::verify(proof, outputs)   실패 → InvalidProof
//!   2. (subject, nullifier) 사용 여부          사용됨 → NullifierReused
//!   3. VersionGovernor::is_version_accepted     거부 → UnsupportedVersion
//!   4. attestation upsert + nullifier 기록 + AttestationAccepted
//! ```
//!
//! 실패한 제출은 관측 가능한 효과가 전혀 없음 (모든 검사는 쓰기 전에 수행).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::error::{LendingError, LendingResult};
use crate::services::clock::Clock;
use crate::services::events::{EventLog, LendingEvent};
use crate::services::governor::VersionGovernor;
use crate::services::verifier::{ProofVerifier, PublicOutputs};
use crate::types::{amount_str, Address, Nullifier, Timestamp};

/// subject별 최신 attestation (새 제출이 덮어씀)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attestation {
    pub subject: Address,
    #[serde(with = "amount_str")]
    pub score_commitment: u128,
    #[serde(with = "amount_str")]
    pub threshold_capability: u128,
    /// 검증 시각 (registry clock 기준)
    pub issued_at: Timestamp,
    /// 증명 환경이 public output으로 공개한 시각
    pub proved_at: Timestamp,
    pub nullifier: Nullifier,
    pub schema_version: u32,
}

#[derive(Default)]
struct RegistryState {
    attestations: HashMap<Address, Attestation>,
    /// append-only, 절대 삭제 안 함
    used_nullifiers: HashMap<Address, HashSet<Nullifier>>,
}

pub struct EligibilityRegistry {
    verifier: Arc<dyn ProofVerifier>,
    governor: Arc<dyn VersionGovernor>,
    clock: Arc<dyn Clock>,
    events: Arc<EventLog>,
    state: RwLock<RegistryState>,
}

impl EligibilityRegistry {
    pub fn new(
        verifier: Arc<dyn ProofVerifier>,
        governor: Arc<dyn VersionGovernor>,
        clock: Arc<dyn Clock>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            verifier,
            governor,
            clock,
            events,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// attestation 제출
    ///
    /// # Errors
    ///
    /// - `InvalidProof`: 검증 실패, 또는 outputs가 다른 subject에 바인딩됨
    /// - `NullifierReused`: 이 subject에 대해 이미 사용된 nullifier
    /// - `UnsupportedVersion`: 현재 허용되지 않는 scoring circuit 버전
    pub fn submit_attestation(
        &self,
        subject: &Address,
        proof: &[u8],
        public_outputs: &PublicOutputs,
    ) -> LendingResult<()> {
        if public_outputs.subject != *subject || !self.verifier.verify(proof, public_outputs) {
            tracing::warn!(%subject, "Attestation rejected: invalid proof");
            return Err(LendingError::InvalidProof);
        }

        let issued_at = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

            let reused = state
                .used_nullifiers
                .get(subject)
                .is_some_and(|used| used.contains(&public_outputs.nullifier));
            if reused {
                tracing::warn!(%subject, nullifier = %public_outputs.nullifier, "Attestation rejected: nullifier reused");
                return Err(LendingError::NullifierReused);
            }

            if !self.governor.is_version_accepted(public_outputs.schema_version) {
                tracing::warn!(
                    %subject,
                    schema_version = public_outputs.schema_version,
                    "Attestation rejected: unsupported schema version"
                );
                return Err(LendingError::UnsupportedVersion(public_outputs.schema_version));
            }

            let issued_at = self.clock.now();
            state.attestations.insert(
                subject.clone(),
                Attestation {
                    subject: subject.clone(),
                    score_commitment: public_outputs.score_commitment,
                    threshold_capability: public_outputs.threshold_capability,
                    issued_at,
                    proved_at: public_outputs.timestamp,
                    nullifier: public_outputs.nullifier,
                    schema_version: public_outputs.schema_version,
                },
            );
            state
                .used_nullifiers
                .entry(subject.clone())
                .or_default()
                .insert(public_outputs.nullifier);

            issued_at
        };

        tracing::info!(
            %subject,
            schema_version = public_outputs.schema_version,
            "Attestation accepted"
        );
        self.events.emit(
            issued_at,
            LendingEvent::AttestationAccepted {
                subject: subject.clone(),
                nullifier: public_outputs.nullifier,
                schema_version: public_outputs.schema_version,
                issued_at,
            },
        );

        Ok(())
    }

    /// attestation 존재 여부
    pub fn is_eligible(&self, subject: &Address) -> bool {
        self.read(|state| state.attestations.contains_key(subject))
    }

    /// `now - issued_at <= max_age_secs`
    ///
    /// attestation이 없으면 false
    pub fn is_fresh(&self, subject: &Address, max_age_secs: u64) -> bool {
        let now = self.clock.now();
        self.read(|state| {
            state
                .attestations
                .get(subject)
                .is_some_and(|a| now.saturating_sub(a.issued_at) <= max_age_secs)
        })
    }

    /// `score_commitment >= threshold`
    ///
    /// attestation이 없으면 false (에러 아님)
    pub fn meets_threshold(&self, subject: &Address, threshold: u128) -> bool {
        self.read(|state| {
            state
                .attestations
                .get(subject)
                .is_some_and(|a| a.score_commitment >= threshold)
        })
    }

    pub fn attestation(&self, subject: &Address) -> Option<Attestation> {
        self.read(|state| state.attestations.get(subject).cloned())
    }

    pub fn is_nullifier_used(&self, subject: &Address, nullifier: &Nullifier) -> bool {
        self.read(|state| {
            state
                .used_nullifiers
                .get(subject)
                .is_some_and(|used| used.contains(nullifier))
        })
    }

    /// registry clock 기준 현재 시각
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn read<T>(&self, f: impl FnOnce(&RegistryState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::services::governor::StaticVersionGovernor;
    use crate::services::verifier::KeccakAttestationVerifier;

    const T0: Timestamp = 1_700_000_000;
    const DAY: u64 = 86_400;

    struct Fixture {
        registry: EligibilityRegistry,
        issuer: Arc<KeccakAttestationVerifier>,
        governor: Arc<StaticVersionGovernor>,
        clock: Arc<ManualClock>,
        events: Arc<EventLog>,
    }

    fn fixture() -> Fixture {
        let issuer = Arc::new(KeccakAttestationVerifier::new([9u8; 32]));
        let governor = Arc::new(StaticVersionGovernor::new([1]));
        let clock = Arc::new(ManualClock::new(T0));
        let events = Arc::new(EventLog::new());
        let registry = EligibilityRegistry::new(
            issuer.clone(),
            governor.clone(),
            clock.clone(),
            events.clone(),
        );
        Fixture {
            registry,
            issuer,
            governor,
            clock,
            events,
        }
    }

    fn alice() -> Address {
        Address::new("0xa11ce00000000000000000000000000000000001").unwrap()
    }

    fn outputs(subject: &Address, score: u128, nullifier: Nullifier) -> PublicOutputs {
        PublicOutputs {
            subject: subject.clone(),
            score_commitment: score,
            threshold_capability: 650,
            timestamp: T0 - 60,
            nullifier,
            schema_version: 1,
        }
    }

    #[test]
    fn test_submit_and_query() {
        let f = fixture();
        let out = outputs(&alice(), 720, Nullifier::random());
        let proof = f.issuer.attest(&out);

        assert!(!f.registry.is_eligible(&alice()));
        assert!(!f.registry.meets_threshold(&alice(), 0));

        f.registry.submit_attestation(&alice(), &proof, &out).unwrap();

        assert!(f.registry.is_eligible(&alice()));
        assert!(f.registry.meets_threshold(&alice(), 720));
        assert!(!f.registry.meets_threshold(&alice(), 721));
        assert!(f.registry.is_nullifier_used(&alice(), &out.nullifier));

        let record = f.registry.attestation(&alice()).unwrap();
        assert_eq!(record.issued_at, T0);
        assert_eq!(record.proved_at, T0 - 60);
        assert_eq!(f.events.len(), 1);
    }

    #[test]
    fn test_invalid_proof_has_no_effect() {
        let f = fixture();
        let out = outputs(&alice(), 720, Nullifier::random());

        let err = f.registry.submit_attestation(&alice(), b"garbage", &out).unwrap_err();
        assert_eq!(err, LendingError::InvalidProof);
        assert!(!f.registry.is_eligible(&alice()));
        assert!(!f.registry.is_nullifier_used(&alice(), &out.nullifier));
        assert!(f.events.is_empty());
    }

    #[test]
    fn test_proof_bound_to_other_subject_rejected() {
        let f = fixture();
        let bob = Address::new("0xb0b0000000000000000000000000000000000002").unwrap();
        let out = outputs(&bob, 720, Nullifier::random());
        let proof = f.issuer.attest(&out);

        let err = f.registry.submit_attestation(&alice(), &proof, &out).unwrap_err();
        assert_eq!(err, LendingError::InvalidProof);
    }

    #[test]
    fn test_replay_rejected_first_effect_kept() {
        let f = fixture();
        let nullifier = Nullifier::random();
        let first = outputs(&alice(), 720, nullifier);
        f.registry
            .submit_attestation(&alice(), &f.issuer.attest(&first), &first)
            .unwrap();

        f.clock.advance(10);
        let replay = outputs(&alice(), 800, nullifier);
        let err = f
            .registry
            .submit_attestation(&alice(), &f.issuer.attest(&replay), &replay)
            .unwrap_err();

        assert_eq!(err, LendingError::NullifierReused);
        let record = f.registry.attestation(&alice()).unwrap();
        assert_eq!(record.score_commitment, 720);
        assert_eq!(record.issued_at, T0);
    }

    #[test]
    fn test_nullifier_scoped_per_subject() {
        let f = fixture();
        let bob = Address::new("0xb0b0000000000000000000000000000000000002").unwrap();
        let nullifier = Nullifier::random();

        let a = outputs(&alice(), 700, nullifier);
        let b = outputs(&bob, 700, nullifier);
        f.registry.submit_attestation(&alice(), &f.issuer.attest(&a), &a).unwrap();
        f.registry.submit_attestation(&bob, &f.issuer.attest(&b), &b).unwrap();

        assert!(f.registry.is_eligible(&bob));
    }

    #[test]
    fn test_unsupported_version() {
        let f = fixture();
        let mut out = outputs(&alice(), 720, Nullifier::random());
        out.schema_version = 2;
        let proof = f.issuer.attest(&out);

        let err = f.registry.submit_attestation(&alice(), &proof, &out).unwrap_err();
        assert_eq!(err, LendingError::UnsupportedVersion(2));
        assert!(!f.registry.is_nullifier_used(&alice(), &out.nullifier));

        // 거버넌스가 승인한 뒤에는 같은 제출이 수락됨
        f.governor.accept(2);
        f.registry.submit_attestation(&alice(), &proof, &out).unwrap();
    }

    #[test]
    fn test_resubmission_overwrites() {
        let f = fixture();
        let first = outputs(&alice(), 600, Nullifier::random());
        f.registry
            .submit_attestation(&alice(), &f.issuer.attest(&first), &first)
            .unwrap();

        f.clock.advance(DAY);
        let second = outputs(&alice(), 750, Nullifier::random());
        f.registry
            .submit_attestation(&alice(), &f.issuer.attest(&second), &second)
            .unwrap();

        let record = f.registry.attestation(&alice()).unwrap();
        assert_eq!(record.score_commitment, 750);
        assert_eq!(record.issued_at, T0 + DAY);
        // 이전 nullifier도 여전히 사용됨으로 남음
        assert!(f.registry.is_nullifier_used(&alice(), &first.nullifier));
    }

    #[test]
    fn test_freshness_window_boundary() {
        let f = fixture();
        let out = outputs(&alice(), 720, Nullifier::random());
        f.registry
            .submit_attestation(&alice(), &f.issuer.attest(&out), &out)
            .unwrap();

        f.clock.set(T0 + DAY - 1);
        assert!(f.registry.is_fresh(&alice(), DAY));

        f.clock.set(T0 + DAY);
        assert!(f.registry.is_fresh(&alice(), DAY));

        f.clock.set(T0 + DAY + 1);
        assert!(!f.registry.is_fresh(&alice(), DAY));
    }

    #[test]
    fn test_fresh_false_without_attestation() {
        let f = fixture();
        assert!(!f.registry.is_fresh(&alice(), u64::MAX));
    }
}
