//! Proof Verifier
//!
//! # Overview
//!
//! Credit score 증명 검증은 black-box predicate로 취급:
//!
//! ```text
//! verify(proof, public_outputs) -> bool
//! ```
//!
//! - 순수 함수, 상태 없음, 고정된 key에 대해 결정적
//! - 어떤 증명 시스템(Halo2, Groth16, 서명 기반 attestation 등)이든 이 trait만
//!   구현하면 EligibilityRegistry에 연결 가능
//!
//! # KeccakAttestationVerifier
//!
//! 서비스를 단독으로 실행하기 위한 기본 구현. 증명 환경(prover)과 공유한 key로
//! public outputs 전체를 Keccak256에 바인딩:
//!
//! ```text
//! proof = keccak256(DOMAIN || key || encode(public_outputs))
//! ```
//!
//! public output 중 하나라도 바뀌면 proof가 달라지므로 subject, score, nullifier,
//! version 중 무엇을 바꿔도 검증 실패.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::LendingError;
use crate::types::{amount_str, decode_hex, Address, Nullifier, Timestamp};

const DOMAIN: &[u8] = b"zk-credit-lending/attestation/v1";

/// 증명 환경이 공개하는 출력값 (verify의 public inputs)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicOutputs {
    pub subject: Address,
    /// threshold와 비교 가능한 opaque score 값 (원본 feature는 절대 포함 안 됨)
    #[serde(with = "amount_str")]
    pub score_commitment: u128,
    #[serde(with = "amount_str")]
    pub threshold_capability: u128,
    pub timestamp: Timestamp,
    pub nullifier: Nullifier,
    pub schema_version: u32,
}

impl PublicOutputs {
    /// 고정 폭 big-endian 인코딩
    ///
    /// ```text
    /// subject(20) | score(16) | threshold(16) | timestamp(8) | nullifier(32) | version(4)
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(96);
        // Address는 생성 시 hex 검증됨
        out.extend(decode_hex(self.subject.as_str()).unwrap_or_default());
        out.extend_from_slice(&self.score_commitment.to_be_bytes());
        out.extend_from_slice(&self.threshold_capability.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(self.nullifier.as_bytes());
        out.extend_from_slice(&self.schema_version.to_be_bytes());
        out
    }
}

/// 외부 증명 검증 primitive
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, proof: &[u8], public_outputs: &PublicOutputs) -> bool;
}

/// Keccak256 키 바인딩 verifier
pub struct KeccakAttestationVerifier {
    key: [u8; 32],
}

impl KeccakAttestationVerifier {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// hex 문자열 key로 생성 (`VERIFIER_KEY`)
    pub fn from_hex(key_hex: &str) -> Result<Self, LendingError> {
        let bytes = decode_hex(key_hex)?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| LendingError::InvalidIdentifier("verifier key must be 32 bytes".into()))?;
        Ok(Self::new(key))
    }

    /// 랜덤 key (개발 환경 전용)
    pub fn generate() -> Self {
        use rand::RngCore;

        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// 증명 생성 측: public outputs에 대한 attestation 발급
    pub fn attest(&self, public_outputs: &PublicOutputs) -> Vec<u8> {
        let mut hasher = Keccak256::new();
        hasher.update(DOMAIN);
        hasher.update(self.key);
        hasher.update(public_outputs.encode());
        hasher.finalize().to_vec()
    }
}

impl std::fmt::Debug for KeccakAttestationVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // key는 로그에 남기지 않음
        f.debug_struct("KeccakAttestationVerifier").finish_non_exhaustive()
    }
}

impl ProofVerifier for KeccakAttestationVerifier {
    fn verify(&self, proof: &[u8], public_outputs: &PublicOutputs) -> bool {
        let expected = self.attest(public_outputs);
        if proof.len() != expected.len() {
            return false;
        }

        // 길이가 같으면 전체 바이트를 비교 (early return 없음)
        proof
            .iter()
            .zip(expected.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs() -> PublicOutputs {
        PublicOutputs {
            subject: Address::new("0x1111111111111111111111111111111111111111").unwrap(),
            score_commitment: 720,
            threshold_capability: 700,
            timestamp: 1_700_000_000,
            nullifier: Nullifier::from_bytes([7u8; 32]),
            schema_version: 1,
        }
    }

    #[test]
    fn test_attest_then_verify() {
        let verifier = KeccakAttestationVerifier::new([1u8; 32]);
        let proof = verifier.attest(&outputs());

        assert_eq!(proof.len(), 32);
        assert!(verifier.verify(&proof, &outputs()));
    }

    #[test]
    fn test_tampered_outputs_rejected() {
        let verifier = KeccakAttestationVerifier::new([1u8; 32]);
        let proof = verifier.attest(&outputs());

        let mut inflated = outputs();
        inflated.score_commitment = 900;
        assert!(!verifier.verify(&proof, &inflated));

        let mut other_version = outputs();
        other_version.schema_version = 2;
        assert!(!verifier.verify(&proof, &other_version));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let issuer = KeccakAttestationVerifier::new([1u8; 32]);
        let verifier = KeccakAttestationVerifier::new([2u8; 32]);

        let proof = issuer.attest(&outputs());
        assert!(!verifier.verify(&proof, &outputs()));
        assert!(!verifier.verify(&[], &outputs()));
    }

    #[test]
    fn test_from_hex_key() {
        let hex_key = format!("0x{}", "ab".repeat(32));
        assert!(KeccakAttestationVerifier::from_hex(&hex_key).is_ok());
        assert!(KeccakAttestationVerifier::from_hex("0xabcd").is_err());
    }

    #[test]
    fn test_encoding_is_fixed_width() {
        assert_eq!(outputs().encode().len(), 20 + 16 + 16 + 8 + 32 + 4);
    }
}
