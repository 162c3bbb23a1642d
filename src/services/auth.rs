//! Caller Authentication
//!
//! 상태 변경 요청의 `caller`가 실제 주소 소유자인지 확인.
//!
//! # Signing Message (EIP-191 personal_sign)
//!
//! ```text
//! zk-credit-lending
//! action: <action>
//! target: <loan id | asset id>
//! amount: <decimal u128>
//! nonce: <u64>
//! ```
//!
//! 서명에서 복구한 주소가 `caller`와 같고 nonce가 주소별 기대값과 같을 때만
//! 통과. 통과하면 nonce가 1 증가하므로 같은 서명은 한 번만 쓸 수 있음.

use std::collections::HashMap;
use std::sync::RwLock;

use ethers::types::Signature;

use crate::error::{LendingError, LendingResult};
use crate::types::Address;

const MESSAGE_DOMAIN: &str = "zk-credit-lending";

/// 서명 대상 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateLoan,
    DepositCollateral,
    FundLoan,
    MakeRepayment,
    MarkDefaulted,
    Liquidate,
    Approve,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateLoan => "create_loan",
            Action::DepositCollateral => "deposit_collateral",
            Action::FundLoan => "fund_loan",
            Action::MakeRepayment => "make_repayment",
            Action::MarkDefaulted => "mark_defaulted",
            Action::Liquidate => "liquidate",
            Action::Approve => "approve",
        }
    }
}

/// 클라이언트가 서명해야 하는 메시지
pub fn signing_message(action: Action, target: &str, amount: u128, nonce: u64) -> String {
    format!(
        "{}\naction: {}\ntarget: {}\namount: {}\nnonce: {}",
        MESSAGE_DOMAIN,
        action.as_str(),
        target,
        amount,
        nonce
    )
}

/// 주소별 nonce + 서명 검증
#[derive(Default)]
pub struct CallerAuthenticator {
    nonces: RwLock<HashMap<Address, u64>>,
}

impl CallerAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 다음 요청에 써야 하는 nonce
    pub fn nonce(&self, address: &Address) -> u64 {
        self.nonces
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    /// 서명 검증 후 nonce 소비
    ///
    /// # Errors
    /// - `InvalidSignature`: 디코딩 실패 또는 복구 주소 불일치
    /// - `InvalidNonce`: 서명은 유효하나 nonce가 기대값과 다름 (재전송 포함)
    pub fn authenticate(
        &self,
        caller: &Address,
        action: Action,
        target: &str,
        amount: u128,
        nonce: u64,
        signature: &str,
    ) -> LendingResult<()> {
        let bytes = hex::decode(signature.trim().trim_start_matches("0x"))
            .map_err(|_| LendingError::InvalidSignature)?;
        let signature =
            Signature::try_from(bytes.as_slice()).map_err(|_| LendingError::InvalidSignature)?;

        let message = signing_message(action, target, amount, nonce);
        let signer = signature
            .recover(message.as_bytes())
            .map_err(|_| LendingError::InvalidSignature)?;

        if Address::from(signer) != *caller {
            tracing::warn!(%caller, action = action.as_str(), "Signature does not match caller");
            return Err(LendingError::InvalidSignature);
        }

        let mut nonces = self.nonces.write().unwrap_or_else(|e| e.into_inner());
        let expected = nonces.get(caller).copied().unwrap_or(0);
        if nonce != expected {
            return Err(LendingError::InvalidNonce {
                expected,
                actual: nonce,
            });
        }
        nonces.insert(caller.clone(), expected + 1);

        tracing::debug!(%caller, action = action.as_str(), nonce, "Caller authenticated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::signers::{LocalWallet, Signer};

    fn wallet(seed: u8) -> LocalWallet {
        LocalWallet::from_bytes(&[seed; 32]).unwrap()
    }

    async fn sign(
        wallet: &LocalWallet,
        action: Action,
        target: &str,
        amount: u128,
        nonce: u64,
    ) -> String {
        let message = signing_message(action, target, amount, nonce);
        let signature = wallet.sign_message(message).await.unwrap();
        hex::encode(signature.to_vec())
    }

    #[tokio::test]
    async fn test_valid_signature_consumes_nonce() {
        let auth = CallerAuthenticator::new();
        let alice = wallet(1);
        let caller = Address::from(alice.address());

        let sig = sign(&alice, Action::FundLoan, "L1", 0, 0).await;
        auth.authenticate(&caller, Action::FundLoan, "L1", 0, 0, &sig)
            .unwrap();
        assert_eq!(auth.nonce(&caller), 1);

        // 같은 서명 재전송
        let err = auth
            .authenticate(&caller, Action::FundLoan, "L1", 0, 0, &sig)
            .unwrap_err();
        assert_eq!(err, LendingError::InvalidNonce { expected: 1, actual: 0 });
    }

    #[tokio::test]
    async fn test_signature_from_other_wallet_rejected() {
        let auth = CallerAuthenticator::new();
        let victim = Address::from(wallet(1).address());
        let mallory = wallet(2);

        let sig = sign(&mallory, Action::Approve, "USDC", 1_000, 0).await;
        let err = auth
            .authenticate(&victim, Action::Approve, "USDC", 1_000, 0, &sig)
            .unwrap_err();

        assert_eq!(err, LendingError::InvalidSignature);
        assert_eq!(auth.nonce(&victim), 0);
    }

    #[tokio::test]
    async fn test_signed_fields_are_bound() {
        let auth = CallerAuthenticator::new();
        let alice = wallet(3);
        let caller = Address::from(alice.address());

        let sig = sign(&alice, Action::MakeRepayment, "L1", 10, 0).await;

        // amount, target, action 중 하나라도 다르면 다른 주소가 복구됨
        for (action, target, amount) in [
            (Action::MakeRepayment, "L1", 1_000),
            (Action::MakeRepayment, "L2", 10),
            (Action::Liquidate, "L1", 10),
        ] {
            let err = auth
                .authenticate(&caller, action, target, amount, 0, &sig)
                .unwrap_err();
            assert_eq!(err, LendingError::InvalidSignature);
        }

        assert!(auth
            .authenticate(&caller, Action::MakeRepayment, "L1", 10, 0, &sig)
            .is_ok());
    }

    #[test]
    fn test_malformed_signature() {
        let auth = CallerAuthenticator::new();
        let caller = Address::zero();

        for raw in ["", "zz", "0x1234"] {
            let err = auth
                .authenticate(&caller, Action::FundLoan, "L1", 0, 0, raw)
                .unwrap_err();
            assert_eq!(err, LendingError::InvalidSignature);
        }
    }
}
