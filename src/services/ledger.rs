//! Asset Ledger
//!
//! Escrow가 사용하는 underlying asset layer.
//!
//! # Custody Model
//!
//! ```text
//! Account::User(address)      사용자 잔고 (escrow가 가져가려면 allowance 필요)
//! Account::Escrow(loan_id)    대출별 custody 계정 (다른 대출과 절대 섞이지 않음)
//! ```
//!
//! # Atomicity
//!
//! `transfer_batch`는 all-or-nothing:
//! 1. 모든 leg를 overlay에서 검증 (잔고, allowance). state는 건드리지 않음
//! 2. leg별 transfer hook 실행 (lock 해제 상태, hook이 escrow나 ledger를 다시 호출할 수 있음)
//! 3. hook 하나라도 거부하면 아무것도 커밋되지 않음
//! 4. 모두 통과하면 lock 아래에서 현재 state 기준으로 다시 검증 후 한 번에 커밋
//!
//! hook 실행 중 다른 쓰기가 있었어도 커밋은 그 결과 위에 delta로 적용됨.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;

use crate::error::TransferError;
use crate::types::{amount_str, Address, AssetId, LoanId};

/// 잔고 보유 주체
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Account {
    User(Address),
    Escrow(LoanId),
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Account::User(addr) => write!(f, "{}", addr),
            Account::Escrow(loan_id) => write!(f, "escrow:{}", loan_id),
        }
    }
}

/// 단일 자산 이동 (leg)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub asset: AssetId,
    pub from: Account,
    pub to: Account,
    #[serde(with = "amount_str")]
    pub amount: u128,
}

impl Transfer {
    pub fn new(asset: &AssetId, from: Account, to: Account, amount: u128) -> Self {
        Self {
            asset: asset.clone(),
            from,
            to,
            amount,
        }
    }
}

pub trait AssetLedger: Send + Sync {
    /// 모든 leg가 적용되거나 아무것도 적용되지 않음
    fn transfer_batch(&self, transfers: &[Transfer]) -> Result<(), TransferError>;

    fn balance_of(&self, asset: &AssetId, account: &Account) -> u128;

    /// owner가 escrow에 허용한 잔여 allowance
    fn allowance(&self, asset: &AssetId, owner: &Address) -> u128;
}

/// 수신 hook (ERC-777 tokensReceived 스타일)
///
/// hook은 escrow를 다시 호출할 수 있음 → escrow는 reentrancy guard로 거부해야 함
pub trait TransferHook: Send + Sync {
    fn on_transfer(&self, transfer: &Transfer) -> Result<(), String>;
}

type BalanceKey = (AssetId, Account);
type AllowanceKey = (AssetId, Address);

#[derive(Default)]
struct LedgerState {
    balances: HashMap<BalanceKey, u128>,
    allowances: HashMap<AllowanceKey, u128>,
}

/// 검증을 통과한 batch의 결과 값 (아직 커밋 전)
#[derive(Default)]
struct Staged {
    balances: HashMap<BalanceKey, u128>,
    allowances: HashMap<AllowanceKey, u128>,
}

impl Staged {
    fn commit(self, state: &mut LedgerState) {
        state.balances.extend(self.balances);
        state.allowances.extend(self.allowances);
    }
}

/// 인메모리 자산 원장
#[derive(Default)]
pub struct InMemoryAssetLedger {
    state: Mutex<LedgerState>,
    hook: RwLock<Option<Arc<dyn TransferHook>>>,
}

impl InMemoryAssetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hook(&self, hook: Option<Arc<dyn TransferHook>>) {
        *self.hook.write().unwrap_or_else(|e| e.into_inner()) = hook;
    }

    /// 잔고 발행 (개발 faucet, 테스트)
    pub fn mint(&self, asset: &AssetId, account: &Account, amount: u128) -> Result<(), TransferError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let balance = state
            .balances
            .entry((asset.clone(), account.clone()))
            .or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| TransferError::BalanceOverflow {
                asset: asset.clone(),
                account: account.to_string(),
            })?;

        tracing::debug!(%asset, %account, amount = %amount, "Minted");
        Ok(())
    }

    /// owner → escrow allowance 설정 (덮어쓰기)
    pub fn approve(&self, owner: &Address, asset: &AssetId, amount: u128) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.allowances.insert((asset.clone(), owner.clone()), amount);
        tracing::debug!(%owner, %asset, amount = %amount, "Allowance set");
    }

    /// 현재 state 위에 batch를 적용한 결과 계산 (state 변경 없음)
    fn stage(state: &LedgerState, transfers: &[Transfer]) -> Result<Staged, TransferError> {
        let mut staged = Staged::default();
        let balances = &mut staged.balances;
        let allowances = &mut staged.allowances;

        for t in transfers.iter().filter(|t| t.amount > 0) {
            // escrow가 사용자 계정에서 가져가는 leg는 allowance 소비
            if let Account::User(owner) = &t.from {
                let key = (t.asset.clone(), owner.clone());
                let available = allowances
                    .get(&key)
                    .or_else(|| state.allowances.get(&key))
                    .copied()
                    .unwrap_or(0);
                if available < t.amount {
                    return Err(TransferError::InsufficientAllowance {
                        asset: t.asset.clone(),
                        owner: owner.to_string(),
                        available,
                        required: t.amount,
                    });
                }
                allowances.insert(key, available - t.amount);
            }

            let from_key = (t.asset.clone(), t.from.clone());
            let from_balance = balances
                .get(&from_key)
                .or_else(|| state.balances.get(&from_key))
                .copied()
                .unwrap_or(0);
            if from_balance < t.amount {
                return Err(TransferError::InsufficientBalance {
                    asset: t.asset.clone(),
                    account: t.from.to_string(),
                    available: from_balance,
                    required: t.amount,
                });
            }
            balances.insert(from_key, from_balance - t.amount);

            let to_key = (t.asset.clone(), t.to.clone());
            let to_balance = balances
                .get(&to_key)
                .or_else(|| state.balances.get(&to_key))
                .copied()
                .unwrap_or(0);
            let credited = to_balance
                .checked_add(t.amount)
                .ok_or_else(|| TransferError::BalanceOverflow {
                    asset: t.asset.clone(),
                    account: t.to.to_string(),
                })?;
            balances.insert(to_key, credited);
        }

        Ok(staged)
    }
}

impl AssetLedger for InMemoryAssetLedger {
    fn transfer_batch(&self, transfers: &[Transfer]) -> Result<(), TransferError> {
        {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            Self::stage(&state, transfers)?;
        }

        let hook = self.hook.read().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(hook) = hook {
            for transfer in transfers {
                if let Err(reason) = hook.on_transfer(transfer) {
                    tracing::warn!(%reason, "Transfer hook rejected batch");
                    return Err(TransferError::HookRejected(reason));
                }
            }
        }

        // hook 실행 중 state가 바뀌었을 수 있으므로 다시 검증
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Self::stage(&state, transfers)?.commit(&mut state);
        Ok(())
    }

    fn balance_of(&self, asset: &AssetId, account: &Account) -> u128 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .balances
            .get(&(asset.clone(), account.clone()))
            .copied()
            .unwrap_or(0)
    }

    fn allowance(&self, asset: &AssetId, owner: &Address) -> u128 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .allowances
            .get(&(asset.clone(), owner.clone()))
            .copied()
            .unwrap_or(0)
    }
}
