//! Loan Escrow - 대출 lifecycle state machine
//!
//! # State Machine
//!
//! ```text
//!  create        deposit_collateral      fund_loan
//! ───────▶ Pending ──────────▶ Collateralized ──────────▶ Active ──┬──▶ Repaid       (terminal)
//!                                                                  │
//!                                       mark_defaulted (now > due) └──▶ Defaulted ──▶ Liquidated (terminal)
//!                                                                            liquidate
//! ```
//!
//! - 상태 전이는 단방향 (역방향 없음)
//! - 모든 전이는 자산 이동 전에 상태와 호출자를 검증
//! - 전이의 자산 이동은 하나의 batch로 실행. 실패 시 상태 변화 없음
//! - 자격(eligibility)은 생성 시점에만 검사. 이후 attestation이 만료되어도 기존 대출은 유지
//!
//! # Interest
//!
//! ```text
//! total_repayment = principal + principal * rate_bps * duration_days / (10000 * 365)
//! ```
//!
//! 생성 시 한 번만 계산 (정수 연산, 0 방향 절삭). 대출 기간 중 재계산 없음.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{LendingError, LendingResult};
use crate::services::clock::Clock;
use crate::services::events::{EventLog, LendingEvent};
use crate::services::guard::ReentrancyGuard;
use crate::services::ledger::{Account, AssetLedger, Transfer};
use crate::services::registry::EligibilityRegistry;
use crate::types::{amount_str, Address, AssetId, LoanId, Timestamp, SECONDS_PER_DAY};

const BPS_DENOMINATOR: u128 = 10_000;
const DAYS_PER_YEAR: u128 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LoanStatus {
    Pending,
    Collateralized,
    Active,
    Repaid,
    Defaulted,
    Liquidated,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "Pending",
            LoanStatus::Collateralized => "Collateralized",
            LoanStatus::Active => "Active",
            LoanStatus::Repaid => "Repaid",
            LoanStatus::Defaulted => "Defaulted",
            LoanStatus::Liquidated => "Liquidated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Repaid | LoanStatus::Liquidated)
    }
}

/// 대출 생성 조건
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoanTerms {
    pub id: LoanId,
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
    /// 대출자가 요구하는 최소 score
    #[serde(with = "amount_str")]
    pub lender_threshold: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Loan {
    pub id: LoanId,
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
    pub total_repayment: u128,
    /// 펀딩 전에는 0
    pub started_at: Timestamp,
    pub due_at: Timestamp,
    #[serde(with = "amount_str")]
    pub amount_repaid: u128,
    pub status: LoanStatus,
    /// 이 대출 전용 escrow 계정에 보관 중인 담보
    #[serde(with = "amount_str")]
    pub collateral_held: u128,
    pub created_at: Timestamp,
}

impl Loan {
    pub fn remaining(&self) -> u128 {
        self.total_repayment - self.amount_repaid
    }

    pub fn is_overdue_at(&self, now: Timestamp) -> bool {
        self.status == LoanStatus::Active
            && now > self.due_at
            && self.amount_repaid < self.total_repayment
    }

    fn escrow_account(&self) -> Account {
        Account::Escrow(self.id.clone())
    }

    fn expect_status(&self, expected: LoanStatus) -> LendingResult<()> {
        if self.status != expected {
            return Err(LendingError::InvalidState {
                expected: expected.as_str(),
                actual: self.status.as_str(),
            });
        }
        Ok(())
    }
}

/// 총 상환액 계산
///
/// `principal * rate_bps * duration_days`가 u128 범위를 넘으면 `ArithmeticOverflow`
pub fn total_repayment(principal: u128, rate_bps: u32, duration_days: u32) -> LendingResult<u128> {
    let interest = principal
        .checked_mul(rate_bps as u128)
        .and_then(|v| v.checked_mul(duration_days as u128))
        .ok_or(LendingError::ArithmeticOverflow("interest"))?
        / (BPS_DENOMINATOR * DAYS_PER_YEAR);

    principal
        .checked_add(interest)
        .ok_or(LendingError::ArithmeticOverflow("total repayment"))
}

/// 전이 결과: 검증을 통과한 다음 상태 + 실행할 자산 이동 + 발행할 이벤트
struct Step {
    next: Loan,
    transfers: Vec<Transfer>,
    events: Vec<LendingEvent>,
}

pub struct LoanEscrow {
    registry: Arc<EligibilityRegistry>,
    ledger: Arc<dyn AssetLedger>,
    clock: Arc<dyn Clock>,
    events: Arc<EventLog>,
    /// 생성 시 요구되는 attestation 최대 나이 (초)
    freshness_window: u64,
    loans: RwLock<HashMap<LoanId, Loan>>,
    guard: ReentrancyGuard,
}

impl LoanEscrow {
    pub fn new(
        registry: Arc<EligibilityRegistry>,
        ledger: Arc<dyn AssetLedger>,
        clock: Arc<dyn Clock>,
        events: Arc<EventLog>,
        freshness_window: u64,
    ) -> Self {
        Self {
            registry,
            ledger,
            clock,
            events,
            freshness_window,
            loans: RwLock::new(HashMap::new()),
            guard: ReentrancyGuard::new(),
        }
    }

    pub fn freshness_window(&self) -> u64 {
        self.freshness_window
    }

    /// 대출 생성
    ///
    /// # Guards
    ///
    /// 1. id 미사용
    /// 2. borrower ≠ lender, 둘 다 non-null
    /// 3. loan asset ≠ collateral asset
    /// 4. principal > 0, collateral > 0, duration > 0
    /// 5. borrower: attestation 존재 → 신선함 → threshold 충족
    pub fn create_loan(&self, terms: LoanTerms) -> LendingResult<Loan> {
        let _token = self.guard.enter()?;
        let id = terms.id.clone();

        self.admit(terms).map_err(|err| {
            tracing::warn!(loan_id = %id, error = %err, "Loan creation rejected");
            err
        })
    }

    fn admit(&self, terms: LoanTerms) -> LendingResult<Loan> {
        if self.read(|loans| loans.contains_key(&terms.id)) {
            return Err(LendingError::LoanAlreadyExists(terms.id));
        }

        if terms.borrower == terms.lender || terms.borrower.is_zero() || terms.lender.is_zero() {
            return Err(LendingError::InvalidParticipants);
        }

        if terms.loan_asset == terms.collateral_asset {
            return Err(LendingError::InvalidAssets);
        }

        if terms.principal == 0 || terms.collateral_amount == 0 {
            return Err(LendingError::InvalidAmount);
        }

        if terms.duration_days == 0 {
            return Err(LendingError::InvalidDuration);
        }

        let borrower = &terms.borrower;
        if !self.registry.is_eligible(borrower) {
            return Err(LendingError::NoAttestation);
        }
        if !self.registry.is_fresh(borrower, self.freshness_window) {
            return Err(LendingError::CreditScoreExpired);
        }
        if !self.registry.meets_threshold(borrower, terms.lender_threshold) {
            return Err(LendingError::InsufficientCreditScore);
        }

        let total = total_repayment(terms.principal, terms.interest_rate_bps, terms.duration_days)?;
        let now = self.clock.now();

        let loan = Loan {
            id: terms.id,
            borrower: terms.borrower,
            lender: terms.lender,
            loan_asset: terms.loan_asset,
            collateral_asset: terms.collateral_asset,
            principal: terms.principal,
            collateral_amount: terms.collateral_amount,
            interest_rate_bps: terms.interest_rate_bps,
            duration_days: terms.duration_days,
            total_repayment: total,
            started_at: 0,
            due_at: 0,
            amount_repaid: 0,
            status: LoanStatus::Pending,
            collateral_held: 0,
            created_at: now,
        };

        {
            let mut loans = self.loans.write().unwrap_or_else(|e| e.into_inner());
            loans.insert(loan.id.clone(), loan.clone());
        }

        tracing::info!(
            loan_id = %loan.id,
            borrower = %loan.borrower,
            lender = %loan.lender,
            principal = %loan.principal,
            total_repayment = %loan.total_repayment,
            "Loan created"
        );
        self.events.emit(
            now,
            LendingEvent::LoanCreated {
                loan_id: loan.id.clone(),
                borrower: loan.borrower.clone(),
                lender: loan.lender.clone(),
                loan_asset: loan.loan_asset.clone(),
                collateral_asset: loan.collateral_asset.clone(),
                principal: loan.principal,
                collateral_amount: loan.collateral_amount,
                total_repayment: loan.total_repayment,
            },
        );

        Ok(loan)
    }

    /// 담보 예치 (borrower)
    pub fn deposit_collateral(&self, caller: &Address, id: &LoanId) -> LendingResult<Loan> {
        self.transition(id, "deposit_collateral", |loan, _now| {
            loan.expect_status(LoanStatus::Pending)?;
            if *caller != loan.borrower {
                return Err(LendingError::Unauthorized);
            }

            let mut next = loan.clone();
            next.status = LoanStatus::Collateralized;
            next.collateral_held = loan.collateral_amount;

            Ok(Step {
                transfers: vec![Transfer::new(
                    &loan.collateral_asset,
                    Account::User(loan.borrower.clone()),
                    loan.escrow_account(),
                    loan.collateral_amount,
                )],
                events: vec![LendingEvent::CollateralDeposited {
                    loan_id: loan.id.clone(),
                    borrower: loan.borrower.clone(),
                    amount: loan.collateral_amount,
                }],
                next,
            })
        })
    }

    /// 대출금 지급 (lender → borrower)
    pub fn fund_loan(&self, caller: &Address, id: &LoanId) -> LendingResult<Loan> {
        self.transition(id, "fund_loan", |loan, now| {
            loan.expect_status(LoanStatus::Collateralized)?;
            if *caller != loan.lender {
                return Err(LendingError::Unauthorized);
            }

            let due_at = (loan.duration_days as u64)
                .checked_mul(SECONDS_PER_DAY)
                .and_then(|d| now.checked_add(d))
                .ok_or(LendingError::ArithmeticOverflow("due date"))?;

            let mut next = loan.clone();
            next.status = LoanStatus::Active;
            next.started_at = now;
            next.due_at = due_at;

            Ok(Step {
                transfers: vec![Transfer::new(
                    &loan.loan_asset,
                    Account::User(loan.lender.clone()),
                    Account::User(loan.borrower.clone()),
                    loan.principal,
                )],
                events: vec![LendingEvent::LoanFunded {
                    loan_id: loan.id.clone(),
                    lender: loan.lender.clone(),
                    principal: loan.principal,
                    started_at: now,
                    due_at,
                }],
                next,
            })
        })
    }

    /// 상환 (borrower → lender)
    ///
    /// 전액 상환 시 담보를 borrower에게 반환하고 Repaid로 전이
    pub fn make_repayment(&self, caller: &Address, id: &LoanId, amount: u128) -> LendingResult<Loan> {
        self.transition(id, "make_repayment", |loan, _now| {
            loan.expect_status(LoanStatus::Active)?;
            if *caller != loan.borrower {
                return Err(LendingError::Unauthorized);
            }
            if amount == 0 {
                return Err(LendingError::InvalidAmount);
            }
            let remaining = loan.remaining();
            if amount > remaining {
                return Err(LendingError::RepaymentExceedsBalance { amount, remaining });
            }

            let mut next = loan.clone();
            next.amount_repaid += amount;

            let mut transfers = vec![Transfer::new(
                &loan.loan_asset,
                Account::User(loan.borrower.clone()),
                Account::User(loan.lender.clone()),
                amount,
            )];
            let mut events = vec![LendingEvent::RepaymentMade {
                loan_id: loan.id.clone(),
                borrower: loan.borrower.clone(),
                amount,
                amount_repaid: next.amount_repaid,
            }];

            if next.amount_repaid == loan.total_repayment {
                transfers.push(Transfer::new(
                    &loan.collateral_asset,
                    loan.escrow_account(),
                    Account::User(loan.borrower.clone()),
                    loan.collateral_held,
                ));
                events.push(LendingEvent::LoanRepaid {
                    loan_id: loan.id.clone(),
                    collateral_returned: loan.collateral_held,
                });
                next.status = LoanStatus::Repaid;
                next.collateral_held = 0;
            }

            Ok(Step {
                next,
                transfers,
                events,
            })
        })
    }

    /// 연체 처리 (누구나 호출 가능)
    pub fn mark_defaulted(&self, caller: &Address, id: &LoanId) -> LendingResult<Loan> {
        tracing::debug!(loan_id = %id, %caller, "Default check requested");

        self.transition(id, "mark_defaulted", |loan, now| {
            loan.expect_status(LoanStatus::Active)?;
            if !loan.is_overdue_at(now) {
                return Err(LendingError::NotOverdue);
            }

            let mut next = loan.clone();
            next.status = LoanStatus::Defaulted;

            Ok(Step {
                transfers: Vec::new(),
                events: vec![LendingEvent::LoanDefaulted {
                    loan_id: loan.id.clone(),
                    amount_repaid: loan.amount_repaid,
                    total_repayment: loan.total_repayment,
                }],
                next,
            })
        })
    }

    /// 담보 청산 (lender)
    pub fn liquidate(&self, caller: &Address, id: &LoanId) -> LendingResult<Loan> {
        self.transition(id, "liquidate", |loan, _now| {
            loan.expect_status(LoanStatus::Defaulted)?;
            if *caller != loan.lender {
                return Err(LendingError::Unauthorized);
            }

            let mut next = loan.clone();
            next.status = LoanStatus::Liquidated;
            next.collateral_held = 0;

            Ok(Step {
                transfers: vec![Transfer::new(
                    &loan.collateral_asset,
                    loan.escrow_account(),
                    Account::User(loan.lender.clone()),
                    loan.collateral_held,
                )],
                events: vec![LendingEvent::CollateralLiquidated {
                    loan_id: loan.id.clone(),
                    lender: loan.lender.clone(),
                    collateral_amount: loan.collateral_held,
                }],
                next,
            })
        })
    }

    pub fn get_loan(&self, id: &LoanId) -> LendingResult<Loan> {
        self.read(|loans| loans.get(id).cloned())
            .ok_or_else(|| LendingError::LoanNotFound(id.clone()))
    }

    /// `status == Active ∧ now > due_at ∧ amount_repaid < total_repayment`
    pub fn is_overdue(&self, id: &LoanId) -> bool {
        let now = self.clock.now();
        self.read(|loans| loans.get(id).is_some_and(|loan| loan.is_overdue_at(now)))
    }

    pub fn remaining_balance(&self, id: &LoanId) -> LendingResult<u128> {
        self.get_loan(id).map(|loan| loan.remaining())
    }

    pub fn loans_by_borrower(&self, borrower: &Address) -> Vec<Loan> {
        let mut loans: Vec<Loan> = self.read(|loans| {
            loans
                .values()
                .filter(|loan| loan.borrower == *borrower)
                .cloned()
                .collect()
        });
        loans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        loans
    }

    /// 공통 전이 실행
    ///
    /// guard 획득 → 현재 상태 복사 → 검증/계산 (부작용 없음) → 자산 이동 → 커밋 → 이벤트
    fn transition<F>(&self, id: &LoanId, op: &'static str, plan: F) -> LendingResult<Loan>
    where
        F: FnOnce(&Loan, Timestamp) -> LendingResult<Step>,
    {
        let result = self.guard.enter().and_then(|_token| {
            let current = self.get_loan(id)?;
            let now = self.clock.now();
            let step = plan(&current, now)?;

            if !step.transfers.is_empty() {
                self.ledger.transfer_batch(&step.transfers)?;
            }

            {
                let mut loans = self.loans.write().unwrap_or_else(|e| e.into_inner());
                loans.insert(step.next.id.clone(), step.next.clone());
            }

            tracing::info!(
                loan_id = %id,
                op,
                from = current.status.as_str(),
                to = step.next.status.as_str(),
                terminal = step.next.status.is_terminal(),
                "Loan transition"
            );
            for event in step.events {
                self.events.emit(now, event);
            }

            Ok(step.next)
        });

        if let Err(err) = &result {
            tracing::warn!(loan_id = %id, op, error = %err, "Loan transition rejected");
        }
        result
    }

    fn read<T>(&self, f: impl FnOnce(&HashMap<LoanId, Loan>) -> T) -> T {
        let loans = self.loans.read().unwrap_or_else(|e| e.into_inner());
        f(&loans)
    }
}
