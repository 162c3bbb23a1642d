//! Event Log
//!
//! 외부 감사/인덱싱을 위한 관측 가능한 이벤트.
//!
//! - journal (sequence 번호로 조회). 최근 `retention`개만 메모리에 보관하고
//!   그보다 오래된 항목은 앞에서부터 버림. 영구 보관은 DB 인덱서 담당
//! - broadcast channel (DB 인덱서 등 실시간 구독자)
//!
//! 이벤트는 작업이 성공적으로 커밋된 뒤에만 발행됨. 실패한 작업은 이벤트 없음.

use std::collections::VecDeque;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{amount_str, Address, AssetId, LoanId, Nullifier, Timestamp};

/// 프로토콜 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LendingEvent {
    AttestationAccepted {
        subject: Address,
        nullifier: Nullifier,
        schema_version: u32,
        issued_at: Timestamp,
    },
    LoanCreated {
        loan_id: LoanId,
        borrower: Address,
        lender: Address,
        loan_asset: AssetId,
        collateral_asset: AssetId,
        #[serde(with = "amount_str")]
        principal: u128,
        #[serde(with = "amount_str")]
        collateral_amount: u128,
        #[serde(with = "amount_str")]
        total_repayment: u128,
    },
    CollateralDeposited {
        loan_id: LoanId,
        borrower: Address,
        #[serde(with = "amount_str")]
        amount: u128,
    },
    LoanFunded {
        loan_id: LoanId,
        lender: Address,
        #[serde(with = "amount_str")]
        principal: u128,
        started_at: Timestamp,
        due_at: Timestamp,
    },
    RepaymentMade {
        loan_id: LoanId,
        borrower: Address,
        #[serde(with = "amount_str")]
        amount: u128,
        #[serde(with = "amount_str")]
        amount_repaid: u128,
    },
    LoanRepaid {
        loan_id: LoanId,
        #[serde(with = "amount_str")]
        collateral_returned: u128,
    },
    LoanDefaulted {
        loan_id: LoanId,
        #[serde(with = "amount_str")]
        amount_repaid: u128,
        #[serde(with = "amount_str")]
        total_repayment: u128,
    },
    CollateralLiquidated {
        loan_id: LoanId,
        lender: Address,
        #[serde(with = "amount_str")]
        collateral_amount: u128,
    },
}

impl LendingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LendingEvent::AttestationAccepted { .. } => "AttestationAccepted",
            LendingEvent::LoanCreated { .. } => "LoanCreated",
            LendingEvent::CollateralDeposited { .. } => "CollateralDeposited",
            LendingEvent::LoanFunded { .. } => "LoanFunded",
            LendingEvent::RepaymentMade { .. } => "RepaymentMade",
            LendingEvent::LoanRepaid { .. } => "LoanRepaid",
            LendingEvent::LoanDefaulted { .. } => "LoanDefaulted",
            LendingEvent::CollateralLiquidated { .. } => "CollateralLiquidated",
        }
    }

    /// 인덱싱 키 (loan id 또는 subject)
    pub fn key(&self) -> String {
        match self {
            LendingEvent::AttestationAccepted { subject, .. } => subject.to_string(),
            LendingEvent::LoanCreated { loan_id, .. }
            | LendingEvent::CollateralDeposited { loan_id, .. }
            | LendingEvent::LoanFunded { loan_id, .. }
            | LendingEvent::RepaymentMade { loan_id, .. }
            | LendingEvent::LoanRepaid { loan_id, .. }
            | LendingEvent::LoanDefaulted { loan_id, .. }
            | LendingEvent::CollateralLiquidated { loan_id, .. } => loan_id.to_string(),
        }
    }
}

/// journal에 기록된 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub emitted_at: Timestamp,
    pub event: LendingEvent,
}

/// 기본 journal 보관 개수
pub const DEFAULT_EVENT_RETENTION: usize = 100_000;

#[derive(Default)]
struct Journal {
    records: VecDeque<EventRecord>,
    next_sequence: u64,
}

/// 이벤트 journal + broadcast
pub struct EventLog {
    journal: RwLock<Journal>,
    retention: usize,
    tx: broadcast::Sender<EventRecord>,
}

impl EventLog {
    /// 브로드캐스트 버퍼 크기 (느린 구독자는 lagged 처리)
    const CHANNEL_CAPACITY: usize = 1024;

    pub fn new() -> Self {
        Self::with_retention(DEFAULT_EVENT_RETENTION)
    }

    /// 최근 `retention`개만 보관 (최소 1)
    pub fn with_retention(retention: usize) -> Self {
        let (tx, _) = broadcast::channel(Self::CHANNEL_CAPACITY);
        Self {
            journal: RwLock::new(Journal::default()),
            retention: retention.max(1),
            tx,
        }
    }

    pub fn emit(&self, emitted_at: Timestamp, event: LendingEvent) -> u64 {
        let record = {
            let mut journal = self.journal.write().unwrap_or_else(|e| e.into_inner());
            let record = EventRecord {
                sequence: journal.next_sequence,
                emitted_at,
                event,
            };
            journal.next_sequence += 1;
            journal.records.push_back(record.clone());
            while journal.records.len() > self.retention {
                journal.records.pop_front();
            }
            record
        };

        tracing::debug!(
            sequence = record.sequence,
            event = record.event.name(),
            key = %record.event.key(),
            "Event emitted"
        );

        // 구독자가 없어도 journal에는 남아있음
        let _ = self.tx.send(record.clone());
        record.sequence
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.tx.subscribe()
    }

    /// `sequence` 이상인 이벤트 중 아직 보관 중인 것
    pub fn events_since(&self, sequence: u64) -> Vec<EventRecord> {
        let journal = self.journal.read().unwrap_or_else(|e| e.into_inner());
        let oldest = journal.records.front().map_or(journal.next_sequence, |r| r.sequence);
        let skip = sequence.saturating_sub(oldest).min(journal.records.len() as u64) as usize;
        journal.records.iter().skip(skip).cloned().collect()
    }

    /// 지금까지 발행된 전체 이벤트 수 (버려진 것 포함)
    pub fn emitted(&self) -> u64 {
        self.journal.read().unwrap_or_else(|e| e.into_inner()).next_sequence
    }

    /// 보관 중인 이벤트 수
    pub fn len(&self) -> usize {
        self.journal.read().unwrap_or_else(|e| e.into_inner()).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaulted(id: &str) -> LendingEvent {
        LendingEvent::LoanDefaulted {
            loan_id: LoanId::new(id).unwrap(),
            amount_repaid: 0,
            total_repayment: 1_008,
        }
    }

    #[test]
    fn test_sequence_and_since() {
        let log = EventLog::new();
        assert!(log.is_empty());

        assert_eq!(log.emit(10, defaulted("L1")), 0);
        assert_eq!(log.emit(11, defaulted("L2")), 1);

        let tail = log.events_since(1);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].event.key(), "L2");
        assert!(log.events_since(99).is_empty());
    }

    #[test]
    fn test_retention_drops_oldest() {
        let log = EventLog::with_retention(2);
        for (i, id) in ["L1", "L2", "L3"].into_iter().enumerate() {
            assert_eq!(log.emit(10 + i as u64, defaulted(id)), i as u64);
        }

        assert_eq!(log.len(), 2);
        assert_eq!(log.emitted(), 3);

        let kept: Vec<_> = log.events_since(0).iter().map(|r| r.sequence).collect();
        assert_eq!(kept, vec![1, 2]);
        assert_eq!(log.events_since(2).len(), 1);
        assert!(log.events_since(3).is_empty());
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let log = EventLog::new();
        let mut rx = log.subscribe();

        log.emit(10, defaulted("L1"));

        let record = rx.recv().await.unwrap();
        assert_eq!(record.event.name(), "LoanDefaulted");
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(defaulted("L1")).unwrap();
        assert_eq!(json["type"], "LoanDefaulted");
        assert_eq!(json["data"]["total_repayment"], "1008");
    }
}
