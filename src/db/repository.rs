//! Event Repository
//!
//! 인덱서가 의존하는 저장소 인터페이스. PostgreSQL 구현은 `db/mod.rs`의
//! `Database`, 테스트에서는 인메모리 mock 사용.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use super::models::EventRow;
use crate::services::{EventLog, EventRecord};

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn save_event(&self, row: &EventRow) -> Result<()>;

    async fn find_by_key(&self, key: &str, limit: u32) -> Result<Vec<EventRow>>;
}

/// 저장 실패 시 재시도 간격 (지수 증가)
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// 이벤트 인덱서
///
/// EventLog broadcast를 구독해 저장소에 기록. 항상 journal에서
/// `next_sequence`부터 순서대로 읽어 저장하므로 lagged 구독이나 저장 실패 후에도
/// 누락 없이 이어서 기록함. 저장에 실패하면 그 지점에서 멈추고 backoff 후 재시도.
pub async fn run_indexer(
    repo: Arc<dyn EventRepository>,
    events: Arc<EventLog>,
    run_id: Uuid,
    mut rx: broadcast::Receiver<EventRecord>,
) {
    let mut next_sequence = 0u64;
    tracing::info!(%run_id, "Event indexer started");

    loop {
        match rx.recv().await {
            Ok(record) if record.sequence < next_sequence => continue,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event indexer lagged, backfilling from journal");
            }
            Err(RecvError::Closed) => break,
        }

        let mut backoff = INITIAL_BACKOFF;
        while let Err(e) = flush(repo.as_ref(), &events, run_id, &mut next_sequence).await {
            tracing::error!(
                next_sequence,
                retry_in_ms = backoff.as_millis() as u64,
                "Failed to index event: {:?}",
                e
            );
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    tracing::info!("Event indexer stopped");
}

/// `next_sequence`부터 journal에 남아있는 이벤트를 순서대로 저장
///
/// 실패한 이벤트에서 멈추며 `next_sequence`는 마지막 성공 다음을 가리킴
async fn flush(
    repo: &dyn EventRepository,
    events: &EventLog,
    run_id: Uuid,
    next_sequence: &mut u64,
) -> Result<()> {
    let pending = events.events_since(*next_sequence);

    if let Some(first) = pending.first() {
        if first.sequence > *next_sequence {
            tracing::error!(
                from = *next_sequence,
                to = first.sequence,
                "Events expired from journal before indexing"
            );
        }
    }

    for record in pending {
        repo.save_event(&EventRow::from_record(run_id, &record)).await?;
        *next_sequence = record.sequence + 1;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::mock::MockEventRepository;
    use super::*;
    use crate::services::LendingEvent;
    use crate::types::LoanId;

    fn repaid(id: &str) -> LendingEvent {
        LendingEvent::LoanRepaid {
            loan_id: LoanId::new(id).unwrap(),
            collateral_returned: 1,
        }
    }

    async fn wait_for(repo: &MockEventRepository, count: usize) {
        for _ in 0..200 {
            if repo.sequences().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_indexer_persists_in_order() {
        let repo = Arc::new(MockEventRepository::new());
        let events = Arc::new(EventLog::new());
        let rx = events.subscribe();

        let handle = tokio::spawn(run_indexer(repo.clone(), events.clone(), Uuid::new_v4(), rx));

        events.emit(1, repaid("L1"));
        events.emit(2, repaid("L2"));
        events.emit(3, repaid("L1"));

        wait_for(&repo, 3).await;
        handle.abort();

        assert_eq!(repo.sequences(), vec![0, 1, 2]);
        let l1 = repo.find_by_key("L1", 10).await.unwrap();
        assert_eq!(l1.len(), 2);
        assert_eq!(l1[0].sequence, 2);
    }

    #[tokio::test]
    async fn test_indexer_retries_failed_save() {
        let repo = Arc::new(MockEventRepository::new());
        repo.fail_next(1);
        let events = Arc::new(EventLog::new());
        let rx = events.subscribe();

        let handle = tokio::spawn(run_indexer(repo.clone(), events.clone(), Uuid::new_v4(), rx));

        events.emit(1, repaid("L1"));
        events.emit(2, repaid("L2"));
        events.emit(3, repaid("L3"));

        wait_for(&repo, 3).await;
        handle.abort();

        // 첫 저장 실패 후에도 0번부터 순서대로 모두 기록
        assert_eq!(repo.sequences(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_flush_stops_at_failure() {
        let repo = MockEventRepository::new();
        let events = EventLog::new();
        events.emit(1, repaid("L1"));
        events.emit(2, repaid("L2"));

        let mut next = 0;
        repo.fail_next(1);
        assert!(flush(&repo, &events, Uuid::new_v4(), &mut next).await.is_err());
        assert_eq!(next, 0);
        assert!(repo.sequences().is_empty());

        flush(&repo, &events, Uuid::new_v4(), &mut next).await.unwrap();
        assert_eq!(next, 2);
        assert_eq!(repo.sequences(), vec![0, 1]);
    }
}
