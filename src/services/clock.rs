//! Clock
//!
//! 시간 기반 판단(attestation freshness, 대출 만기)은 모두 저장된 timestamp와
//! 호출 시점의 "now"를 비교. 백그라운드 타이머 없음.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Timestamp;

/// 현재 시각 제공자
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// 시스템 시계 (UTC unix seconds)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp().max(0) as Timestamp
    }
}

/// 수동 시계 (테스트, 시뮬레이션용)
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.now.store(at, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
