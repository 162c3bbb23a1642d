//! Reentrancy Guard
//!
//! 외부 자산 이동을 수행하는 escrow 작업 전체를 감싸는 scoped lock.
//!
//! - `enter()`로 획득, 반환된 token이 drop될 때 해제 (early return, `?` 포함 모든 경로)
//! - 이미 획득된 상태에서 다시 `enter()` → `ReentrantCall`
//! - 대기(blocking)하지 않음. 중첩 호출은 즉시 실패

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{LendingError, LendingResult};

#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    busy: AtomicBool,
}

/// 획득된 guard. drop 시 해제
#[must_use = "the guard is released as soon as the token is dropped"]
pub struct GuardToken<'a> {
    guard: &'a ReentrancyGuard,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> LendingResult<GuardToken<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| LendingError::ReentrantCall)?;
        Ok(GuardToken { guard: self })
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}
