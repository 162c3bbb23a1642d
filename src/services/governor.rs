//! Scoring-circuit version governor
//!
//! 어떤 scoring circuit 버전이 현재 허용되는지에 대한 읽기 전용 질의.
//! 버전 승인(multi-party approval)은 외부 거버넌스 프로세스의 책임이고,
//! 여기서는 그 결과가 반영된 프로세스 전역 설정만 다룸.

use std::collections::BTreeSet;
use std::sync::RwLock;

pub trait VersionGovernor: Send + Sync {
    fn is_version_accepted(&self, schema_version: u32) -> bool;
}

/// 설정 기반 governor
///
/// `ACCEPTED_SCHEMA_VERSIONS` 환경변수로 초기화됨
#[derive(Debug, Default)]
pub struct StaticVersionGovernor {
    accepted: RwLock<BTreeSet<u32>>,
}

impl StaticVersionGovernor {
    pub fn new(versions: impl IntoIterator<Item = u32>) -> Self {
        Self {
            accepted: RwLock::new(versions.into_iter().collect()),
        }
    }

    /// 외부 거버넌스가 새 버전을 승인했을 때 반영
    pub fn accept(&self, schema_version: u32) {
        let mut accepted = self.accepted.write().unwrap_or_else(|e| e.into_inner());
        if accepted.insert(schema_version) {
            tracing::info!(schema_version, "Schema version accepted");
        }
    }

    /// 외부 거버넌스가 버전을 폐기했을 때 반영
    pub fn deprecate(&self, schema_version: u32) {
        let mut accepted = self.accepted.write().unwrap_or_else(|e| e.into_inner());
        if accepted.remove(&schema_version) {
            tracing::info!(schema_version, "Schema version deprecated");
        }
    }

    pub fn accepted_versions(&self) -> Vec<u32> {
        let accepted = self.accepted.read().unwrap_or_else(|e| e.into_inner());
        accepted.iter().copied().collect()
    }
}

impl VersionGovernor for StaticVersionGovernor {
    fn is_version_accepted(&self, schema_version: u32) -> bool {
        let accepted = self.accepted.read().unwrap_or_else(|e| e.into_inner());
        accepted.contains(&schema_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_and_deprecate() {
        let governor = StaticVersionGovernor::new([1]);
        assert!(governor.is_version_accepted(1));
        assert!(!governor.is_version_accepted(2));

        governor.accept(2);
        governor.deprecate(1);

        assert!(!governor.is_version_accepted(1));
        assert!(governor.is_version_accepted(2));
        assert_eq!(governor.accepted_versions(), vec![2]);
    }
}
