//! Database Models
//!
//! 인덱싱된 프로토콜 이벤트. payload는 `LendingEvent`의 JSON 표현 그대로 저장.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::services::EventRecord;

/// 인덱싱된 이벤트 행
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EventRow {
    /// 프로세스 실행 ID
    pub run_id: Uuid,

    /// 실행 내 sequence
    pub sequence: i64,

    /// 이벤트 타입 (LoanCreated, RepaymentMade, ...)
    pub event_type: String,

    /// loan id 또는 subject address
    pub event_key: String,

    pub payload: serde_json::Value,

    pub emitted_at: DateTime<Utc>,
}

impl EventRow {
    pub fn from_record(run_id: Uuid, record: &EventRecord) -> Self {
        Self {
            run_id,
            sequence: record.sequence as i64,
            event_type: record.event.name().to_string(),
            event_key: record.event.key(),
            payload: serde_json::to_value(&record.event).unwrap_or(serde_json::Value::Null),
            emitted_at: Utc
                .timestamp_opt(record.emitted_at as i64, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::LendingEvent;
    use crate::types::LoanId;

    #[test]
    fn test_row_from_record() {
        let record = EventRecord {
            sequence: 3,
            emitted_at: 1_700_000_000,
            event: LendingEvent::LoanRepaid {
                loan_id: LoanId::new("L1").unwrap(),
                collateral_returned: 2_000,
            },
        };

        let row = EventRow::from_record(Uuid::nil(), &record);
        assert_eq!(row.sequence, 3);
        assert_eq!(row.event_type, "LoanRepaid");
        assert_eq!(row.event_key, "L1");
        assert_eq!(row.payload["data"]["collateral_returned"], "2000");
        assert_eq!(row.emitted_at.timestamp(), 1_700_000_000);
    }
}
