//! Database Module
//!
//! 프로토콜 이벤트 인덱싱 (PostgreSQL).
//!
//! 프로토콜 상태 자체는 DB에 의존하지 않음. DB는 외부 감사/조회를 위한
//! 이벤트 사본만 보관하며, `DATABASE_URL`이 없으면 인덱서는 비활성화됨.
//!
//! # Connection Pool
//!
//! - max_connections: 10
//! - min_connections: 1
//! - acquire_timeout: 3초

mod models;
mod repository;

pub use models::*;
pub use repository::{run_indexer, EventRepository};

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// 데이터베이스 연결 및 쿼리 담당
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 데이터베이스 연결
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EventRepository for Database {
    /// 이벤트 저장 (같은 run/sequence 재전송은 무시)
    async fn save_event(&self, row: &EventRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lending_events (
                run_id, sequence, event_type, event_key, payload, emitted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (run_id, sequence) DO NOTHING
            "#
        )
        .bind(row.run_id)
        .bind(row.sequence)
        .bind(&row.event_type)
        .bind(&row.event_key)
        .bind(&row.payload)
        .bind(row.emitted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// loan id / subject 기준 최근 이벤트 조회
    async fn find_by_key(&self, key: &str, limit: u32) -> Result<Vec<EventRow>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT
                run_id,
                sequence,
                event_type,
                event_key,
                payload,
                emitted_at
            FROM lending_events
            WHERE event_key = $1
            ORDER BY emitted_at DESC, sequence DESC
            LIMIT $2
            "#
        )
        .bind(key)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
