//! Configuration Module
//!
//! 환경변수 기반 설정 (12-Factor). `from_env()`에서 모든 값을 검증하고
//! 잘못된 값이 있으면 시작 시점에 즉시 실패.

use std::env;
use anyhow::{bail, Context, Result};

use crate::services::events::DEFAULT_EVENT_RETENTION;

/// 기본 attestation freshness window: 24시간
pub const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 24 * 60 * 60;

/// 애플리케이션 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 서버 포트 (기본값: 3001)
    pub port: u16,

    /// PostgreSQL 연결 문자열 (옵션)
    /// 설정 시 이벤트 인덱서 활성화
    pub database_url: Option<String>,

    /// 대출 생성 시 요구되는 attestation 최대 나이 (초)
    pub freshness_window_secs: u64,

    /// 메모리에 보관하는 최근 이벤트 수
    pub event_retention: usize,

    /// 현재 허용되는 scoring circuit 버전 목록
    pub accepted_schema_versions: Vec<u32>,

    /// Attestation verifier key (hex, 32 bytes)
    pub verifier_key: Option<String>,

    /// 프로덕션 CORS 허용 origin 목록
    pub allowed_origins: Vec<String>,

    /// 환경 (development, staging, production)
    pub environment: Environment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Config {
    /// 환경변수에서 설정 로드
    ///
    /// # Optional Environment Variables
    ///
    /// - `PORT`: 서버 포트 (기본값: 3001)
    /// - `DATABASE_URL`: PostgreSQL 연결 문자열
    /// - `FRESHNESS_WINDOW_SECS`: 기본값 86400
    /// - `EVENT_RETENTION`: 기본값 100000
    /// - `ACCEPTED_SCHEMA_VERSIONS`: 쉼표 구분 (기본값: "1")
    /// - `VERIFIER_KEY`: production에서는 필수
    /// - `ALLOWED_ORIGINS`: 쉼표 구분
    /// - `ENVIRONMENT`: development | staging | production
    pub fn from_env() -> Result<Self> {
        let environment = match env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" => Environment::Production,
            "staging" => Environment::Staging,
            _ => Environment::Development,
        };

        let accepted_schema_versions = parse_versions(
            &env::var("ACCEPTED_SCHEMA_VERSIONS").unwrap_or_else(|_| "1".to_string()),
        )?;

        Ok(Config {
            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .context("PORT must be a valid number")?,

            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),

            freshness_window_secs: match env::var("FRESHNESS_WINDOW_SECS") {
                Ok(raw) => raw
                    .parse()
                    .context("FRESHNESS_WINDOW_SECS must be a number of seconds")?,
                Err(_) => DEFAULT_FRESHNESS_WINDOW_SECS,
            },

            event_retention: match env::var("EVENT_RETENTION") {
                Ok(raw) => raw
                    .parse()
                    .context("EVENT_RETENTION must be a positive number")?,
                Err(_) => DEFAULT_EVENT_RETENTION,
            },

            accepted_schema_versions,

            verifier_key: env::var("VERIFIER_KEY").ok().filter(|key| !key.is_empty()),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),

            environment,
        })
    }

    /// 프로덕션 환경인지 확인
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            database_url: None,
            freshness_window_secs: DEFAULT_FRESHNESS_WINDOW_SECS,
            event_retention: DEFAULT_EVENT_RETENTION,
            accepted_schema_versions: vec![1],
            verifier_key: None,
            allowed_origins: Vec::new(),
            environment: Environment::Development,
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_versions(raw: &str) -> Result<Vec<u32>> {
    let versions = split_list(raw)
        .iter()
        .map(|v| {
            v.parse::<u32>()
                .with_context(|| format!("invalid schema version: {}", v))
        })
        .collect::<Result<Vec<_>>>()?;

    if versions.is_empty() {
        bail!("ACCEPTED_SCHEMA_VERSIONS must list at least one version");
    }
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.freshness_window_secs, 86_400);
        assert_eq!(config.event_retention, DEFAULT_EVENT_RETENTION);
        assert_eq!(config.environment, Environment::Development);
        assert!(!config.is_production());
    }

    #[test]
    fn test_parse_versions() {
        assert_eq!(parse_versions("1, 2,3").unwrap(), vec![1, 2, 3]);
        assert!(parse_versions("").is_err());
        assert!(parse_versions("1,v2").is_err());
    }

    #[test]
    fn test_split_list_skips_blanks() {
        assert_eq!(
            split_list("https://a.example, ,https://b.example"),
            vec!["https://a.example", "https://b.example"]
        );
    }
}
