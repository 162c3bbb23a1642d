//! ZK Credit Lending API Server
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Client (prover environment, wallet)             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum Web Server                         │
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                      Routes Layer                        ││
//! │  │  /health  /attestations/*  /loans/*  /assets/*  /events ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Protocol Core                         ││
//! │  │  EligibilityRegistry    LoanEscrow    AssetLedger       ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Data Layer                            ││
//! │  │  PostgreSQL event indexer (optional)                     ││
//! │  └─────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use zk_credit_lending::{
    db::{run_indexer, EventRepository},
    routes, AppState, Config, Database, LendingProtocol,
};

/// 개발 환경 허용 origin
const DEV_ORIGINS: [&str; 3] = [
    "http://localhost:5173", // Vite dev server
    "http://localhost:3000",
    "http://127.0.0.1:5173",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 환경변수 로드
    dotenvy::dotenv().ok();

    // 로깅 초기화
    // RUST_LOG=debug,sqlx=warn 형태로 레벨 제어 가능
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "zk_credit_lending=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting ZK Credit Lending API Server");

    // 설정 로드
    let config = Config::from_env()?;
    tracing::info!(
        environment = ?config.environment,
        freshness_window_secs = config.freshness_window_secs,
        accepted_schema_versions = ?config.accepted_schema_versions,
        "📋 Configuration loaded"
    );

    // 프로토콜 초기화
    let protocol = LendingProtocol::from_config(&config)?;
    tracing::info!("🔐 Lending protocol initialized");

    // 데이터베이스 (옵션)
    let db = match &config.database_url {
        Some(url) => {
            let db = Database::connect(url).await?;
            tracing::info!("🗄️  Database connected");

            db.run_migrations().await?;
            tracing::info!("📦 Migrations completed");
            Some(db)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, event indexer disabled");
            None
        }
    };

    // 앱 상태 구성
    let state = AppState::new(protocol, db, config.clone());

    // 이벤트 인덱서
    if let Some(db) = &state.db {
        let events = state.protocol.events.clone();
        let rx = events.subscribe();
        let repo: Arc<dyn EventRepository> = db.clone();
        tokio::spawn(run_indexer(repo, events, Uuid::new_v4(), rx));
        tracing::info!("📇 Event indexer running");
    }

    // 라우터 구성
    let app = create_router(state);

    // 서버 시작
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🌐 Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// 라우터 + 미들웨어
fn create_router(state: AppState) -> Router {
    // CORS 설정
    // 프로덕션: ALLOWED_ORIGINS만 허용
    // 개발: localhost 허용
    let cors = if state.config.is_production() {
        let origins = parse_origins(state.config.allowed_origins.iter().map(String::as_str));
        if origins.is_empty() {
            tracing::warn!("ALLOWED_ORIGINS is empty, cross-origin requests will be rejected");
        }
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        CorsLayer::new()
            .allow_origin(parse_origins(DEV_ORIGINS.into_iter()))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn parse_origins<'a>(origins: impl Iterator<Item = &'a str>) -> Vec<HeaderValue> {
    origins
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}
