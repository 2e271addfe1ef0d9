//! wasp-server：HTTP 服务入口
//!
//! 加载配置 → 装配存储/预言机/上报/调度能力 → 起 axum 服务。
//! /track 需要来访方真实地址，因此用带 ConnectInfo 的 make_service。

use std::net::SocketAddr;
use std::sync::Arc;

use wasp::api::{create_router, ApiState};
use wasp::config::load_config;
use wasp::core::{create_oracle_from_config, TokioScheduler, TurnOrchestrator};
use wasp::report::{HttpReporter, NoopReporter, Reporter};
use wasp::session::{MemorySessionStore, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wasp::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });

    let store: Arc<dyn SessionStore> = MemorySessionStore::shared();
    let oracle = create_oracle_from_config(&cfg);
    let scheduler = Arc::new(TokioScheduler::new());

    let reporter: Arc<dyn Reporter> = match cfg.report.endpoint.clone() {
        Some(endpoint) => {
            tracing::info!("Reporting final results to {}", endpoint);
            Arc::new(HttpReporter::new(
                store.clone(),
                endpoint,
                cfg.report.api_key.clone(),
            ))
        }
        None => Arc::new(NoopReporter),
    };

    let orchestrator = Arc::new(TurnOrchestrator::new(
        store.clone(),
        oracle,
        reporter.clone(),
        scheduler.clone(),
        cfg.agent.max_history_turns,
    ));

    let state = Arc::new(ApiState {
        orchestrator,
        store,
        reporter,
        scheduler: scheduler.clone(),
        api_key: cfg.server.api_key.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    tracing::info!("wasp-server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        create_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    scheduler.shutdown();
    Ok(())
}
