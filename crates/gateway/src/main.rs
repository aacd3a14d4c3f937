use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use mcpr_client::{CapabilityRegistry, ServerManager, SharedRegistry};
use mcpr_domain::config::{ListenConfig, RouterConfig};
use mcpr_gateway::api;
use mcpr_gateway::session::SessionMap;
use mcpr_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ──────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mcpr_gateway=debug")),
        )
        .json()
        .init();

    tracing::info!("mcp-router starting");

    // ── Config ───────────────────────────────────────────────────────
    let config_path = std::env::var("MCP_ROUTER_CONFIG")
        .unwrap_or_else(|_| "watson_mcprouter_config.json".into());
    let config = RouterConfig::load(std::path::Path::new(&config_path))
        .with_context(|| format!("loading {config_path}"))?;
    let servers = config.enabled_servers();
    tracing::info!(
        configured = config.server_count(),
        enabled = servers.len(),
        "configuration loaded"
    );

    // ── Registry + supervisor ────────────────────────────────────────
    let registry: SharedRegistry = Arc::new(parking_lot::RwLock::new(CapabilityRegistry::new()));
    let manager = ServerManager::new(registry.clone());
    manager.spawn_all(&servers).await;

    // ── App state ────────────────────────────────────────────────────
    let state = AppState {
        manager: manager.clone(),
        registry,
        sessions: Arc::new(SessionMap::new()),
        started_at: Instant::now(),
    };

    // ── Router ───────────────────────────────────────────────────────
    let app = api::router()
        .layer(CorsLayer::permissive())
        .with_state(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let listen = ListenConfig::from_env();
    let listener = tokio::net::TcpListener::bind(listen.addr())
        .await
        .with_context(|| format!("binding to {}", listen.addr()))?;

    tracing::info!(addr = %listen.addr(), "mcp-router listening on /mcp");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server error")?;

    // ── Shutdown ─────────────────────────────────────────────────────
    tracing::info!("shutting down children");
    manager.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("signal: SIGINT"),
            _ = sigterm.recv() => tracing::info!("signal: SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("signal: SIGINT");
    }
}
