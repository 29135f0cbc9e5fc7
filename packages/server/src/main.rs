use std::sync::Arc;

use anyhow::{Context, Result};
use api::settings::Settings;
use api::AppState;
use axum::http::HeaderValue;
use clap::Parser;
use store::{ChurchStore, MemoryStore};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Parser)]
#[command(name = "flock-server", about = "Church administration API server", version)]
struct Cli {
    /// Keep all data in memory instead of PostgreSQL. Nothing survives a restart.
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::new().context("Failed to load settings")?;
    server::init_tracing();

    let store: Arc<dyn ChurchStore> = if cli.memory {
        tracing::warn!("Using the in-memory store; data will be lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(server::connect_store(&settings).await?)
    };

    let state = AppState::new(store, settings.session.ttl());
    let app = api::router(state).layer(cors(settings.server.origin.as_deref())?);

    let addr = settings.server.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    tracing::info!("Server stopped");
    Ok(())
}

/// Allow the configured frontend origin, or any origin when none is set.
fn cors(origin: Option<&str>) -> Result<CorsLayer> {
    let allow_origin = match origin {
        Some(origin) => AllowOrigin::exact(
            HeaderValue::from_str(origin).with_context(|| format!("Invalid origin {}", origin))?,
        ),
        None => AllowOrigin::any(),
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
