use std::env;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use renova_knowledge::core::config::AppPaths;
use renova_knowledge::core::logging;
use renova_knowledge::server;
use renova_knowledge::sources::{InMemoryMediaRegistry, InMemorySourceRegistry};
use renova_knowledge::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = AppPaths::new();
    logging::init(&paths);

    // Upstream record stores register through the SourceRegistry trait; the
    // standalone binary starts with empty in-memory registries.
    let sources = Arc::new(InMemorySourceRegistry::new());
    let media = Arc::new(InMemoryMediaRegistry::new());

    let state = AppState::initialize(paths, sources, media)
        .await
        .context("Failed to initialize knowledge engine")?;

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(0);
    let bind_addr = format!("127.0.0.1:{}", port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    println!("RENOVA_KNOWLEDGE_PORT={}", addr.port());
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
