use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docsync::{api, config::ServerConfig, state::CollabState, store};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docsync=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting docsync...");

    let config = ServerConfig::from_env();

    let backend = match &config.seed_file {
        Some(path) => match store::MemoryBackend::from_seed_file(path) {
            Ok(backend) => backend,
            Err(e) => {
                tracing::error!(path = %path.display(), "Failed to load seed file: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("DOCSYNC_SEED_FILE not set, starting with no users or documents");
            store::MemoryBackend::new()
        }
    };

    let addr = config.bind_addr;
    let state = CollabState::new(
        store::Collaborators::from_backend(Arc::new(backend)),
        config,
    );
    let app = api::router(state);

    tracing::info!("Listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
