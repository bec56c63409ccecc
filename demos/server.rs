//! Demo server: reads config from env, wires the built-in entities over the
//! in-memory store, and serves the dynamic API. Swap `MemoryStore` for a
//! real document-store backend by implementing `DocumentStore`.

use feedback_sdk::{app, AppConfig, AppState, DocumentStore, LazyConnection, MemoryStore, Registry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("feedback_sdk=info".parse()?))
        .init();

    let config = AppConfig::from_env()?;

    let state = AppState {
        db: Arc::new(LazyConnection::new(|| {
            Box::pin(async {
                let store = MemoryStore::new()
                    .with_unique("user", &["email", "user_id"])
                    .with_unique("role", &["name"]);
                Ok(Arc::new(store) as Arc<dyn DocumentStore>)
            })
        })),
        registry: Arc::new(Registry::with_defaults()),
        config: Arc::new(config),
    };

    let router = app(state).layer(CorsLayer::permissive());

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
