//! Router assembly: the dynamic `/api` surface plus common service routes.

use axum::routing::{any, get};
use axum::{Json, Router};
use serde::Serialize;

use crate::router::dispatch;
use crate::state::AppState;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Common routes (no state): GET /health, GET /version.
pub fn common_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
}

/// The whole dynamic API: every `/api/...` path flows through the
/// dispatcher, which resolves the collection and operation itself.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/api", any(dispatch))
        .route("/api/", any(dispatch))
        .route("/api/*path", any(dispatch))
        .with_state(state)
}

/// Full application router.
pub fn app(state: AppState) -> Router {
    Router::new().merge(common_routes()).merge(api_routes(state))
}
