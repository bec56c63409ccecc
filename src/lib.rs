//! Feedback SDK: dynamic REST backend library for feedback collection.
//!
//! One catch-all HTTP surface maps collection names to registered resource
//! controllers and runs a generic, query-string-driven CRUD+filter protocol
//! over a pluggable document store.

pub mod auth;
pub mod config;
pub mod engine;
pub mod entities;
pub mod error;
pub mod query;
pub mod registry;
pub mod response;
pub mod router;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod stats;
pub mod store;

pub use config::AppConfig;
pub use engine::{Resource, ResourceHooks};
pub use error::{AppError, ConfigError};
pub use registry::Registry;
pub use routes::{api_routes, app, common_routes};
pub use state::AppState;
pub use store::{DocumentStore, LazyConnection, MemoryStore};
