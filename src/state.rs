//! Shared application state for all routes.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::registry::Registry;
use crate::store::LazyConnection;

#[derive(Clone)]
pub struct AppState {
    /// Lazily connected, process-shared store handle.
    pub db: Arc<LazyConnection>,
    pub registry: Arc<Registry>,
    pub config: Arc<AppConfig>,
}
