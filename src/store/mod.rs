//! The storage seam: an external document store reached through a narrow
//! async trait. The core never executes queries itself; it hands a filter
//! document plus find options to whatever backend is connected.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::query::SortSpec;

pub mod connection;
pub mod memory;

pub use connection::LazyConnection;
pub use memory::MemoryStore;

/// Options for a find: sort order, window, projection, relation population.
#[derive(Clone, Debug, Default)]
pub struct FindOptions {
    pub sort: Option<SortSpec>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    /// Field names to project; the primary id is always kept.
    pub select: Option<Vec<String>>,
    /// Reference fields to replace with the referenced document.
    pub populate: Option<Vec<String>>,
}

/// Collection-oriented document storage. Filters are JSON documents in the
/// operator grammar produced by [`crate::query::translate`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        options: &FindOptions,
    ) -> Result<Vec<Value>, AppError>;

    async fn find_one(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        options: &FindOptions,
    ) -> Result<Option<Value>, AppError>;

    async fn count(&self, collection: &str, filter: &Map<String, Value>)
        -> Result<u64, AppError>;

    /// Insert a document, assigning a primary id when absent. Returns the
    /// stored document.
    async fn insert_one(
        &self,
        collection: &str,
        document: Map<String, Value>,
    ) -> Result<Value, AppError>;

    /// Partial-merge update of the first document matching `filter`: only
    /// supplied fields change. Returns the updated document, or `None` when
    /// nothing matched.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
        changes: &Map<String, Value>,
    ) -> Result<Option<Value>, AppError>;

    /// Delete the first document matching `filter`. Returns the deleted
    /// snapshot, or `None` when nothing matched.
    async fn delete_one(
        &self,
        collection: &str,
        filter: &Map<String, Value>,
    ) -> Result<Option<Value>, AppError>;
}
