//! Process-scoped lazy store connection.
//!
//! The backing store is connected once, on first use, and memoized. The
//! `OnceCell` guarantees a single in-flight connect future even when many
//! cold-start requests race: later callers await the same initialization
//! instead of opening their own connections.

use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::AppError;
use crate::store::DocumentStore;

type ConnectFn =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn DocumentStore>, AppError>> + Send + Sync>;

pub struct LazyConnection {
    cell: OnceCell<Arc<dyn DocumentStore>>,
    connect: ConnectFn,
}

impl LazyConnection {
    pub fn new<F>(connect: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Arc<dyn DocumentStore>, AppError>>
            + Send
            + Sync
            + 'static,
    {
        LazyConnection {
            cell: OnceCell::new(),
            connect: Box::new(connect),
        }
    }

    /// Wrap an already-connected store; `get` resolves immediately.
    pub fn connected(store: Arc<dyn DocumentStore>) -> Self {
        let cell = OnceCell::new();
        cell.set(store).ok();
        LazyConnection {
            cell,
            connect: Box::new(|| {
                Box::pin(async { Err(AppError::Internal("connection already set".into())) })
            }),
        }
    }

    /// The shared connection, establishing it on first call.
    pub async fn get(&self) -> Result<&Arc<dyn DocumentStore>, AppError> {
        self.cell
            .get_or_try_init(|| async {
                tracing::debug!("establishing store connection");
                (self.connect)().await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn connects_once_under_concurrent_first_use() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let conn = Arc::new(LazyConnection::new(|| {
            Box::pin(async {
                CALLS.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>)
            })
        }));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let conn = conn.clone();
                tokio::spawn(async move { conn.get().await.is_ok() })
            })
            .collect();
        for t in tasks {
            assert!(t.await.unwrap());
        }
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}
