use super::repo::Pool;
use anyhow::Result;
use sqlx::{Sqlite, Transaction};
use std::sync::Arc;
use tokio::sync::watch;

/// Shared handle to the local store.
///
/// Every committed write to a paged list must call [`Store::notify_changed`]
/// so that open pagers re-read their window.
#[derive(Debug, Clone)]
pub struct Store {
    pool: Pool,
    changes: Arc<watch::Sender<u64>>,
}

impl Store {
    pub fn new(pool: Pool) -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            pool,
            changes: Arc::new(tx),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Receiver that observes a new generation after each list write.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn generation(&self) -> u64 {
        *self.changes.borrow()
    }

    pub fn notify_changed(&self) {
        self.changes.send_modify(|generation| *generation = generation.wrapping_add(1));
    }
}
