use super::Page;
use crate::db::{self, Pool};
use crate::model::ListScope;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, Transaction};

/// Previous/next remote page recorded for one cached item.
///
/// `prev_page` is `None` only for items fetched from the first page and
/// `next_page` is `None` only for items from the page that ended pagination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingKey {
    pub item_id: String,
    pub prev_page: Option<Page>,
    pub next_page: Option<Page>,
}

impl PagingKey {
    pub fn new(
        item_id: impl Into<String>,
        prev_page: Option<Page>,
        next_page: Option<Page>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            prev_page,
            next_page,
        }
    }
}

/// Durable item id -> [`PagingKey`] mapping. Every operation is scoped.
#[derive(Debug, Clone)]
pub struct PagingKeyTracker {
    pool: Pool,
}

impl PagingKeyTracker {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, scope: &ListScope, item_id: &str) -> Result<Option<PagingKey>> {
        db::get_paging_key(&self.pool, scope, item_id).await
    }

    pub async fn upsert_batch(&self, scope: &ListScope, keys: &[PagingKey]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_batch_tx(&mut tx, scope, keys).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn clear(&self, scope: &ListScope) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::clear_tx(&mut tx, scope).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_batch_tx(
        tx: &mut Transaction<'_, Sqlite>,
        scope: &ListScope,
        keys: &[PagingKey],
    ) -> Result<()> {
        db::upsert_paging_keys_tx(tx, scope, keys).await
    }

    pub async fn clear_tx(tx: &mut Transaction<'_, Sqlite>, scope: &ListScope) -> Result<()> {
        db::clear_paging_keys_tx(tx, scope).await
    }
}
