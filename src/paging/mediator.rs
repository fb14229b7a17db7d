use super::keys::{PagingKey, PagingKeyTracker};
use super::{LoadDirection, MediatorResult, Page, PagingError, PagingState, DEFAULT_PAGE_INDEX};
use crate::db::{Pool, Store};
use crate::model::ListScope;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Sqlite, Transaction};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Items decoded from one remote page.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage<T> {
    /// Number of raw entries the catalog returned, including entries that
    /// were dropped for lacking an identifier. Zero means pagination ended.
    pub raw_len: usize,
    pub items: Vec<T>,
}

/// One paged list: how to fetch a remote page and where its rows live.
#[async_trait]
pub trait PagedList: Send + Sync + 'static {
    type Item: Clone + PartialEq + Send + Sync + 'static;

    fn scope(&self) -> ListScope;

    /// Identifier the item's paging key is stored under.
    fn item_id(item: &Self::Item) -> String;

    async fn fetch_page(&self, page: Page) -> Result<FetchedPage<Self::Item>>;

    async fn clear_items(&self, tx: &mut Transaction<'_, Sqlite>) -> Result<()>;

    async fn insert_items(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        page: Page,
        items: &[Self::Item],
    ) -> Result<()>;

    async fn read_items(&self, pool: &Pool, offset: usize, limit: usize) -> Result<Vec<Self::Item>>;

    async fn count_items(&self, pool: &Pool) -> Result<usize>;
}

pub struct RemoteMediator<L: PagedList> {
    store: Store,
    list: Arc<L>,
    keys: PagingKeyTracker,
}

impl<L: PagedList> RemoteMediator<L> {
    pub fn new(store: Store, list: Arc<L>) -> Self {
        let keys = PagingKeyTracker::new(store.pool().clone());
        Self { store, list, keys }
    }

    pub fn list(&self) -> &Arc<L> {
        &self.list
    }

    /// Run one load cycle. Failures are reported, never retried here.
    #[instrument(skip_all, fields(scope = %self.list.scope(), ?direction))]
    pub async fn load(
        &self,
        direction: LoadDirection,
        state: &PagingState<L::Item>,
        cancel: &CancellationToken,
    ) -> MediatorResult {
        match self.try_load(direction, state, cancel).await {
            Ok(end_of_pagination_reached) => MediatorResult::Success {
                end_of_pagination_reached,
            },
            Err(err) => {
                warn!(%err, "load failed");
                MediatorResult::Error(Arc::new(err))
            }
        }
    }

    async fn try_load(
        &self,
        direction: LoadDirection,
        state: &PagingState<L::Item>,
        cancel: &CancellationToken,
    ) -> Result<bool, PagingError> {
        let Some(page) = self.target_page(direction, state).await? else {
            debug!("no further page in this direction");
            return Ok(true);
        };

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PagingError::Cancelled),
            res = self.list.fetch_page(page) => res.map_err(PagingError::Fetch)?,
        };

        let end_of_pagination_reached = fetched.raw_len == 0;
        let prev_page = (page != DEFAULT_PAGE_INDEX).then(|| page - 1);
        let next_page = (!end_of_pagination_reached).then(|| page + 1);
        let keys: Vec<PagingKey> = fetched
            .items
            .iter()
            .map(|item| PagingKey::new(L::item_id(item), prev_page, next_page))
            .collect();

        self.persist(direction, page, &keys, &fetched.items, cancel).await?;
        self.store.notify_changed();

        info!(
            page,
            items = fetched.items.len(),
            skipped = fetched.raw_len.saturating_sub(fetched.items.len()),
            end_of_pagination_reached,
            "page persisted"
        );
        Ok(end_of_pagination_reached)
    }

    /// `None` means there is nothing to load in `direction`.
    async fn target_page(
        &self,
        direction: LoadDirection,
        state: &PagingState<L::Item>,
    ) -> Result<Option<Page>, PagingError> {
        match direction {
            LoadDirection::Refresh => {
                let key = match state
                    .anchor_position
                    .and_then(|position| state.closest_item_to_position(position))
                {
                    Some(item) => self.key_for(item).await?,
                    None => None,
                };
                let page = key
                    .and_then(|k| k.next_page)
                    .map(|next| next.saturating_sub(1).max(DEFAULT_PAGE_INDEX))
                    .unwrap_or(DEFAULT_PAGE_INDEX);
                Ok(Some(page))
            }
            LoadDirection::Prepend => {
                let key = match state.first_item() {
                    Some(item) => self.key_for(item).await?,
                    None => None,
                };
                Ok(key.and_then(|k| k.prev_page))
            }
            LoadDirection::Append => {
                let key = match state.last_item() {
                    Some(item) => self.key_for(item).await?,
                    None => None,
                };
                Ok(key.and_then(|k| k.next_page))
            }
        }
    }

    async fn key_for(&self, item: &L::Item) -> Result<Option<PagingKey>, PagingError> {
        self.keys
            .get(&self.list.scope(), &L::item_id(item))
            .await
            .map_err(PagingError::Persistence)
    }

    async fn persist(
        &self,
        direction: LoadDirection,
        page: Page,
        keys: &[PagingKey],
        items: &[L::Item],
        cancel: &CancellationToken,
    ) -> Result<(), PagingError> {
        let scope = self.list.scope();
        let mut tx = self.store.begin().await.map_err(PagingError::Persistence)?;
        if direction == LoadDirection::Refresh {
            self.list
                .clear_items(&mut tx)
                .await
                .map_err(PagingError::Persistence)?;
            PagingKeyTracker::clear_tx(&mut tx, &scope)
                .await
                .map_err(PagingError::Persistence)?;
        }
        PagingKeyTracker::upsert_batch_tx(&mut tx, &scope, keys)
            .await
            .map_err(PagingError::Persistence)?;
        self.list
            .insert_items(&mut tx, page, items)
            .await
            .map_err(PagingError::Persistence)?;

        // Dropping the transaction rolls it back.
        if cancel.is_cancelled() {
            return Err(PagingError::Cancelled);
        }
        tx.commit()
            .await
            .map_err(|e| PagingError::Persistence(e.into()))?;
        Ok(())
    }
}
