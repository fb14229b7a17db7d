use super::mediator::{PagedList, RemoteMediator};
use super::{LoadDirection, MediatorResult, PagingConfig, PagingError, PagingState};
use crate::db::Store;
use crate::model::ListScope;
use futures::Stream;
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Load progress for one direction.
#[derive(Debug, Clone)]
pub enum LoadState {
    NotLoading { end_of_pagination_reached: bool },
    Loading,
    Error(Arc<PagingError>),
}

impl LoadState {
    pub const IDLE: LoadState = LoadState::NotLoading {
        end_of_pagination_reached: false,
    };

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LoadState::Error(_))
    }

    pub fn end_of_pagination_reached(&self) -> bool {
        matches!(
            self,
            LoadState::NotLoading {
                end_of_pagination_reached: true
            }
        )
    }
}

impl PartialEq for LoadState {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                LoadState::NotLoading {
                    end_of_pagination_reached: a,
                },
                LoadState::NotLoading {
                    end_of_pagination_reached: b,
                },
            ) => a == b,
            (LoadState::Loading, LoadState::Loading) => true,
            (LoadState::Error(a), LoadState::Error(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadStates {
    pub refresh: LoadState,
    pub prepend: LoadState,
    pub append: LoadState,
}

impl Default for LoadStates {
    fn default() -> Self {
        Self {
            refresh: LoadState::IDLE,
            prepend: LoadState::IDLE,
            append: LoadState::IDLE,
        }
    }
}

impl LoadStates {
    pub fn get(&self, direction: LoadDirection) -> &LoadState {
        match direction {
            LoadDirection::Refresh => &self.refresh,
            LoadDirection::Prepend => &self.prepend,
            LoadDirection::Append => &self.append,
        }
    }

    fn get_mut(&mut self, direction: LoadDirection) -> &mut LoadState {
        match direction {
            LoadDirection::Refresh => &mut self.refresh,
            LoadDirection::Prepend => &mut self.prepend,
            LoadDirection::Append => &mut self.append,
        }
    }
}

/// One emitted snapshot of a paged list.
#[derive(Debug, Clone, PartialEq)]
pub struct PagingData<T> {
    pub items: Vec<T>,
    /// Position of `items[0]` within the whole cached list.
    pub offset: usize,
    /// Number of rows cached for the list.
    pub total: usize,
    pub load_states: LoadStates,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    offset: usize,
    limit: usize,
    /// Absolute position of the last accessed item.
    anchor: Option<usize>,
}

impl Window {
    fn loaded(&self, total: usize) -> usize {
        self.limit.min(total.saturating_sub(self.offset))
    }
}

struct Shared<L: PagedList> {
    store: Store,
    mediator: RemoteMediator<L>,
    config: PagingConfig,
    window: Mutex<Window>,
    load_states: watch::Sender<LoadStates>,
    signal: watch::Sender<u64>,
    cancel: CancellationToken,
    /// Shared by Append/Prepend loads; replaced each time a refresh starts.
    edge_cancel: SyncMutex<CancellationToken>,
}

impl<L: PagedList> Shared<L> {
    fn bump(&self) {
        self.signal.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Token for a load in `direction`. A refresh cancels every edge load
    /// started before it, so no stale page lands on top of the new list.
    fn load_token(&self, direction: LoadDirection) -> CancellationToken {
        let mut edge = self
            .edge_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if direction == LoadDirection::Refresh {
            edge.cancel();
            *edge = self.cancel.child_token();
            self.cancel.clone()
        } else {
            edge.clone()
        }
    }
}

/// Puts a direction back into its previous state when a load future is
/// dropped before it records a result.
struct LoadGuard<'a> {
    states: &'a watch::Sender<LoadStates>,
    signal: &'a watch::Sender<u64>,
    direction: LoadDirection,
    previous: Option<LoadState>,
}

impl LoadGuard<'_> {
    fn disarm(&mut self) {
        self.previous = None;
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let direction = self.direction;
            debug!(?direction, "load dropped before completion");
            self.states.send_modify(|states| *states.get_mut(direction) = previous);
            self.signal.send_modify(|v| *v = v.wrapping_add(1));
        }
    }
}

/// Lazily materialized view over one cached list, refilled from the remote
/// catalog through a [`RemoteMediator`].
pub struct Pager<L: PagedList> {
    shared: Arc<Shared<L>>,
}

impl<L: PagedList> Clone for Pager<L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<L: PagedList> std::fmt::Debug for Pager<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pager")
            .field("scope", &self.scope())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl<L: PagedList> Pager<L> {
    pub fn new(store: Store, list: Arc<L>, config: PagingConfig) -> Self {
        Self::with_cancellation(store, list, config, CancellationToken::new())
    }

    /// Loads abandon their fetch or transaction once `cancel` fires.
    pub fn with_cancellation(
        store: Store,
        list: Arc<L>,
        config: PagingConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (load_states, _) = watch::channel(LoadStates::default());
        let (signal, _) = watch::channel(0);
        let edge_cancel = SyncMutex::new(cancel.child_token());
        let window = Window {
            offset: 0,
            limit: config.initial_load_size.max(config.page_size),
            anchor: None,
        };
        Self {
            shared: Arc::new(Shared {
                mediator: RemoteMediator::new(store.clone(), list),
                store,
                config,
                window: Mutex::new(window),
                load_states,
                signal,
                cancel,
                edge_cancel,
            }),
        }
    }

    pub fn scope(&self) -> ListScope {
        self.shared.mediator.list().scope()
    }

    pub fn config(&self) -> &PagingConfig {
        &self.shared.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Cancel in-flight loads and end every open stream.
    pub fn close(&self) {
        self.shared.cancel.cancel();
    }

    pub fn load_states(&self) -> watch::Receiver<LoadStates> {
        self.shared.load_states.subscribe()
    }

    /// Refresh from remote unless cached rows exist and initial refresh is
    /// disabled. Returns the refresh result when one ran.
    pub async fn initialize(&self) -> Result<Option<MediatorResult>, PagingError> {
        let total = self.count().await?;
        if total > 0 && !self.shared.config.launch_initial_refresh {
            debug!(scope = %self.scope(), total, "serving cached rows without refresh");
            return Ok(None);
        }
        Ok(self.load(LoadDirection::Refresh).await)
    }

    pub async fn refresh(&self) -> Option<MediatorResult> {
        self.load(LoadDirection::Refresh).await
    }

    /// Re-run every direction whose last load failed.
    pub async fn retry(&self) -> Vec<(LoadDirection, MediatorResult)> {
        let states = self.shared.load_states.borrow().clone();
        let mut results = Vec::new();
        for direction in [
            LoadDirection::Refresh,
            LoadDirection::Prepend,
            LoadDirection::Append,
        ] {
            if states.get(direction).is_error() {
                if let Some(result) = self.load(direction).await {
                    results.push((direction, result));
                }
            }
        }
        results
    }

    /// Run a mediator load in `direction`. Returns `None` when a load in the
    /// same direction is already in flight, or when an Append/Prepend is
    /// requested while a refresh runs.
    ///
    /// Dropping the returned future restores the direction's previous state.
    pub async fn load(&self, direction: LoadDirection) -> Option<MediatorResult> {
        let shared = &self.shared;
        let mut started = None;
        shared.load_states.send_if_modified(|states| {
            let blocked = states.get(direction).is_loading()
                || (direction != LoadDirection::Refresh && states.refresh.is_loading());
            if blocked {
                return false;
            }
            let previous = std::mem::replace(states.get_mut(direction), LoadState::Loading);
            started = Some((previous, shared.load_token(direction)));
            true
        });
        let Some((previous, cancel)) = started else {
            debug!(scope = %self.scope(), ?direction, "load already in flight; trigger ignored");
            return None;
        };
        let mut guard = LoadGuard {
            states: &shared.load_states,
            signal: &shared.signal,
            direction,
            previous: Some(previous),
        };
        shared.bump();

        let outcome = async {
            let before = self.count().await?;
            let state = self.paging_state().await?;
            let result = shared.mediator.load(direction, &state, &cancel).await;
            Ok::<_, PagingError>((before, result))
        }
        .await;

        let result = match outcome {
            Ok((before, result)) => {
                if result.is_success() {
                    if let Err(err) = self.apply_window(direction, before).await {
                        warn!(%err, "failed to resize window after load");
                    }
                }
                result
            }
            Err(err) => MediatorResult::Error(Arc::new(err)),
        };

        // An edge load cancelled by a refresh is not a failure of that edge.
        let cancelled = matches!(
            &result,
            MediatorResult::Error(err) if matches!(err.as_ref(), PagingError::Cancelled)
        );
        let superseded =
            cancelled && direction != LoadDirection::Refresh && !shared.cancel.is_cancelled();

        guard.disarm();
        shared.load_states.send_modify(|states| {
            match &result {
                MediatorResult::Success {
                    end_of_pagination_reached,
                } => {
                    *states.get_mut(direction) = LoadState::NotLoading {
                        end_of_pagination_reached: *end_of_pagination_reached,
                    };
                    if direction == LoadDirection::Refresh {
                        if !states.prepend.is_loading() {
                            states.prepend = LoadState::IDLE;
                        }
                        if !states.append.is_loading() {
                            states.append = LoadState::NotLoading {
                                end_of_pagination_reached: *end_of_pagination_reached,
                            };
                        }
                    }
                }
                MediatorResult::Error(_) if superseded => {
                    debug!(?direction, "edge load superseded by refresh");
                    *states.get_mut(direction) = LoadState::IDLE;
                }
                MediatorResult::Error(err) => {
                    *states.get_mut(direction) = LoadState::Error(Arc::clone(err));
                }
            }
        });
        shared.bump();
        Some(result)
    }

    /// Report that the consumer displayed `index` of the latest snapshot.
    ///
    /// Grows the window from cached rows when possible, otherwise triggers a
    /// remote load when `index` is within `prefetch_distance` of an edge.
    pub async fn access(&self, index: usize) -> Result<(), PagingError> {
        let config = self.shared.config;
        let total = self.count().await?;

        let (changed, near_end, near_start) = {
            let mut window = self.shared.window.lock().await;
            let loaded = window.loaded(total);
            let index = index.min(loaded.saturating_sub(1));
            window.anchor = Some(window.offset + index);

            let mut changed = false;
            let mut near_end = false;
            let mut near_start = false;

            if index + config.prefetch_distance >= loaded {
                if window.offset + loaded < total {
                    window.limit = (loaded + config.page_size).min(total - window.offset);
                    changed = true;
                } else {
                    near_end = true;
                }
            }
            if index < config.prefetch_distance {
                if window.offset > 0 {
                    let offset = window.offset.saturating_sub(config.page_size);
                    window.limit += window.offset - offset;
                    window.offset = offset;
                    changed = true;
                } else {
                    near_start = true;
                }
            }
            (changed, near_end, near_start)
        };

        if changed {
            self.shared.bump();
        }
        // Remote loads only extend a list that a refresh has populated.
        if total == 0 {
            return Ok(());
        }

        let states = self.shared.load_states.borrow().clone();
        if states.refresh.is_loading() {
            return Ok(());
        }
        if near_end && !states.append.end_of_pagination_reached() && !states.append.is_error() {
            self.load(LoadDirection::Append).await;
        }
        if near_start && !states.prepend.end_of_pagination_reached() && !states.prepend.is_error()
        {
            self.load(LoadDirection::Prepend).await;
        }
        Ok(())
    }

    /// Current window read from the local store.
    pub async fn snapshot(&self) -> Result<PagingData<L::Item>, PagingError> {
        let window = *self.shared.window.lock().await;
        let pool = self.shared.store.pool();
        let list = self.shared.mediator.list();
        let total = list
            .count_items(pool)
            .await
            .map_err(PagingError::Persistence)?;
        let items = list
            .read_items(pool, window.offset, window.loaded(total))
            .await
            .map_err(PagingError::Persistence)?;
        Ok(PagingData {
            items,
            offset: window.offset,
            total,
            load_states: self.shared.load_states.borrow().clone(),
        })
    }

    /// Restartable stream of snapshots. Each subscription starts by emitting
    /// the current window, then re-emits whenever the store, the window or a
    /// load state changes. Identical consecutive snapshots are skipped and
    /// the stream ends when the pager is closed.
    pub fn stream(&self) -> impl Stream<Item = PagingData<L::Item>> + Send + 'static {
        let pager = self.clone();
        let store_rx = self.shared.store.subscribe();
        let signal_rx = self.shared.signal.subscribe();
        let init = (pager, store_rx, signal_rx, None::<PagingData<L::Item>>, true);

        futures::stream::unfold(init, |state| async move {
            let (pager, mut store_rx, mut signal_rx, last, mut first) = state;
            loop {
                if !first {
                    tokio::select! {
                        res = store_rx.changed() => {
                            if res.is_err() {
                                return None;
                            }
                        }
                        res = signal_rx.changed() => {
                            if res.is_err() {
                                return None;
                            }
                        }
                        _ = pager.shared.cancel.cancelled() => return None,
                    }
                }
                first = false;
                if pager.shared.cancel.is_cancelled() {
                    return None;
                }
                match pager.snapshot().await {
                    Ok(data) if last.as_ref() != Some(&data) => {
                        let next = Some(data.clone());
                        return Some((data, (pager, store_rx, signal_rx, next, false)));
                    }
                    Ok(_) => continue,
                    Err(err) => {
                        warn!(%err, scope = %pager.scope(), "failed to read snapshot");
                        continue;
                    }
                }
            }
        })
    }

    async fn count(&self) -> Result<usize, PagingError> {
        self.shared
            .mediator
            .list()
            .count_items(self.shared.store.pool())
            .await
            .map_err(PagingError::Persistence)
    }

    /// Window contents split into local pages, with the anchor made relative
    /// to the window start.
    async fn paging_state(&self) -> Result<PagingState<L::Item>, PagingError> {
        let window = *self.shared.window.lock().await;
        let data = self.snapshot().await?;
        let page_size = self.shared.config.page_size.max(1);
        let pages = data.items.chunks(page_size).map(<[_]>::to_vec).collect();
        let anchor = window.anchor.map(|a| a.saturating_sub(window.offset));
        Ok(PagingState::new(pages, anchor))
    }

    async fn apply_window(
        &self,
        direction: LoadDirection,
        before: usize,
    ) -> Result<(), PagingError> {
        let after = self.count().await?;
        let mut window = self.shared.window.lock().await;
        match direction {
            LoadDirection::Refresh => {
                window.offset = 0;
                window.limit = self
                    .shared
                    .config
                    .initial_load_size
                    .max(self.shared.config.page_size);
            }
            LoadDirection::Append => {
                window.limit = window.limit.max(after.saturating_sub(window.offset));
            }
            LoadDirection::Prepend => {
                let added = after.saturating_sub(before);
                if window.offset == 0 {
                    window.limit += added;
                } else {
                    window.offset += added;
                }
            }
        }
        Ok(())
    }
}
