//! Remote-to-local page mediation.
//!
//! A [`Pager`] presents one cached list as a stream of snapshots. When the
//! consumer scrolls near an edge of what is cached, the pager asks its
//! [`RemoteMediator`] to fetch the neighbouring remote page. The mediator
//! picks the page from the [`PagingKey`] recorded for the edge item and
//! writes items and keys in one transaction, so pagination resumes from the
//! same place after a restart.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub mod keys;
pub mod mediator;
pub mod pager;

pub use keys::{PagingKey, PagingKeyTracker};
pub use mediator::{FetchedPage, PagedList, RemoteMediator};
pub use pager::{LoadState, LoadStates, Pager, PagingData};

/// 1-based remote page number.
pub type Page = u32;

pub const DEFAULT_PAGE_INDEX: Page = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadDirection {
    Refresh,
    Prepend,
    Append,
}

#[derive(Debug, Error)]
pub enum PagingError {
    #[error("catalog fetch failed: {0:#}")]
    Fetch(anyhow::Error),
    #[error("local store write failed: {0:#}")]
    Persistence(anyhow::Error),
    #[error("load cancelled")]
    Cancelled,
}

/// Outcome of one mediator load cycle.
#[derive(Debug, Clone)]
pub enum MediatorResult {
    Success { end_of_pagination_reached: bool },
    Error(Arc<PagingError>),
}

impl MediatorResult {
    pub fn is_success(&self) -> bool {
        matches!(self, MediatorResult::Success { .. })
    }

    pub fn end_of_pagination_reached(&self) -> Option<bool> {
        match self {
            MediatorResult::Success {
                end_of_pagination_reached,
            } => Some(*end_of_pagination_reached),
            MediatorResult::Error(_) => None,
        }
    }
}

/// Pager tuning knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PagingConfig {
    /// Items per local page; remote pages are whatever the catalog returns.
    pub page_size: usize,
    /// How close to an edge of the window an accessed index must be to
    /// trigger a load in that direction.
    pub prefetch_distance: usize,
    /// Window size after a refresh.
    pub initial_load_size: usize,
    /// Refresh from remote on `initialize` even when cached rows exist.
    pub launch_initial_refresh: bool,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            prefetch_distance: 5,
            initial_load_size: 40,
            launch_initial_refresh: true,
        }
    }
}

/// Loaded pages plus the consumer's last accessed position, as seen by the
/// mediator when it decides what to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct PagingState<T> {
    pub pages: Vec<Vec<T>>,
    pub anchor_position: Option<usize>,
}

impl<T> PagingState<T> {
    pub fn empty() -> Self {
        Self {
            pages: Vec::new(),
            anchor_position: None,
        }
    }

    pub fn new(pages: Vec<Vec<T>>, anchor_position: Option<usize>) -> Self {
        Self {
            pages,
            anchor_position,
        }
    }

    pub fn item_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    /// Item at `position`, clamped into the loaded range.
    pub fn closest_item_to_position(&self, position: usize) -> Option<&T> {
        let count = self.item_count();
        if count == 0 {
            return None;
        }
        let target = position.min(count - 1);
        self.pages.iter().flatten().nth(target)
    }

    pub fn first_item(&self) -> Option<&T> {
        self.pages.iter().find(|p| !p.is_empty()).and_then(|p| p.first())
    }

    pub fn last_item(&self) -> Option<&T> {
        self.pages
            .iter()
            .rev()
            .find(|p| !p.is_empty())
            .and_then(|p| p.last())
    }
}
