//! Entry point for callers: paged lists, detail/clip lookups with a cached
//! fallback, and favorites.

use crate::catalog::CatalogService;
use crate::db::{self, Store};
use crate::lists::{ReviewList, VideoList};
use crate::model::{Clip, ContentKind, Favorite, Video, VideoRef};
use crate::paging::{Pager, PagingConfig};
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Where a non-paged lookup was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Remote,
    Cache,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub source: DataSource,
}

#[derive(Clone)]
pub struct Repository {
    store: Store,
    catalog: Arc<dyn CatalogService>,
    paging: PagingConfig,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("paging", &self.paging)
            .finish_non_exhaustive()
    }
}

impl Repository {
    pub fn new(store: Store, catalog: Arc<dyn CatalogService>, paging: PagingConfig) -> Self {
        Self {
            store,
            catalog,
            paging,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn catalog(&self) -> Arc<dyn CatalogService> {
        Arc::clone(&self.catalog)
    }

    pub fn paging_config(&self) -> &PagingConfig {
        &self.paging
    }

    pub fn videos(&self, kind: ContentKind) -> Pager<VideoList> {
        let list = Arc::new(VideoList::new(self.catalog(), kind));
        Pager::new(self.store.clone(), list, self.paging)
    }

    pub fn reviews(&self, video: VideoRef) -> Pager<ReviewList> {
        let list = Arc::new(ReviewList::new(self.catalog(), video));
        Pager::new(self.store.clone(), list, self.paging)
    }

    /// Fetch details and cache them; serve the cached copy when the catalog
    /// is unreachable.
    #[instrument(skip_all, fields(kind = %video.kind, id = video.id))]
    pub async fn details(&self, video: VideoRef) -> Result<Fetched<Video>> {
        let remote = self
            .catalog
            .fetch_details(video.kind, video.id)
            .await
            .and_then(|r| {
                r.into_video(video.kind)
                    .ok_or_else(|| anyhow!("catalog returned details without an id"))
            });
        match remote {
            Ok(details) => {
                db::upsert_video_details(self.store.pool(), &details).await?;
                Ok(Fetched {
                    value: details,
                    source: DataSource::Remote,
                })
            }
            Err(err) => match db::get_video_details(self.store.pool(), video.kind, video.id)
                .await?
            {
                Some(cached) => {
                    warn!(%err, cached_at = %cached.cached_at, "serving cached details");
                    Ok(Fetched {
                        value: cached.video,
                        source: DataSource::Cache,
                    })
                }
                None => Err(err.context(format!(
                    "no cached details for {} {}",
                    video.kind, video.id
                ))),
            },
        }
    }

    #[instrument(skip_all, fields(kind = %video.kind, id = video.id))]
    pub async fn clips(&self, video: VideoRef) -> Result<Fetched<Vec<Clip>>> {
        match self.catalog.fetch_clips(video.kind, video.id).await {
            Ok(remote) => {
                let clips = remote.into_clips(video.kind, video.id);
                db::replace_clips(self.store.pool(), video.kind, video.id, &clips).await?;
                Ok(Fetched {
                    value: clips,
                    source: DataSource::Remote,
                })
            }
            Err(err) => {
                let cached = db::list_clips(self.store.pool(), video.kind, video.id).await?;
                if cached.is_empty() {
                    return Err(err);
                }
                warn!(%err, count = cached.len(), "serving cached clips");
                Ok(Fetched {
                    value: cached,
                    source: DataSource::Cache,
                })
            }
        }
    }

    /// Cached list entry or detail record for `video`, without touching the
    /// catalog.
    pub async fn cached_video(&self, video: VideoRef) -> Result<Option<Video>> {
        if let Some(found) = db::get_video(self.store.pool(), video.kind, video.id).await? {
            return Ok(Some(found));
        }
        Ok(db::get_video_details(self.store.pool(), video.kind, video.id)
            .await?
            .map(|c| c.video))
    }

    pub async fn add_favorite(&self, video: &Video) -> Result<Favorite> {
        let favorite = Favorite::from_video(video, Utc::now());
        db::insert_favorite(self.store.pool(), &favorite).await?;
        info!(kind = %video.kind, id = video.id, "favorite added");
        Ok(favorite)
    }

    pub async fn remove_favorite(&self, video: VideoRef) -> Result<bool> {
        db::delete_favorite(self.store.pool(), video.kind, video.id).await
    }

    pub async fn is_favorite(&self, video: VideoRef) -> Result<bool> {
        db::is_favorite(self.store.pool(), video.kind, video.id).await
    }

    pub async fn favorites(&self, kind: ContentKind) -> Result<Vec<Favorite>> {
        db::list_favorites(self.store.pool(), kind).await
    }
}
