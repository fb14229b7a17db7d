#![allow(dead_code)]

use anyhow::{anyhow, Result};
use movie_pager::catalog::{
    CatalogService, PaginatedResponse, RemoteClip, RemoteClips, RemoteReview, RemoteVideo,
};
use movie_pager::db::{self, Store};
use movie_pager::model::ContentKind;
use movie_pager::paging::{Page, PagingConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

pub async fn setup_store() -> Store {
    Store::new(db::init_memory_pool().await.unwrap())
}

pub fn config() -> PagingConfig {
    PagingConfig {
        page_size: 20,
        prefetch_distance: 5,
        initial_load_size: 20,
        launch_initial_refresh: true,
    }
}

pub fn remote_video(id: i64) -> RemoteVideo {
    RemoteVideo {
        id: Some(id),
        title: Some(format!("Movie {id}")),
        name: Some(format!("Show {id}")),
        poster_path: Some(format!("/poster/{id}.jpg")),
        popularity: Some(1000.0 - id as f64),
        vote_average: Some(7.0),
        vote_count: Some(10),
        release_date: Some("2024-01-01".into()),
        ..Default::default()
    }
}

pub fn remote_review(id: &str) -> RemoteReview {
    RemoteReview {
        id: Some(id.to_string()),
        author: Some("critic".into()),
        content: Some(format!("review {id}")),
        ..Default::default()
    }
}

/// Ids `first..first + count`.
pub fn video_page(first: i64, count: i64) -> Vec<Option<RemoteVideo>> {
    (first..first + count).map(|id| Some(remote_video(id))).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Videos(ContentKind, Page),
    Reviews(ContentKind, i64, Page),
    Details(ContentKind, i64),
    Clips(ContentKind, i64),
}

/// Scripted catalog that records every call. Unscripted pages are empty.
#[derive(Clone, Default)]
pub struct RecordingCatalog {
    videos: Arc<Mutex<HashMap<(ContentKind, Page), Vec<Option<RemoteVideo>>>>>,
    reviews: Arc<Mutex<HashMap<(ContentKind, i64, Page), Vec<Option<RemoteReview>>>>>,
    details: Arc<Mutex<HashMap<(ContentKind, i64), RemoteVideo>>>,
    clips: Arc<Mutex<HashMap<(ContentKind, i64), Vec<RemoteClip>>>>,
    calls: Arc<Mutex<Vec<Call>>>,
    failures_left: Arc<AtomicUsize>,
    offline: Arc<AtomicBool>,
    gated: Arc<AtomicBool>,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl RecordingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_videos(
        &self,
        kind: ContentKind,
        page: Page,
        results: Vec<Option<RemoteVideo>>,
    ) {
        self.videos.lock().await.insert((kind, page), results);
    }

    pub async fn set_reviews(
        &self,
        kind: ContentKind,
        video_id: i64,
        page: Page,
        results: Vec<Option<RemoteReview>>,
    ) {
        self.reviews.lock().await.insert((kind, video_id, page), results);
    }

    pub async fn set_details(&self, kind: ContentKind, video: RemoteVideo) {
        let id = video.id.unwrap();
        self.details.lock().await.insert((kind, id), video);
    }

    pub async fn set_clips(&self, kind: ContentKind, id: i64, clips: Vec<RemoteClip>) {
        self.clips.lock().await.insert((kind, id), clips);
    }

    /// Fail the next `n` calls of any kind.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// While gated, every call signals `entered` and waits for `release`.
    pub fn set_gated(&self, gated: bool) {
        self.gated.store(gated, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn video_pages_requested(&self, kind: ContentKind) -> Vec<Page> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                Call::Videos(k, page) if k == kind => Some(page),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, call: Call) -> Result<()> {
        self.calls.lock().await.push(call);
        if self.gated.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(anyhow!("network unreachable"));
        }
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(anyhow!("catalog error 500: boom"));
        }
        Ok(())
    }
}

fn page_of<T>(page: Page, results: Option<Vec<Option<T>>>) -> PaginatedResponse<T> {
    PaginatedResponse {
        page: Some(page),
        total_pages: None,
        total_results: None,
        results,
    }
}

#[async_trait::async_trait]
impl CatalogService for RecordingCatalog {
    async fn fetch_videos(
        &self,
        kind: ContentKind,
        page: Page,
    ) -> Result<PaginatedResponse<RemoteVideo>> {
        self.record(Call::Videos(kind, page)).await?;
        let results = self.videos.lock().await.get(&(kind, page)).cloned();
        Ok(page_of(page, results))
    }

    async fn fetch_reviews(
        &self,
        kind: ContentKind,
        video_id: i64,
        page: Page,
    ) -> Result<PaginatedResponse<RemoteReview>> {
        self.record(Call::Reviews(kind, video_id, page)).await?;
        let results = self.reviews.lock().await.get(&(kind, video_id, page)).cloned();
        Ok(page_of(page, results))
    }

    async fn fetch_details(&self, kind: ContentKind, id: i64) -> Result<RemoteVideo> {
        self.record(Call::Details(kind, id)).await?;
        self.details
            .lock()
            .await
            .get(&(kind, id))
            .cloned()
            .ok_or_else(|| anyhow!("catalog error 404: {kind} {id} not found"))
    }

    async fn fetch_clips(&self, kind: ContentKind, id: i64) -> Result<RemoteClips> {
        self.record(Call::Clips(kind, id)).await?;
        let results = self
            .clips
            .lock()
            .await
            .get(&(kind, id))
            .cloned()
            .unwrap_or_default();
        Ok(RemoteClips {
            id: Some(id),
            results: Some(results.into_iter().map(Some).collect()),
        })
    }
}

pub fn video_pager(
    store: &movie_pager::db::Store,
    catalog: &RecordingCatalog,
    kind: ContentKind,
    config: PagingConfig,
) -> movie_pager::paging::Pager<movie_pager::lists::VideoList> {
    let list = movie_pager::lists::VideoList::new(Arc::new(catalog.clone()), kind);
    movie_pager::paging::Pager::new(store.clone(), Arc::new(list), config)
}

pub fn ids(videos: &[movie_pager::model::Video]) -> Vec<i64> {
    videos.iter().map(|v| v.id).collect()
}
