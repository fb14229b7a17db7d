//! Concrete paged lists: popular videos per kind, and reviews per video.

use crate::catalog::CatalogService;
use crate::db::{self, Pool};
use crate::model::{ContentKind, ListScope, Review, Video, VideoRef};
use crate::paging::{FetchedPage, Page, PagedList};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Sqlite, Transaction};
use std::sync::Arc;

pub struct VideoList {
    catalog: Arc<dyn CatalogService>,
    kind: ContentKind,
}

impl VideoList {
    pub fn new(catalog: Arc<dyn CatalogService>, kind: ContentKind) -> Self {
        Self { catalog, kind }
    }
}

#[async_trait]
impl PagedList for VideoList {
    type Item = Video;

    fn scope(&self) -> ListScope {
        ListScope::videos(self.kind)
    }

    fn item_id(item: &Video) -> String {
        item.id.to_string()
    }

    async fn fetch_page(&self, page: Page) -> Result<FetchedPage<Video>> {
        let response = self.catalog.fetch_videos(self.kind, page).await?;
        let raw_len = response.raw_len();
        let items = response
            .into_results()
            .filter_map(|v| v.into_video(self.kind))
            .collect();
        Ok(FetchedPage { raw_len, items })
    }

    async fn clear_items(&self, tx: &mut Transaction<'_, Sqlite>) -> Result<()> {
        db::clear_videos_tx(tx, self.kind).await
    }

    async fn insert_items(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        page: Page,
        items: &[Video],
    ) -> Result<()> {
        db::insert_videos_tx(tx, self.kind, page, items).await
    }

    async fn read_items(&self, pool: &Pool, offset: usize, limit: usize) -> Result<Vec<Video>> {
        db::list_videos(pool, self.kind, offset as i64, limit as i64).await
    }

    async fn count_items(&self, pool: &Pool) -> Result<usize> {
        Ok(db::count_videos(pool, self.kind).await? as usize)
    }
}

/// Reviews of one video. Reads, deletes and keys are scoped by the video.
pub struct ReviewList {
    catalog: Arc<dyn CatalogService>,
    video: VideoRef,
}

impl ReviewList {
    pub fn new(catalog: Arc<dyn CatalogService>, video: VideoRef) -> Self {
        Self { catalog, video }
    }

    pub fn video(&self) -> VideoRef {
        self.video
    }
}

#[async_trait]
impl PagedList for ReviewList {
    type Item = Review;

    fn scope(&self) -> ListScope {
        ListScope::reviews(self.video.kind, self.video.id)
    }

    fn item_id(item: &Review) -> String {
        item.id.clone()
    }

    async fn fetch_page(&self, page: Page) -> Result<FetchedPage<Review>> {
        let VideoRef { kind, id } = self.video;
        let response = self.catalog.fetch_reviews(kind, id, page).await?;
        let raw_len = response.raw_len();
        let items = response
            .into_results()
            .filter_map(|r| r.into_review(kind, id))
            .collect();
        Ok(FetchedPage { raw_len, items })
    }

    async fn clear_items(&self, tx: &mut Transaction<'_, Sqlite>) -> Result<()> {
        db::clear_reviews_tx(tx, self.video.kind, self.video.id).await
    }

    async fn insert_items(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        page: Page,
        items: &[Review],
    ) -> Result<()> {
        db::insert_reviews_tx(tx, self.video.kind, self.video.id, page, items).await
    }

    async fn read_items(&self, pool: &Pool, offset: usize, limit: usize) -> Result<Vec<Review>> {
        db::list_reviews(
            pool,
            self.video.kind,
            self.video.id,
            offset as i64,
            limit as i64,
        )
        .await
    }

    async fn count_items(&self, pool: &Pool) -> Result<usize> {
        Ok(db::count_reviews(pool, self.video.kind, self.video.id).await? as usize)
    }
}
