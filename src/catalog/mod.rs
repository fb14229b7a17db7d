use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::ContentKind;
use crate::paging::Page;

pub mod model;

pub use model::{PaginatedResponse, RemoteClip, RemoteClips, RemoteReview, RemoteVideo};

const CATALOG_API_BASE: &str = "https://api.themoviedb.org/3/";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("rate limited by catalog: {0}")]
    RateLimited(String),
    #[error("catalog error {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid catalog response JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Remote catalog operations consumed by lists and repositories.
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn fetch_videos(&self, kind: ContentKind, page: Page)
        -> Result<PaginatedResponse<RemoteVideo>>;

    async fn fetch_reviews(
        &self,
        kind: ContentKind,
        video_id: i64,
        page: Page,
    ) -> Result<PaginatedResponse<RemoteReview>>;

    async fn fetch_details(&self, kind: ContentKind, id: i64) -> Result<RemoteVideo>;

    async fn fetch_clips(&self, kind: ContentKind, id: i64) -> Result<RemoteClips>;
}

/// HTTP client for a TMDB-compatible catalog. Every request carries the
/// `api_key` and `language` query parameters.
#[derive(Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: Url,
    api_key: String,
    language: String,
}

impl fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogClient")
            .field("base_url", &self.base_url)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    pub fn new(api_key: String, language: String) -> Result<Self> {
        let base_url = Url::parse(CATALOG_API_BASE).context("invalid default catalog URL")?;
        Self::with_base_url(api_key, language, base_url)
    }

    pub fn with_base_url(api_key: String, language: String, mut base_url: Url) -> Result<Self> {
        // `Url::join` drops the last path segment unless it ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .user_agent(concat!("movie-pager/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
            language,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.catalog.base_url).context("invalid catalog.base_url")?;
        Self::with_base_url(
            cfg.catalog.api_key.clone(),
            cfg.catalog.language.clone(),
            base_url,
        )
    }

    pub fn build_request(&self, path: &str, page: Option<Page>) -> Result<reqwest::Request> {
        let mut endpoint = self
            .base_url
            .join(path)
            .with_context(|| format!("invalid catalog path {path}"))?;
        {
            let mut query = endpoint.query_pairs_mut();
            query.append_pair("api_key", &self.api_key);
            query.append_pair("language", &self.language);
            if let Some(page) = page {
                query.append_pair("page", &page.to_string());
            }
        }
        self.http
            .get(endpoint)
            .header("Accept", "application/json")
            .build()
            .context("failed to build catalog request")
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, page: Option<Page>) -> Result<T> {
        let request = self.build_request(path, page)?;
        debug!(path, ?page, "catalog request");

        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach catalog")?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!(path, "rate limited by catalog");
            return Err(CatalogError::RateLimited(body).into());
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(path, %status, "catalog error");
            return Err(CatalogError::Status { status, body }.into());
        }

        let body = res.text().await.context("failed to read catalog response")?;
        let payload = serde_json::from_str(&body).map_err(CatalogError::from)?;
        Ok(payload)
    }
}

#[async_trait]
impl CatalogService for CatalogClient {
    async fn fetch_videos(
        &self,
        kind: ContentKind,
        page: Page,
    ) -> Result<PaginatedResponse<RemoteVideo>> {
        self.get_json(&format!("{}/popular", kind.catalog_path()), Some(page))
            .await
    }

    async fn fetch_reviews(
        &self,
        kind: ContentKind,
        video_id: i64,
        page: Page,
    ) -> Result<PaginatedResponse<RemoteReview>> {
        self.get_json(
            &format!("{}/{}/reviews", kind.catalog_path(), video_id),
            Some(page),
        )
        .await
    }

    async fn fetch_details(&self, kind: ContentKind, id: i64) -> Result<RemoteVideo> {
        self.get_json(&format!("{}/{}", kind.catalog_path(), id), None)
            .await
    }

    async fn fetch_clips(&self, kind: ContentKind, id: i64) -> Result<RemoteClips> {
        self.get_json(&format!("{}/{}/videos", kind.catalog_path(), id), None)
            .await
    }
}
