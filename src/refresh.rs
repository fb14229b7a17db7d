use crate::config;
use crate::db;
use crate::lists::VideoList;
use crate::model::ContentKind;
use crate::paging::{LoadDirection, MediatorResult, PagingState, RemoteMediator};
use crate::repository::Repository;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub lists: usize,
    pub videos: usize,
    pub details: usize,
    pub failures: usize,
}

/// Exponential backoff: 5s * 2^attempt, capped at `max_cap_secs` (no cap when 0).
pub fn backoff_secs(attempt: u32, max_cap_secs: u64) -> u64 {
    let secs = 5_u64 * (1_u64 << attempt.min(10));
    if max_cap_secs == 0 {
        secs
    } else {
        secs.min(max_cap_secs)
    }
}

/// Refresh the first page of every video list, then details and clips of
/// the refreshed videos. A list failure aborts the run; per-video failures
/// are counted and logged.
#[instrument(skip_all)]
pub async fn refresh_once(repo: &Repository, cancel: &CancellationToken) -> Result<RefreshReport> {
    let mut report = RefreshReport::default();
    for kind in ContentKind::ALL {
        let list = Arc::new(VideoList::new(repo.catalog(), kind));
        let mediator = RemoteMediator::new(repo.store().clone(), list);
        match mediator
            .load(LoadDirection::Refresh, &PagingState::empty(), cancel)
            .await
        {
            MediatorResult::Success { .. } => report.lists += 1,
            MediatorResult::Error(err) => return Err(anyhow!("refreshing {kind} list: {err}")),
        }

        let page_size = repo.paging_config().page_size as i64;
        let videos = db::list_videos(repo.store().pool(), kind, 0, page_size).await?;
        for video in videos {
            if cancel.is_cancelled() {
                return Err(anyhow!("refresh cancelled"));
            }
            report.videos += 1;
            let target = video.video_ref();
            match repo.details(target).await {
                Ok(_) => report.details += 1,
                Err(err) => {
                    report.failures += 1;
                    warn!(?err, %kind, id = video.id, "details refresh failed");
                }
            }
            if let Err(err) = repo.clips(target).await {
                report.failures += 1;
                warn!(?err, %kind, id = video.id, "clips refresh failed");
            }
        }
    }
    info!(?report, "refresh finished");
    Ok(report)
}

/// [`refresh_once`] retried with capped exponential backoff.
pub async fn refresh_with_retry(
    repo: &Repository,
    settings: &config::Refresh,
    cancel: &CancellationToken,
) -> Result<RefreshReport> {
    let mut attempt = 0;
    loop {
        match refresh_once(repo, cancel).await {
            Ok(report) => return Ok(report),
            Err(err) if attempt + 1 < settings.max_attempts && !cancel.is_cancelled() => {
                let secs = backoff_secs(attempt, settings.max_backoff_seconds);
                warn!(?err, attempt, secs, "refresh failed; backoff");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(err),
                    _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
