//! Per-screen state for the detail view of a selected video.

use crate::lists::ReviewList;
use crate::model::{Clip, ListScope, Video, VideoRef};
use crate::paging::Pager;
use crate::repository::{Fetched, Repository};
use anyhow::Result;

/// Owned by the caller for as long as a detail screen lives. Repeated
/// selections of the same video neither refetch details nor rebuild the
/// reviews pager.
#[derive(Debug, Default)]
pub struct DetailSession {
    last_requested: Option<VideoRef>,
    reviews: Option<Pager<ReviewList>>,
}

impl DetailSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_requested(&self) -> Option<VideoRef> {
        self.last_requested
    }

    pub fn should_request(&self, video: VideoRef) -> bool {
        self.last_requested != Some(video)
    }

    /// Details for `video`, or `None` when it is the last successfully
    /// requested video.
    pub async fn details(
        &mut self,
        repo: &Repository,
        video: VideoRef,
    ) -> Result<Option<(Fetched<Video>, Fetched<Vec<Clip>>)>> {
        if !self.should_request(video) {
            return Ok(None);
        }
        let details = repo.details(video).await?;
        let clips = repo.clips(video).await?;
        self.last_requested = Some(video);
        Ok(Some((details, clips)))
    }

    /// Reviews pager for `video`. The previous pager is closed when the
    /// selection moves to another video.
    pub fn reviews(&mut self, repo: &Repository, video: VideoRef) -> Pager<ReviewList> {
        if let Some(pager) = &self.reviews {
            if pager.scope() == ListScope::reviews(video.kind, video.id) {
                return pager.clone();
            }
            pager.close();
        }
        let pager = repo.reviews(video);
        self.reviews = Some(pager.clone());
        pager
    }
}
