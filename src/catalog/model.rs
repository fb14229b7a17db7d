//! Wire models for the remote catalog. Every field is optional; entries are
//! only rejected when they lack an identifier.

use crate::model::{Clip, ContentKind, Review, Video};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct PaginatedResponse<T> {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub total_results: Option<u64>,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub results: Option<Vec<Option<T>>>,
}

/// Decodes each entry on its own; an entry that does not match `T` becomes
/// `None` instead of failing the whole page.
fn lenient_entries<'de, D, T>(deserializer: D) -> Result<Option<Vec<Option<T>>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|entries| {
        entries
            .into_iter()
            .map(|entry| serde_json::from_value(entry).ok())
            .collect()
    }))
}

impl<T> PaginatedResponse<T> {
    /// Raw entry count, null entries included.
    pub fn raw_len(&self) -> usize {
        self.results.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.raw_len() == 0
    }

    pub fn into_results(self) -> impl Iterator<Item = T> {
        self.results.unwrap_or_default().into_iter().flatten()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RemoteVideo {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub original_title: Option<String>,
    pub original_name: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub popularity: Option<f64>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub release_date: Option<String>,
    pub first_air_date: Option<String>,
}

impl RemoteVideo {
    /// Movies carry `title`/`release_date`, shows `name`/`first_air_date`.
    pub fn into_video(self, kind: ContentKind) -> Option<Video> {
        let id = self.id?;
        let (title, release_date) = match kind {
            ContentKind::Movie => (self.title.or(self.original_title), self.release_date),
            ContentKind::Show => (self.name.or(self.original_name), self.first_air_date),
        };
        Some(Video {
            id,
            kind,
            title,
            overview: self.overview,
            poster_path: self.poster_path,
            backdrop_path: self.backdrop_path,
            popularity: self.popularity,
            vote_average: self.vote_average,
            vote_count: self.vote_count,
            release_date,
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct AuthorDetails {
    pub rating: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RemoteReview {
    pub id: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub created_at: Option<String>,
    pub url: Option<String>,
    pub author_details: Option<AuthorDetails>,
}

impl RemoteReview {
    pub fn into_review(self, kind: ContentKind, video_id: i64) -> Option<Review> {
        let id = self.id.filter(|id| !id.trim().is_empty())?;
        Some(Review {
            id,
            kind,
            video_id,
            author: self.author,
            content: self.content,
            rating: self.author_details.and_then(|d| d.rating),
            created_at: self.created_at,
            url: self.url,
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RemoteClips {
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_entries")]
    pub results: Option<Vec<Option<RemoteClip>>>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RemoteClip {
    pub id: Option<String>,
    pub key: Option<String>,
    pub name: Option<String>,
    pub site: Option<String>,
    #[serde(rename = "type")]
    pub clip_type: Option<String>,
}

impl RemoteClips {
    pub fn into_clips(self, kind: ContentKind, video_id: i64) -> Vec<Clip> {
        self.results
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(|c| {
                Some(Clip {
                    id: c.id?,
                    kind,
                    video_id,
                    key: c.key,
                    name: c.name,
                    site: c.site,
                    clip_type: c.clip_type,
                })
            })
            .collect()
    }
}
