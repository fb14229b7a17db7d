use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a catalog entry is a movie or a TV show.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Movie,
    Show,
}

impl ContentKind {
    pub const ALL: [ContentKind; 2] = [ContentKind::Movie, ContentKind::Show];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Movie => "movie",
            ContentKind::Show => "show",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(ContentKind::Movie),
            "show" => Some(ContentKind::Show),
            _ => None,
        }
    }

    /// Path segment used by the remote catalog for this kind.
    pub fn catalog_path(&self) -> &'static str {
        match self {
            ContentKind::Movie => "movie",
            ContentKind::Show => "tv",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which family of paged list a scope refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ListKind {
    Videos,
    Reviews,
}

/// Identifies one paged list. Review lists are always scoped by their parent
/// video so that lists for different videos never share rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListScope {
    pub list: ListKind,
    pub kind: ContentKind,
    pub parent_id: Option<i64>,
}

impl ListScope {
    pub fn videos(kind: ContentKind) -> Self {
        Self {
            list: ListKind::Videos,
            kind,
            parent_id: None,
        }
    }

    pub fn reviews(kind: ContentKind, video_id: i64) -> Self {
        Self {
            list: ListKind::Reviews,
            kind,
            parent_id: Some(video_id),
        }
    }

    /// Stable storage key, e.g. `videos:movie` or `reviews:show:1399`.
    pub fn storage_key(&self) -> String {
        match (self.list, self.parent_id) {
            (ListKind::Videos, _) => format!("videos:{}", self.kind),
            (ListKind::Reviews, Some(parent)) => format!("reviews:{}:{}", self.kind, parent),
            (ListKind::Reviews, None) => format!("reviews:{}", self.kind),
        }
    }
}

impl fmt::Display for ListScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: i64,
    pub kind: ContentKind,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub popularity: Option<f64>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub release_date: Option<String>,
}

impl Video {
    pub fn video_ref(&self) -> VideoRef {
        VideoRef {
            kind: self.kind,
            id: self.id,
        }
    }
}

/// Minimal handle naming a single catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoRef {
    pub kind: ContentKind,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub kind: ContentKind,
    pub video_id: i64,
    pub author: Option<String>,
    pub content: Option<String>,
    pub rating: Option<f64>,
    pub created_at: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    pub kind: ContentKind,
    pub video_id: i64,
    pub key: Option<String>,
    pub name: Option<String>,
    pub site: Option<String>,
    pub clip_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub kind: ContentKind,
    pub id: i64,
    pub title: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub popularity: Option<f64>,
    pub added_at: DateTime<Utc>,
}

impl Favorite {
    pub fn from_video(video: &Video, added_at: DateTime<Utc>) -> Self {
        Self {
            kind: video.kind,
            id: video.id,
            title: video.title.clone(),
            poster_path: video.poster_path.clone(),
            backdrop_path: video.backdrop_path.clone(),
            popularity: video.popularity,
            added_at,
        }
    }
}
