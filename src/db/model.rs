//! Database view models used by repositories.

use crate::model::Video;
use chrono::{DateTime, Utc};

/// A cached detail record together with the time it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedDetails {
    pub video: Video,
    pub cached_at: DateTime<Utc>,
}
