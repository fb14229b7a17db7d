use super::model::CachedDetails;
use crate::model::{Clip, ContentKind, Favorite, ListScope, Review, Video};
use crate::paging::{Page, PagingKey};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Transaction};
use sqlx::{Sqlite, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

const VIDEO_COLUMNS: &str = "kind, id, title, overview, poster_path, backdrop_path, \
     popularity, vote_average, vote_count, release_date";
const REVIEW_COLUMNS: &str = "kind, video_id, id, author, content, rating, created_at, url";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Single-connection in-memory pool with migrations applied. Each SQLite
/// memory connection is its own database, so the pool must never open a second.
pub async fn init_memory_pool() -> Result<Pool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // Rebuild URL, prefer sqlite:// form and create the file on first use.
    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    match query_part {
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn parse_kind(row: &SqliteRow) -> Result<ContentKind> {
    let kind: String = row.try_get("kind")?;
    ContentKind::parse_kind(&kind).ok_or_else(|| anyhow!("unknown content kind {}", kind))
}

fn video_from_row(row: &SqliteRow) -> Result<Video> {
    Ok(Video {
        id: row.try_get("id")?,
        kind: parse_kind(row)?,
        title: row.try_get("title")?,
        overview: row.try_get("overview")?,
        poster_path: row.try_get("poster_path")?,
        backdrop_path: row.try_get("backdrop_path")?,
        popularity: row.try_get("popularity")?,
        vote_average: row.try_get("vote_average")?,
        vote_count: row.try_get("vote_count")?,
        release_date: row.try_get("release_date")?,
    })
}

fn review_from_row(row: &SqliteRow) -> Result<Review> {
    Ok(Review {
        id: row.try_get("id")?,
        kind: parse_kind(row)?,
        video_id: row.try_get("video_id")?,
        author: row.try_get("author")?,
        content: row.try_get("content")?,
        rating: row.try_get("rating")?,
        created_at: row.try_get("created_at")?,
        url: row.try_get("url")?,
    })
}

fn page_from_column(value: Option<i64>) -> Option<Page> {
    value.and_then(|p| Page::try_from(p).ok())
}

// ---------------------------------------------------------------------------
// Video lists

#[instrument(skip_all)]
pub async fn insert_videos_tx(
    tx: &mut Transaction<'_, Sqlite>,
    kind: ContentKind,
    page: Page,
    videos: &[Video],
) -> Result<()> {
    for (position, video) in videos.iter().enumerate() {
        sqlx::query(
            "INSERT OR REPLACE INTO videos (kind, id, title, overview, poster_path, backdrop_path, \
             popularity, vote_average, vote_count, release_date, page, position) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(kind.as_str())
        .bind(video.id)
        .bind(video.title.as_deref())
        .bind(video.overview.as_deref())
        .bind(video.poster_path.as_deref())
        .bind(video.backdrop_path.as_deref())
        .bind(video.popularity)
        .bind(video.vote_average)
        .bind(video.vote_count)
        .bind(video.release_date.as_deref())
        .bind(i64::from(page))
        .bind(position as i64)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn clear_videos_tx(tx: &mut Transaction<'_, Sqlite>, kind: ContentKind) -> Result<()> {
    sqlx::query("DELETE FROM videos WHERE kind = ?")
        .bind(kind.as_str())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_videos(
    pool: &Pool,
    kind: ContentKind,
    offset: i64,
    limit: i64,
) -> Result<Vec<Video>> {
    let sql = format!(
        "SELECT {VIDEO_COLUMNS} FROM videos WHERE kind = ? \
         ORDER BY page ASC, position ASC LIMIT ? OFFSET ?"
    );
    let rows = sqlx::query(&sql)
        .bind(kind.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    rows.iter().map(video_from_row).collect()
}

#[instrument(skip_all)]
pub async fn count_videos(pool: &Pool, kind: ContentKind) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM videos WHERE kind = ?")
        .bind(kind.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[instrument(skip_all)]
pub async fn get_video(pool: &Pool, kind: ContentKind, id: i64) -> Result<Option<Video>> {
    let sql = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE kind = ? AND id = ?");
    let row = sqlx::query(&sql)
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(video_from_row).transpose()
}

// ---------------------------------------------------------------------------
// Review lists (always scoped by parent video)

#[instrument(skip_all)]
pub async fn insert_reviews_tx(
    tx: &mut Transaction<'_, Sqlite>,
    kind: ContentKind,
    video_id: i64,
    page: Page,
    reviews: &[Review],
) -> Result<()> {
    for (position, review) in reviews.iter().enumerate() {
        sqlx::query(
            "INSERT OR REPLACE INTO reviews \
             (kind, video_id, id, author, content, rating, created_at, url, page, position) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(kind.as_str())
        .bind(video_id)
        .bind(&review.id)
        .bind(review.author.as_deref())
        .bind(review.content.as_deref())
        .bind(review.rating)
        .bind(review.created_at.as_deref())
        .bind(review.url.as_deref())
        .bind(i64::from(page))
        .bind(position as i64)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn clear_reviews_tx(
    tx: &mut Transaction<'_, Sqlite>,
    kind: ContentKind,
    video_id: i64,
) -> Result<()> {
    sqlx::query("DELETE FROM reviews WHERE kind = ? AND video_id = ?")
        .bind(kind.as_str())
        .bind(video_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_reviews(
    pool: &Pool,
    kind: ContentKind,
    video_id: i64,
    offset: i64,
    limit: i64,
) -> Result<Vec<Review>> {
    let sql = format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE kind = ? AND video_id = ? \
         ORDER BY page ASC, position ASC LIMIT ? OFFSET ?"
    );
    let rows = sqlx::query(&sql)
        .bind(kind.as_str())
        .bind(video_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    rows.iter().map(review_from_row).collect()
}

#[instrument(skip_all)]
pub async fn count_reviews(pool: &Pool, kind: ContentKind, video_id: i64) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE kind = ? AND video_id = ?")
            .bind(kind.as_str())
            .bind(video_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// Paging keys

#[instrument(skip_all)]
pub async fn get_paging_key(
    pool: &Pool,
    scope: &ListScope,
    item_id: &str,
) -> Result<Option<PagingKey>> {
    let row = sqlx::query(
        "SELECT item_id, prev_page, next_page FROM paging_keys WHERE scope = ? AND item_id = ?",
    )
    .bind(scope.storage_key())
    .bind(item_id)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(PagingKey {
        item_id: row.try_get("item_id")?,
        prev_page: page_from_column(row.try_get("prev_page")?),
        next_page: page_from_column(row.try_get("next_page")?),
    }))
}

#[instrument(skip_all)]
pub async fn upsert_paging_keys_tx(
    tx: &mut Transaction<'_, Sqlite>,
    scope: &ListScope,
    keys: &[PagingKey],
) -> Result<()> {
    let scope_key = scope.storage_key();
    for key in keys {
        sqlx::query(
            "INSERT INTO paging_keys (scope, item_id, prev_page, next_page) VALUES (?, ?, ?, ?) \
             ON CONFLICT(scope, item_id) DO UPDATE \
             SET prev_page = excluded.prev_page, next_page = excluded.next_page",
        )
        .bind(&scope_key)
        .bind(&key.item_id)
        .bind(key.prev_page.map(i64::from))
        .bind(key.next_page.map(i64::from))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn clear_paging_keys_tx(
    tx: &mut Transaction<'_, Sqlite>,
    scope: &ListScope,
) -> Result<()> {
    sqlx::query("DELETE FROM paging_keys WHERE scope = ?")
        .bind(scope.storage_key())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn count_paging_keys(pool: &Pool, scope: &ListScope) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM paging_keys WHERE scope = ?")
        .bind(scope.storage_key())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// Detail and clip caches

#[instrument(skip_all)]
pub async fn upsert_video_details(pool: &Pool, video: &Video) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO video_details \
         (kind, id, title, overview, poster_path, backdrop_path, \
         popularity, vote_average, vote_count, release_date, cached_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(video.kind.as_str())
    .bind(video.id)
    .bind(video.title.as_deref())
    .bind(video.overview.as_deref())
    .bind(video.poster_path.as_deref())
    .bind(video.backdrop_path.as_deref())
    .bind(video.popularity)
    .bind(video.vote_average)
    .bind(video.vote_count)
    .bind(video.release_date.as_deref())
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("failed to cache video details")?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_video_details(
    pool: &Pool,
    kind: ContentKind,
    id: i64,
) -> Result<Option<CachedDetails>> {
    let sql =
        format!("SELECT {VIDEO_COLUMNS}, cached_at FROM video_details WHERE kind = ? AND id = ?");
    let row = sqlx::query(&sql)
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(CachedDetails {
        video: video_from_row(&row)?,
        cached_at: row.try_get::<DateTime<Utc>, _>("cached_at")?,
    }))
}

/// Replace every cached clip of one video.
#[instrument(skip_all)]
pub async fn replace_clips(
    pool: &Pool,
    kind: ContentKind,
    video_id: i64,
    clips: &[Clip],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM clips WHERE kind = ? AND video_id = ?")
        .bind(kind.as_str())
        .bind(video_id)
        .execute(&mut *tx)
        .await?;
    for (position, clip) in clips.iter().enumerate() {
        sqlx::query(
            "INSERT OR REPLACE INTO clips \
             (kind, video_id, id, clip_key, name, site, clip_type, position) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(kind.as_str())
        .bind(video_id)
        .bind(&clip.id)
        .bind(clip.key.as_deref())
        .bind(clip.name.as_deref())
        .bind(clip.site.as_deref())
        .bind(clip.clip_type.as_deref())
        .bind(position as i64)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_clips(pool: &Pool, kind: ContentKind, video_id: i64) -> Result<Vec<Clip>> {
    let rows = sqlx::query(
        "SELECT kind, video_id, id, clip_key, name, site, clip_type FROM clips \
         WHERE kind = ? AND video_id = ? ORDER BY position ASC",
    )
    .bind(kind.as_str())
    .bind(video_id)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| {
            Ok(Clip {
                id: row.try_get("id")?,
                kind: parse_kind(row)?,
                video_id: row.try_get("video_id")?,
                key: row.try_get("clip_key")?,
                name: row.try_get("name")?,
                site: row.try_get("site")?,
                clip_type: row.try_get("clip_type")?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Favorites

#[instrument(skip_all)]
pub async fn insert_favorite(pool: &Pool, favorite: &Favorite) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO favorites \
         (kind, id, title, poster_path, backdrop_path, popularity, added_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(favorite.kind.as_str())
    .bind(favorite.id)
    .bind(favorite.title.as_deref())
    .bind(favorite.poster_path.as_deref())
    .bind(favorite.backdrop_path.as_deref())
    .bind(favorite.popularity)
    .bind(favorite.added_at)
    .execute(pool)
    .await
    .context("failed to persist favorite")?;
    Ok(())
}

/// Returns whether a row was removed.
#[instrument(skip_all)]
pub async fn delete_favorite(pool: &Pool, kind: ContentKind, id: i64) -> Result<bool> {
    let res = sqlx::query("DELETE FROM favorites WHERE kind = ? AND id = ?")
        .bind(kind.as_str())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn is_favorite(pool: &Pool, kind: ContentKind, id: i64) -> Result<bool> {
    let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM favorites WHERE kind = ? AND id = ?")
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

#[instrument(skip_all)]
pub async fn list_favorites(pool: &Pool, kind: ContentKind) -> Result<Vec<Favorite>> {
    let rows = sqlx::query(
        "SELECT kind, id, title, poster_path, backdrop_path, popularity, added_at FROM favorites \
         WHERE kind = ? ORDER BY added_at DESC, id ASC",
    )
    .bind(kind.as_str())
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| {
            Ok(Favorite {
                kind: parse_kind(row)?,
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                poster_path: row.try_get("poster_path")?,
                backdrop_path: row.try_get("backdrop_path")?,
                popularity: row.try_get("popularity")?,
                added_at: row.try_get("added_at")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn video(kind: ContentKind, id: i64) -> Video {
        Video {
            id,
            kind,
            title: Some(format!("title {id}")),
            overview: None,
            poster_path: Some(format!("/p{id}.jpg")),
            backdrop_path: None,
            popularity: Some(id as f64),
            vote_average: Some(7.5),
            vote_count: Some(100),
            release_date: Some("2020-01-01".into()),
        }
    }

    #[test]
    fn memory_urls_pass_through() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("postgres://localhost/db"),
            "postgres://localhost/db"
        );
    }

    #[test]
    fn file_urls_are_normalized() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested").join("movies.db");
        let url = format!("sqlite:{}", path.display());
        let normalized = prepare_sqlite_url(&url);
        assert_eq!(normalized, format!("sqlite://{}?mode=rwc", path.display()));
        assert!(path.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn videos_are_ordered_by_page_then_position() {
        let pool = init_memory_pool().await.unwrap();
        let mut tx = pool.begin().await.unwrap();
        let later = [video(ContentKind::Movie, 30), video(ContentKind::Movie, 31)];
        insert_videos_tx(&mut tx, ContentKind::Movie, 2, &later)
            .await
            .unwrap();
        let earlier = [video(ContentKind::Movie, 10), video(ContentKind::Movie, 11)];
        insert_videos_tx(&mut tx, ContentKind::Movie, 1, &earlier)
            .await
            .unwrap();
        insert_videos_tx(&mut tx, ContentKind::Show, 1, &[video(ContentKind::Show, 10)])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let ids: Vec<i64> = list_videos(&pool, ContentKind::Movie, 0, 10)
            .await
            .unwrap()
            .iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(ids, vec![10, 11, 30, 31]);
        assert_eq!(count_videos(&pool, ContentKind::Show).await.unwrap(), 1);

        let window: Vec<i64> = list_videos(&pool, ContentKind::Movie, 1, 2)
            .await
            .unwrap()
            .iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(window, vec![11, 30]);

        let fetched = get_video(&pool, ContentKind::Movie, 30).await.unwrap().unwrap();
        assert_eq!(fetched, video(ContentKind::Movie, 30));
    }

    #[tokio::test]
    async fn paging_keys_upsert_and_clear_by_scope() {
        let pool = init_memory_pool().await.unwrap();
        let a = ListScope::reviews(ContentKind::Movie, 1);
        let b = ListScope::reviews(ContentKind::Movie, 2);

        let mut tx = pool.begin().await.unwrap();
        upsert_paging_keys_tx(&mut tx, &a, &[PagingKey::new("r1", None, Some(2))])
            .await
            .unwrap();
        upsert_paging_keys_tx(&mut tx, &a, &[PagingKey::new("r1", Some(1), Some(3))])
            .await
            .unwrap();
        upsert_paging_keys_tx(&mut tx, &b, &[PagingKey::new("r1", None, None)])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let key = get_paging_key(&pool, &a, "r1").await.unwrap().unwrap();
        assert_eq!(key, PagingKey::new("r1", Some(1), Some(3)));

        let mut tx = pool.begin().await.unwrap();
        clear_paging_keys_tx(&mut tx, &a).await.unwrap();
        tx.commit().await.unwrap();

        assert!(get_paging_key(&pool, &a, "r1").await.unwrap().is_none());
        assert_eq!(count_paging_keys(&pool, &b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn favorites_listed_newest_first() {
        let pool = init_memory_pool().await.unwrap();
        let now = Utc::now();
        let older = Favorite::from_video(&video(ContentKind::Movie, 1), now - Duration::minutes(5));
        let newer = Favorite::from_video(&video(ContentKind::Movie, 2), now);
        insert_favorite(&pool, &older).await.unwrap();
        insert_favorite(&pool, &newer).await.unwrap();
        insert_favorite(&pool, &Favorite::from_video(&video(ContentKind::Show, 3), now))
            .await
            .unwrap();

        let ids: Vec<i64> = list_favorites(&pool, ContentKind::Movie)
            .await
            .unwrap()
            .iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(is_favorite(&pool, ContentKind::Show, 3).await.unwrap());
        assert!(delete_favorite(&pool, ContentKind::Show, 3).await.unwrap());
        assert!(!delete_favorite(&pool, ContentKind::Show, 3).await.unwrap());
        assert!(!is_favorite(&pool, ContentKind::Show, 3).await.unwrap());
    }
}
