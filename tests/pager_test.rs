mod common;

use common::*;
use futures::StreamExt;
use movie_pager::model::{ContentKind, Video};
use movie_pager::paging::{LoadDirection, PagingConfig, PagingData};
use std::time::Duration;
use tokio::time::timeout;

const MOVIE: ContentKind = ContentKind::Movie;

fn small_pages() -> PagingConfig {
    PagingConfig {
        page_size: 10,
        prefetch_distance: 3,
        initial_load_size: 10,
        launch_initial_refresh: true,
    }
}

async fn next_matching<S, F>(stream: &mut S, pred: F) -> PagingData<Video>
where
    S: futures::Stream<Item = PagingData<Video>> + Unpin,
    F: Fn(&PagingData<Video>) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            let data = stream.next().await.expect("stream ended");
            if pred(&data) {
                return data;
            }
        }
    })
    .await
    .expect("no matching snapshot")
}

#[tokio::test]
async fn test_access_grows_window_from_cache() {
    let store = setup_store().await;
    let catalog = RecordingCatalog::new();
    catalog.set_videos(MOVIE, 1, video_page(1, 20)).await;
    catalog.set_videos(MOVIE, 2, video_page(21, 20)).await;
    let pager = video_pager(&store, &catalog, MOVIE, small_pages());
    pager.initialize().await.unwrap();

    let data = pager.snapshot().await.unwrap();
    assert_eq!(data.total, 20);
    assert_eq!(ids(&data.items), (1..=10).collect::<Vec<_>>());

    pager.access(7).await.unwrap();
    let data = pager.snapshot().await.unwrap();
    assert_eq!(ids(&data.items), (1..=20).collect::<Vec<_>>());
    assert_eq!(catalog.video_pages_requested(MOVIE).await, vec![1]);

    // Cache exhausted: the next page comes from the catalog.
    pager.access(18).await.unwrap();
    let data = pager.snapshot().await.unwrap();
    assert_eq!(data.total, 40);
    assert_eq!(data.items.len(), 40);
    assert_eq!(catalog.video_pages_requested(MOVIE).await, vec![1, 2]);
}

#[tokio::test]
async fn test_access_far_from_edges_loads_nothing() {
    let store = setup_store().await;
    let catalog = RecordingCatalog::new();
    catalog.set_videos(MOVIE, 1, video_page(1, 20)).await;
    let pager = video_pager(&store, &catalog, MOVIE, config());
    pager.initialize().await.unwrap();

    pager.access(10).await.unwrap();

    assert_eq!(pager.snapshot().await.unwrap().items.len(), 20);
    assert_eq!(catalog.video_pages_requested(MOVIE).await, vec![1]);
}

#[tokio::test]
async fn test_access_near_start_ends_prepend() {
    let store = setup_store().await;
    let catalog = RecordingCatalog::new();
    catalog.set_videos(MOVIE, 1, video_page(1, 20)).await;
    let pager = video_pager(&store, &catalog, MOVIE, config());
    pager.initialize().await.unwrap();

    pager.access(1).await.unwrap();

    let data = pager.snapshot().await.unwrap();
    assert!(data.load_states.prepend.end_of_pagination_reached());
    assert_eq!(data.items.len(), 20);
    assert_eq!(catalog.video_pages_requested(MOVIE).await, vec![1]);
}

#[tokio::test]
async fn test_cached_rows_survive_a_new_pager() {
    let store = setup_store().await;
    let catalog = RecordingCatalog::new();
    catalog.set_videos(MOVIE, 1, video_page(1, 20)).await;
    catalog.set_videos(MOVIE, 2, video_page(21, 20)).await;
    catalog.set_videos(MOVIE, 3, video_page(41, 20)).await;

    let first = video_pager(&store, &catalog, MOVIE, config());
    first.initialize().await.unwrap();
    first.load(LoadDirection::Append).await.unwrap();
    first.close();

    let resumed_config = PagingConfig {
        launch_initial_refresh: false,
        ..config()
    };
    let resumed = video_pager(&store, &catalog, MOVIE, resumed_config);
    assert!(resumed.initialize().await.unwrap().is_none());
    assert_eq!(resumed.snapshot().await.unwrap().items.len(), 20);

    resumed.access(19).await.unwrap();
    assert_eq!(resumed.snapshot().await.unwrap().items.len(), 40);

    // Continues from the stored key of item 40 instead of starting over.
    resumed.load(LoadDirection::Append).await.unwrap();
    assert_eq!(resumed.snapshot().await.unwrap().total, 60);
    assert_eq!(catalog.video_pages_requested(MOVIE).await, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_initialize_refreshes_empty_cache_even_when_disabled() {
    let store = setup_store().await;
    let catalog = RecordingCatalog::new();
    catalog.set_videos(MOVIE, 1, video_page(1, 5)).await;
    let cfg = PagingConfig {
        launch_initial_refresh: false,
        ..config()
    };
    let pager = video_pager(&store, &catalog, MOVIE, cfg);

    let result = pager.initialize().await.unwrap();

    assert!(result.is_some_and(|r| r.is_success()));
    assert_eq!(pager.snapshot().await.unwrap().total, 5);
}

#[tokio::test]
async fn test_stream_emits_current_then_updates() {
    let store = setup_store().await;
    let catalog = RecordingCatalog::new();
    catalog.set_videos(MOVIE, 1, video_page(1, 20)).await;
    catalog.set_videos(MOVIE, 2, video_page(21, 20)).await;
    let pager = video_pager(&store, &catalog, MOVIE, config());

    let mut stream = Box::pin(pager.stream());
    let first = stream.next().await.unwrap();
    assert!(first.items.is_empty());
    assert_eq!(first.total, 0);

    pager.initialize().await.unwrap();
    let loaded = next_matching(&mut stream, |d| {
        d.items.len() == 20 && !d.load_states.refresh.is_loading()
    })
    .await;
    assert_eq!(loaded.offset, 0);

    pager.access(19).await.unwrap();
    let appended = next_matching(&mut stream, |d| d.items.len() == 40).await;
    assert_eq!(ids(&appended.items), (1..=40).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_new_stream_starts_from_current_window() {
    let store = setup_store().await;
    let catalog = RecordingCatalog::new();
    catalog.set_videos(MOVIE, 1, video_page(1, 20)).await;
    let pager = video_pager(&store, &catalog, MOVIE, config());
    pager.initialize().await.unwrap();

    let mut first = Box::pin(pager.stream());
    let a = first.next().await.unwrap();
    drop(first);

    let mut second = Box::pin(pager.stream());
    let b = second.next().await.unwrap();

    assert_eq!(a, b);
    assert_eq!(b.items.len(), 20);
}

#[tokio::test]
async fn test_stream_skips_identical_snapshots() {
    let store = setup_store().await;
    let catalog = RecordingCatalog::new();
    catalog.set_videos(MOVIE, 1, video_page(1, 20)).await;
    let pager = video_pager(&store, &catalog, MOVIE, config());
    pager.initialize().await.unwrap();

    let mut stream = Box::pin(pager.stream());
    stream.next().await.unwrap();

    // Neither the window nor the rows change.
    pager.access(10).await.unwrap();
    store.notify_changed();
    assert!(timeout(Duration::from_millis(200), stream.next()).await.is_err());
}

#[tokio::test]
async fn test_close_ends_streams() {
    let store = setup_store().await;
    let catalog = RecordingCatalog::new();
    let pager = video_pager(&store, &catalog, MOVIE, config());

    let mut stream = Box::pin(pager.stream());
    stream.next().await.unwrap();
    pager.close();

    let ended = timeout(Duration::from_secs(5), stream.next()).await.unwrap();
    assert!(ended.is_none());
    assert!(Box::pin(pager.stream()).next().await.is_none());
}

#[tokio::test]
async fn test_load_states_channel_tracks_refresh() {
    let store = setup_store().await;
    let catalog = RecordingCatalog::new();
    catalog.set_videos(MOVIE, 1, video_page(1, 20)).await;
    let pager = video_pager(&store, &catalog, MOVIE, config());
    let states = pager.load_states();

    pager.refresh().await.unwrap();

    let current = states.borrow().clone();
    assert!(!current.refresh.is_loading());
    assert!(!current.refresh.end_of_pagination_reached());
    assert!(!current.prepend.is_error());
}

#[tokio::test]
async fn test_dropped_load_releases_its_direction() {
    let store = setup_store().await;
    let catalog = RecordingCatalog::new();
    catalog.set_videos(MOVIE, 1, video_page(1, 20)).await;
    catalog.set_videos(MOVIE, 2, video_page(21, 20)).await;
    let pager = video_pager(&store, &catalog, MOVIE, config());
    pager.refresh().await.unwrap();

    catalog.set_gated(true);
    let abandoned = timeout(Duration::from_millis(50), pager.load(LoadDirection::Append)).await;
    assert!(abandoned.is_err());
    let states = pager.snapshot().await.unwrap().load_states;
    assert!(!states.append.is_loading());
    assert!(!states.append.is_error());

    catalog.set_gated(false);
    let result = pager.load(LoadDirection::Append).await.unwrap();
    assert!(result.is_success());
    assert_eq!(pager.snapshot().await.unwrap().total, 40);
    assert_eq!(catalog.video_pages_requested(MOVIE).await, vec![1, 2, 2]);
}

#[tokio::test]
async fn test_failed_append_waits_for_retry() {
    let store = setup_store().await;
    let catalog = RecordingCatalog::new();
    catalog.set_videos(MOVIE, 1, video_page(1, 20)).await;
    catalog.set_videos(MOVIE, 2, video_page(21, 20)).await;
    let pager = video_pager(&store, &catalog, MOVIE, config());
    pager.refresh().await.unwrap();

    catalog.fail_next(1);
    pager.access(19).await.unwrap();
    let data = pager.snapshot().await.unwrap();
    assert!(data.load_states.append.is_error());
    assert_eq!(data.items.len(), 20);

    // A failed edge is not reloaded by scrolling.
    pager.access(19).await.unwrap();
    assert_eq!(catalog.video_pages_requested(MOVIE).await, vec![1, 2]);

    let retried = pager.retry().await;
    assert_eq!(retried.len(), 1);
    assert_eq!(retried[0].0, LoadDirection::Append);
    assert!(retried[0].1.is_success());

    let data = pager.snapshot().await.unwrap();
    assert_eq!(ids(&data.items), (1..=40).collect::<Vec<_>>());
    assert!(!data.load_states.append.is_error());
    assert_eq!(catalog.video_pages_requested(MOVIE).await, vec![1, 2, 2]);
}
