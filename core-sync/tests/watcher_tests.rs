//! Integration tests for the change watcher
//!
//! These use real filesystem notifications on a temp directory with a short
//! quiescence window.

mod common;

use common::{wait_for, Harness};
use core_library::repositories::SongRepository;
use core_runtime::WatchConfig;
use core_sync::{ChangeWatcher, ReconcileMode};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

fn fast_watch() -> WatchConfig {
    WatchConfig {
        quiescence: Duration::from_millis(200),
        poll_interval: Duration::from_millis(50),
        on_startup: false,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_double_start_keeps_one_subscription() {
    let h = Harness::new().await;
    let watcher = ChangeWatcher::new(h.reconciler.clone(), fast_watch());

    watcher.start().await.unwrap();
    watcher.start().await.unwrap();

    assert!(watcher.is_running().await);
    assert_eq!(watcher.live_subscriptions(), 1);

    h.write("fresh.mp3", "title:Fresh");

    let songs = h.songs.clone();
    assert!(
        wait_for(TIMEOUT, || {
            let songs = songs.clone();
            async move { songs.count().await.unwrap() == 1 }
        })
        .await,
        "new file should be ingested"
    );

    // Give a duplicate event loop time to act if one were still running
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.songs.count().await.unwrap(), 1);
    assert_eq!(h.reader.calls(), 1, "file must be read exactly once");

    watcher.stop().await;
    assert_eq!(watcher.live_subscriptions(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_removed_file_is_retired() {
    let h = Harness::new().await;
    h.write("doomed.mp3", "title:Doomed");
    h.reconciler.reconcile(ReconcileMode::Incremental).await.unwrap();
    assert_eq!(h.songs.count().await.unwrap(), 1);

    let watcher = ChangeWatcher::new(h.reconciler.clone(), fast_watch());
    watcher.start().await.unwrap();

    h.remove("doomed.mp3");

    let songs = h.songs.clone();
    assert!(
        wait_for(TIMEOUT, || {
            let songs = songs.clone();
            async move { songs.count().await.unwrap() == 0 }
        })
        .await,
        "removed file should be retired"
    );

    watcher.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_file_written_in_bursts_is_ingested_once_complete() {
    let h = Harness::new().await;
    let watcher = ChangeWatcher::new(h.reconciler.clone(), fast_watch());
    watcher.start().await.unwrap();

    let path = h.media.path().join("slow.mp3");
    std::fs::write(&path, "title:Partial").unwrap();
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&path, "title:Complete\n").unwrap();
    }

    let songs = h.songs.clone();
    assert!(
        wait_for(TIMEOUT, || {
            let songs = songs.clone();
            async move { songs.count().await.unwrap() == 1 }
        })
        .await
    );

    let song = h.songs.find_by_filename("slow.mp3").await.unwrap().unwrap();
    assert_eq!(song.title, "Complete");

    watcher.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_is_idempotent() {
    let h = Harness::new().await;
    let watcher = ChangeWatcher::new(h.reconciler.clone(), fast_watch());

    watcher.stop().await;
    assert!(!watcher.is_running().await);

    watcher.start().await.unwrap();
    watcher.stop().await;
    watcher.stop().await;

    assert!(!watcher.is_running().await);
    assert_eq!(watcher.live_subscriptions(), 0);

    // Nothing is ingested once stopped
    h.write("late.mp3", "title:Late");
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.songs.count().await.unwrap(), 0);
}
