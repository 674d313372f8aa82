//! # Change Watcher
//!
//! Incremental synchronization driven by filesystem events.
//!
//! ## Overview
//!
//! [`ChangeWatcher`] owns at most one subscription to the media root. A
//! subscription is a `notify` watcher feeding a bounded channel, plus an event
//! loop task that:
//! - parks created, renamed-in and modified files in a [`QuiescenceWindow`]
//! - polls pending files every `poll_interval`, treating size changes as activity
//! - ingests a file once it has been quiet for `quiescence` and is still a regular file
//! - retires removed and renamed-out files immediately
//!
//! `start` tears down any previous subscription before opening a new one, so
//! repeated starts never leave two event loops running. `stop` on a stopped
//! watcher does nothing.

use crate::error::Result;
use crate::quiescence::QuiescenceWindow;
use crate::reconciler::{IngestOutcome, Reconciler};
use core_runtime::WatchConfig;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Decrements the live-subscription counter when the event loop ends.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Subscription {
    watcher: RecommendedWatcher,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Subscription {
    async fn teardown(self) {
        // No new events once the OS watcher is gone
        drop(self.watcher);
        self.cancel.cancel();

        if let Err(e) = self.task.await {
            error!(error = %e, "Watch event loop ended abnormally");
        }
    }
}

/// Start/stop handle for live filesystem synchronization
pub struct ChangeWatcher {
    reconciler: Arc<Reconciler>,
    config: WatchConfig,
    state: Mutex<Option<Subscription>>,
    live: Arc<AtomicUsize>,
}

impl ChangeWatcher {
    pub fn new(reconciler: Arc<Reconciler>, config: WatchConfig) -> Self {
        Self {
            reconciler,
            config,
            state: Mutex::new(None),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribe to the media root, replacing any current subscription.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if let Some(previous) = state.take() {
            debug!("Replacing existing watch subscription");
            previous.teardown().await;
        }

        let root = self.reconciler.media_root().to_path_buf();
        let (tx, rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAPACITY);

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let Err(err) = tx.blocking_send(event) {
                        debug!("Watch channel closed, dropping event: {}", err);
                    }
                }
                Err(err) => warn!("Watch error: {}", err),
            },
            NotifyConfig::default(),
        )?;
        watcher.watch(&root, RecursiveMode::NonRecursive)?;

        let cancel = CancellationToken::new();
        let guard = LiveGuard::acquire(&self.live);
        let task = tokio::spawn(run_event_loop(
            self.reconciler.clone(),
            self.config.clone(),
            rx,
            cancel.clone(),
            guard,
        ));

        *state = Some(Subscription {
            watcher,
            cancel,
            task,
        });

        info!(root = %root.display(), "Watching media root for changes");
        Ok(())
    }

    /// Tear down the current subscription, if any.
    pub async fn stop(&self) {
        let previous = self.state.lock().await.take();

        if let Some(subscription) = previous {
            subscription.teardown().await;
            info!("Stopped watching media root");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Subscriptions whose event loop has not finished.
    pub fn live_subscriptions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

async fn run_event_loop(
    reconciler: Arc<Reconciler>,
    config: WatchConfig,
    mut events: mpsc::Receiver<Event>,
    cancel: CancellationToken,
    _guard: LiveGuard,
) {
    let mut window = QuiescenceWindow::new(config.quiescence);
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => handle_event(&reconciler, &mut window, event).await,
                None => break,
            },
            _ = ticker.tick(), if !window.is_empty() => {
                settle_pending(&reconciler, &mut window).await;
            }
        }
    }

    debug!(pending = window.len(), "Watch event loop finished");
}

async fn handle_event(reconciler: &Reconciler, window: &mut QuiescenceWindow, event: Event) {
    let now = Instant::now();

    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in event.paths {
                window.touch(path, now);
            }
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in &event.paths {
                retire(reconciler, window, path).await;
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [from, to] = event.paths.as_slice() {
                retire(reconciler, window, from).await;
                window.touch(to.clone(), now);
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            // Direction unknown: decide by whether the path still exists
            for path in event.paths {
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    window.touch(path, now);
                } else {
                    retire(reconciler, window, &path).await;
                }
            }
        }
        EventKind::Modify(_) => {
            for path in event.paths {
                window.touch(path, now);
            }
        }
        _ => {}
    }
}

async fn retire(reconciler: &Reconciler, window: &mut QuiescenceWindow, path: &Path) {
    window.cancel(path);

    let Some(filename) = filename_of(path) else {
        return;
    };

    match reconciler.retire_by_filename(filename).await {
        Ok(true) => info!(%filename, "Retired removed file"),
        Ok(false) => {}
        Err(e) => error!(%filename, error = %e, "Failed to retire removed file"),
    }
}

async fn settle_pending(reconciler: &Reconciler, window: &mut QuiescenceWindow) {
    let now = Instant::now();

    for path in window.pending_paths() {
        match tokio::fs::metadata(&path).await {
            Ok(meta) => {
                window.record_len(&path, meta.len(), now);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // The remove event retires it if it was ever cataloged
                window.cancel(&path);
            }
            Err(e) => debug!(path = %path.display(), error = %e, "Cannot stat pending file"),
        }
    }

    for path in window.drain_settled(now) {
        ingest_settled(reconciler, &path).await;
    }
}

async fn ingest_settled(reconciler: &Reconciler, path: &Path) {
    let is_file = tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false);
    if !is_file {
        return;
    }

    let Some(filename) = filename_of(path) else {
        return;
    };

    match reconciler.ingest_if_missing(filename).await {
        Ok(IngestOutcome::Added(song)) | Ok(IngestOutcome::Fallback(song)) => {
            info!(id = %song.id, %filename, "Ingested new file");
        }
        Ok(IngestOutcome::AlreadyPresent) | Ok(IngestOutcome::Ignored) => {}
        Err(e) => warn!(%filename, error = %e, "Failed to ingest new file"),
    }
}

/// UTF-8 final component of an event path
fn filename_of(path: &Path) -> Option<&str> {
    let name = path.file_name()?;
    match name.to_str() {
        Some(name) => Some(name),
        None => {
            warn!(path = %path.display(), "Ignoring file with non-UTF-8 name");
            None
        }
    }
}
