//! Settle tracking for files that are still being written.
//!
//! A freshly created file is usually incomplete when the first event arrives.
//! [`QuiescenceWindow`] holds every pending path with a deadline; the deadline
//! moves forward whenever another event arrives for the path or its observed
//! size changes. Once a deadline passes without either, the path is drained
//! and can be ingested.
//!
//! The window is a plain data structure: callers pass the current instant in,
//! which keeps it deterministic under test.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct PendingEntry {
    settles_at: Instant,
    last_len: Option<u64>,
}

/// Per-path settle deadlines
#[derive(Debug)]
pub struct QuiescenceWindow {
    window: Duration,
    pending: HashMap<PathBuf, PendingEntry>,
}

impl QuiescenceWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Register activity on `path`, pushing its deadline to `now + window`.
    pub fn touch(&mut self, path: impl Into<PathBuf>, now: Instant) {
        let settles_at = now + self.window;
        self.pending
            .entry(path.into())
            .and_modify(|entry| entry.settles_at = settles_at)
            .or_insert(PendingEntry {
                settles_at,
                last_len: None,
            });
    }

    /// Record the size of a pending file; a change from the previous
    /// observation counts as activity.
    ///
    /// Returns `true` if the deadline was pushed back.
    pub fn record_len(&mut self, path: &Path, len: u64, now: Instant) -> bool {
        let window = self.window;
        let Some(entry) = self.pending.get_mut(path) else {
            return false;
        };

        let changed = matches!(entry.last_len, Some(previous) if previous != len);
        entry.last_len = Some(len);
        if changed {
            entry.settles_at = now + window;
        }
        changed
    }

    /// Forget a pending path. Returns whether it was pending.
    pub fn cancel(&mut self, path: &Path) -> bool {
        self.pending.remove(path).is_some()
    }

    /// Remove and return every path whose deadline is at or before `now`.
    pub fn drain_settled(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut settled: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.settles_at <= now)
            .map(|(path, _)| path.clone())
            .collect();

        for path in &settled {
            self.pending.remove(path);
        }

        settled.sort();
        settled
    }

    pub fn pending_paths(&self) -> Vec<PathBuf> {
        self.pending.keys().cloned().collect()
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.contains_key(path)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Earliest deadline among pending paths
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|entry| entry.settles_at).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(2000);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_path_settles_after_window() {
        let t0 = Instant::now();
        let mut window = QuiescenceWindow::new(WINDOW);
        window.touch("/music/a.mp3", t0);

        assert!(window.drain_settled(t0 + ms(1999)).is_empty());
        assert_eq!(
            window.drain_settled(t0 + ms(2000)),
            vec![PathBuf::from("/music/a.mp3")]
        );
        assert!(window.is_empty());
    }

    #[test]
    fn test_touch_resets_deadline() {
        let t0 = Instant::now();
        let mut window = QuiescenceWindow::new(WINDOW);
        window.touch("/music/a.mp3", t0);
        window.touch("/music/a.mp3", t0 + ms(1500));

        assert!(window.drain_settled(t0 + ms(2500)).is_empty());
        assert_eq!(window.drain_settled(t0 + ms(3500)).len(), 1);
    }

    #[test]
    fn test_growing_file_is_held_back() {
        let t0 = Instant::now();
        let path = Path::new("/music/big.flac");
        let mut window = QuiescenceWindow::new(WINDOW);
        window.touch(path, t0);

        // First observation only records the size
        assert!(!window.record_len(path, 100, t0 + ms(500)));
        assert!(window.record_len(path, 4096, t0 + ms(1000)));
        assert!(!window.record_len(path, 4096, t0 + ms(1500)));

        assert!(window.drain_settled(t0 + ms(2500)).is_empty());
        assert_eq!(window.next_deadline(), Some(t0 + ms(3000)));
        assert_eq!(window.drain_settled(t0 + ms(3000)), vec![path.to_path_buf()]);
    }

    #[test]
    fn test_cancel_and_unknown_paths() {
        let t0 = Instant::now();
        let path = Path::new("/music/gone.mp3");
        let mut window = QuiescenceWindow::new(WINDOW);

        assert!(!window.record_len(path, 1, t0));
        assert!(!window.cancel(path));

        window.touch(path, t0);
        assert!(window.is_pending(path));
        assert!(window.cancel(path));
        assert!(window.drain_settled(t0 + ms(10_000)).is_empty());
    }

    #[test]
    fn test_drain_only_takes_settled_paths() {
        let t0 = Instant::now();
        let mut window = QuiescenceWindow::new(WINDOW);
        window.touch("/music/b.mp3", t0);
        window.touch("/music/a.mp3", t0);
        window.touch("/music/c.mp3", t0 + ms(1000));

        assert_eq!(window.len(), 3);
        assert_eq!(
            window.drain_settled(t0 + ms(2000)),
            vec![PathBuf::from("/music/a.mp3"), PathBuf::from("/music/b.mp3")]
        );
        assert_eq!(window.pending_paths(), vec![PathBuf::from("/music/c.mp3")]);
    }
}
