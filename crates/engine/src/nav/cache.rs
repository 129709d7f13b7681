use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use super::grid::GridCell;

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PathKey {
    pub start: GridCell,
    pub end: GridCell,
    pub smoothed: bool,
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)?;
        if self.smoothed {
            f.write_str("~s")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct CachedPath {
    path: Vec<GridCell>,
    stored_at: Instant,
}

/// Time-bounded path memo with FIFO eviction by first insertion.
#[derive(Debug)]
pub(crate) struct PathCache {
    entries: HashMap<PathKey, CachedPath>,
    insertion_order: VecDeque<PathKey>,
    timeout: Duration,
    max_entries: usize,
}

impl PathCache {
    pub(crate) fn new(timeout: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            timeout,
            max_entries: max_entries.max(1),
        }
    }

    /// Returns an owned copy; stale entries are dropped on sight.
    pub(crate) fn get(&mut self, key: &PathKey, now: Instant) -> Option<Vec<GridCell>> {
        let stored_at = self.entries.get(key)?.stored_at;
        if now.saturating_duration_since(stored_at) > self.timeout {
            self.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.path.clone())
    }

    pub(crate) fn insert(&mut self, key: PathKey, path: &[GridCell], now: Instant) {
        let entry = CachedPath {
            path: path.to_vec(),
            stored_at: now,
        };
        if self.entries.insert(key, entry).is_none() {
            self.insertion_order.push_back(key);
        }
        while self.entries.len() > self.max_entries {
            let Some(oldest) = self.insertion_order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn remove(&mut self, key: &PathKey) {
        if self.entries.remove(key).is_some() {
            self.insertion_order.retain(|queued| queued != key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(x: i32) -> PathKey {
        PathKey {
            start: GridCell::new(0, 0),
            end: GridCell::new(x, 0),
            smoothed: true,
        }
    }

    #[test]
    fn key_renders_floored_cells() {
        let key = PathKey {
            start: GridCell::new(1, -2),
            end: GridCell::new(3, 4),
            smoothed: false,
        };
        assert_eq!(key.to_string(), "1,-2-3,4");
    }

    #[test]
    fn entries_expire_after_timeout() {
        let mut cache = PathCache::new(Duration::from_millis(5000), 8);
        let t0 = Instant::now();
        cache.insert(key(1), &[GridCell::new(0, 0)], t0);
        assert!(cache.get(&key(1), t0 + Duration::from_millis(5000)).is_some());
        assert!(cache.get(&key(1), t0 + Duration::from_millis(5001)).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn oldest_insertion_is_evicted_first() {
        let mut cache = PathCache::new(Duration::from_secs(60), 2);
        let now = Instant::now();
        cache.insert(key(1), &[], now);
        cache.insert(key(2), &[], now);
        cache.insert(key(1), &[GridCell::new(9, 9)], now);
        cache.insert(key(3), &[], now);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(1), now).is_none());
        assert!(cache.get(&key(2), now).is_some());
        assert!(cache.get(&key(3), now).is_some());
    }
}
