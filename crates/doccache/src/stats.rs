//! Residency and undo counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Something the store counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// Lookup served from memory
    Hit,
    /// Lookup that reloaded a spilled document
    Reload,
    /// Document moved to secondary storage
    Eviction,
    /// Document ingested by `put`
    Insert,
    /// Undo applied
    Undo,
}

impl StoreEvent {
    const COUNT: usize = 5;

    fn slot(self) -> usize {
        self as usize
    }
}

/// Counts at one instant, detached from the live counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Lookups served from memory
    pub hits: u64,
    /// Lookups that reloaded a spilled document
    pub reloads: u64,
    /// Documents evicted
    pub evictions: u64,
    /// Documents ingested
    pub inserts: u64,
    /// Undos applied
    pub undos: u64,
}

impl StatsSnapshot {
    /// Share of lookups served from memory (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        match self.hits + self.reloads {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }
}

/// Live counters, updated with relaxed atomics
#[derive(Debug, Default)]
pub struct StoreStats {
    counts: [AtomicU64; StoreEvent::COUNT],
}

impl StoreStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, event: StoreEvent) {
        self.counts[event.slot()].fetch_add(1, Ordering::Relaxed);
    }

    /// Current count of one event
    pub fn count(&self, event: StoreEvent) -> u64 {
        self.counts[event.slot()].load(Ordering::Relaxed)
    }

    /// Copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.count(StoreEvent::Hit),
            reloads: self.count(StoreEvent::Reload),
            evictions: self.count(StoreEvent::Eviction),
            inserts: self.count(StoreEvent::Insert),
            undos: self.count(StoreEvent::Undo),
        }
    }

    /// Zero every counter, returning what they held
    pub fn reset(&self) -> StatsSnapshot {
        let [hits, reloads, evictions, inserts, undos] =
            std::array::from_fn(|i| self.counts[i].swap(0, Ordering::Relaxed));
        StatsSnapshot {
            hits,
            reloads,
            evictions,
            inserts,
            undos,
        }
    }
}
