//! ==============================================================================
//! history.rs - in-memory tick history
//! ==============================================================================
//!
//! purpose:
//!     append-only record of past ticks, trimmed from the old end so nothing
//!     older than 24h (relative to the newest entry) is kept. memory only -
//!     a restart starts with an empty history.
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const RETENTION_MS: i64 = 24 * 60 * 60 * 1000;

pub const DEFAULT_WINDOW_MINUTES: i64 = 30;
pub const MIN_WINDOW_MINUTES: i64 = 1;
pub const MAX_WINDOW_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub epoch_ms: i64,
    pub timestamp: String,
    pub temperature_c: Option<f64>,
    pub ph: Option<f64>,
    pub fan_running: bool,
}

#[derive(Debug)]
pub struct HistoryStore {
    entries: VecDeque<HistoryEntry>,
    retention_ms: i64,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::with_retention(RETENTION_MS)
    }
}

/// Clamp a requested window to what the store can answer.
pub fn clamp_window(minutes: i64) -> i64 {
    minutes.clamp(MIN_WINDOW_MINUTES, MAX_WINDOW_MINUTES)
}

impl HistoryStore {
    pub fn with_retention(retention_ms: i64) -> Self {
        Self { entries: VecDeque::new(), retention_ms }
    }

    pub fn append(&mut self, entry: HistoryEntry) {
        let cutoff = entry.epoch_ms - self.retention_ms;
        self.entries.push_back(entry);
        while self.entries.front().is_some_and(|oldest| oldest.epoch_ms < cutoff) {
            self.entries.pop_front();
        }
    }

    /// Entries from the last `minutes` (clamped to 1..=1440) before `now_ms`,
    /// oldest first.
    pub fn query_at(&self, minutes: i64, now_ms: i64) -> Vec<HistoryEntry> {
        let cutoff = now_ms - clamp_window(minutes) * 60_000;
        self.entries.iter().filter(|e| e.epoch_ms >= cutoff).cloned().collect()
    }

    pub fn query(&self, minutes: i64) -> Vec<HistoryEntry> {
        self.query_at(minutes, chrono::Utc::now().timestamp_millis())
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[allow(dead_code)]
    pub fn oldest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000;
    const T0: i64 = 1_760_000_000_000;

    fn entry(epoch_ms: i64) -> HistoryEntry {
        HistoryEntry {
            epoch_ms,
            timestamp: epoch_ms.to_string(),
            temperature_c: Some(25.0),
            ph: Some(7.0),
            fan_running: false,
        }
    }

    fn filled(step_minutes: i64, count: i64) -> HistoryStore {
        let mut store = HistoryStore::default();
        for i in 0..count {
            store.append(entry(T0 + i * step_minutes * MINUTE));
        }
        store
    }

    #[test]
    fn test_window_query() {
        let store = filled(1, 120);
        let now = T0 + 119 * MINUTE;

        let recent = store.query_at(30, now);
        assert_eq!(recent.len(), 31, "both ends of the window are included");
        assert!(recent.iter().all(|e| e.epoch_ms >= now - 30 * MINUTE));
        assert!(recent.windows(2).all(|w| w[0].epoch_ms < w[1].epoch_ms));
        assert_eq!(recent.last().unwrap().epoch_ms, now);
    }

    #[test]
    fn test_window_clamps() {
        let store = filled(1, 60 * 30);
        let now = T0 + (60 * 30 - 1) * MINUTE;

        assert_eq!(store.query_at(0, now), store.query_at(1, now));
        assert_eq!(store.query_at(-5, now), store.query_at(1, now));
        assert_eq!(store.query_at(999_999, now), store.query_at(1440, now));
        assert_eq!(clamp_window(45), 45);
    }

    #[test]
    fn test_retention_after_two_days() {
        // 48h of ticks every 7 minutes
        let store = filled(7, 48 * 60 / 7);
        let newest = T0 + (48 * 60 / 7 - 1) * 7 * MINUTE;
        let oldest = store.oldest().unwrap().epoch_ms;

        assert!(oldest >= newest - RETENTION_MS);
        assert!(oldest - 7 * MINUTE < newest - RETENTION_MS, "nothing younger was pruned");
        assert_eq!(store.len(), (24 * 60 / 7 + 1) as usize);
    }

    #[test]
    fn test_exactly_24h_old_is_kept() {
        let mut store = HistoryStore::default();
        store.append(entry(T0));
        store.append(entry(T0 + RETENTION_MS));
        assert_eq!(store.len(), 2);
        store.append(entry(T0 + RETENTION_MS + 1));
        assert_eq!(store.len(), 2);
        assert_eq!(store.oldest().unwrap().epoch_ms, T0 + RETENTION_MS);
    }

    #[test]
    fn test_empty_store() {
        let store = HistoryStore::default();
        assert!(store.is_empty());
        assert!(store.query(30).is_empty());
    }
}
