//! Per-user probe rate limiting.
//!
//! Every suspicious input counts as a probe. A user who accumulates
//! [`PROBE_THRESHOLD`] probes inside the trailing [`PROBE_WINDOW_SECS`]
//! window is blocked for [`PROBE_BLOCK_DURATION_SECS`]; while blocked, every
//! input is rejected regardless of content.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::warn;

pub const PROBE_WINDOW_SECS: u64 = 600;
pub const PROBE_THRESHOLD: usize = 5;
pub const PROBE_BLOCK_DURATION_SECS: u64 = 1800;

#[derive(Debug, Default)]
struct ProbeRecord {
    /// Epoch seconds of suspicious inputs inside the trailing window.
    hits: Vec<u64>,
    blocked_until: Option<u64>,
}

/// Tracks suspicious-input counts per user id.
#[derive(Debug, Default)]
pub struct ProbeTracker {
    records: Mutex<HashMap<String, ProbeRecord>>,
}

impl ProbeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `user_id` is currently blocked.
    pub fn is_blocked(&self, user_id: &str) -> bool {
        self.is_blocked_at(user_id, epoch_secs())
    }

    /// Record a suspicious input. Returns `true` when this probe tripped the
    /// threshold and the user is now blocked.
    pub fn record_probe(&self, user_id: &str) -> bool {
        self.record_probe_at(user_id, epoch_secs())
    }

    fn is_blocked_at(&self, user_id: &str, now: u64) -> bool {
        let mut records = self.records.lock().unwrap();
        let Some(record) = records.get_mut(user_id) else {
            return false;
        };
        match record.blocked_until {
            Some(until) if until > now => true,
            Some(_) => {
                // The block elapsed — the slate is clean.
                record.blocked_until = None;
                record.hits.clear();
                false
            }
            None => false,
        }
    }

    fn record_probe_at(&self, user_id: &str, now: u64) -> bool {
        let mut records = self.records.lock().unwrap();
        let record = records.entry(user_id.to_string()).or_default();

        record.hits.push(now);
        record
            .hits
            .retain(|&t| t + PROBE_WINDOW_SECS > now);

        if record.hits.len() >= PROBE_THRESHOLD {
            record.blocked_until = Some(now + PROBE_BLOCK_DURATION_SECS);
            warn!(user_id, hits = record.hits.len(), "user blocked for repeated probes");
            true
        } else {
            false
        }
    }
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_threshold_is_not_blocked() {
        let tracker = ProbeTracker::new();
        for _ in 0..PROBE_THRESHOLD - 1 {
            assert!(!tracker.record_probe_at("u", 1000));
        }
        assert!(!tracker.is_blocked_at("u", 1000));
    }

    #[test]
    fn threshold_inside_window_blocks() {
        let tracker = ProbeTracker::new();
        for i in 0..PROBE_THRESHOLD - 1 {
            tracker.record_probe_at("u", 1000 + i as u64);
        }
        assert!(tracker.record_probe_at("u", 1010));
        assert!(tracker.is_blocked_at("u", 1011));
        // Blocked until the duration passes.
        assert!(tracker.is_blocked_at("u", 1010 + PROBE_BLOCK_DURATION_SECS - 1));
        assert!(!tracker.is_blocked_at("u", 1010 + PROBE_BLOCK_DURATION_SECS + 1));
    }

    #[test]
    fn probes_outside_window_do_not_count() {
        let tracker = ProbeTracker::new();
        // Spread the probes farther apart than the window.
        for i in 0..PROBE_THRESHOLD * 2 {
            let t = 1000 + (i as u64) * (PROBE_WINDOW_SECS + 1);
            assert!(!tracker.record_probe_at("u", t));
        }
        assert!(!tracker.is_blocked_at("u", 99_999));
    }

    #[test]
    fn users_are_tracked_independently() {
        let tracker = ProbeTracker::new();
        for _ in 0..PROBE_THRESHOLD {
            tracker.record_probe_at("mallory", 1000);
        }
        assert!(tracker.is_blocked_at("mallory", 1001));
        assert!(!tracker.is_blocked_at("alice", 1001));
    }
}
