//! Per-channel presence tracking.
//!
//! A user counts as present in a channel while at least one lease on their
//! `(channel, user)` key is outstanding. Leases are counted, so presence only
//! clears once every overlapping lease on the key has expired.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::trace;

/// Identifies a presence slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivityKey {
    pub channel_id: String,
    pub user_id: String,
}

impl ActivityKey {
    pub fn new(channel_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Concurrent lease counter.
///
/// It is designed to be trivially cloneable; clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct ActivityTracker {
    /// Outstanding leases per key. A key is only ever present with a count above zero.
    counts: Arc<DashMap<ActivityKey, usize>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` present for `duration`.
    ///
    /// Returns immediately; the lease is released by a background task.
    pub fn lease(&self, key: ActivityKey, duration: Duration) {
        if duration.is_zero() {
            return;
        }

        let deadline = Instant::now() + duration;
        self.acquire(&key);

        let tracker = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            tracker.release(&key);
        });
    }

    /// Whether `key` has any outstanding lease.
    pub fn is_present(&self, key: &ActivityKey) -> bool {
        self.counts.contains_key(key)
    }

    /// Number of outstanding leases on `key`.
    pub fn lease_count(&self, key: &ActivityKey) -> usize {
        self.counts.get(key).map(|c| *c).unwrap_or(0)
    }

    fn acquire(&self, key: &ActivityKey) {
        let mut count = self.counts.entry(key.clone()).or_insert(0);
        *count += 1;

        trace!("Leased {:?} ({} outstanding).", key, *count);
    }

    fn release(&self, key: &ActivityKey) {
        // Decrement and removal happen under the same shard lock.
        let removed = self.counts.remove_if_mut(key, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });

        if removed.is_some() {
            trace!("Released last lease on {:?}.", key);
        }
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use tokio::time::sleep;

    use super::*;

    fn key() -> ActivityKey {
        ActivityKey::new("C1", "U1")
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expires() {
        let tracker = ActivityTracker::new();

        tracker.lease(key(), Duration::from_secs(10));
        assert!(tracker.is_present(&key()));

        sleep(Duration::from_millis(9_900)).await;
        assert!(tracker.is_present(&key()));

        sleep(Duration::from_millis(200)).await;
        assert!(!tracker.is_present(&key()));
        assert_eq!(tracker.lease_count(&key()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_leases_compose_by_union() {
        let tracker = ActivityTracker::new();

        tracker.lease(key(), Duration::from_secs(10));
        sleep(Duration::from_secs(3)).await;
        tracker.lease(key(), Duration::from_secs(10));
        assert_eq!(tracker.lease_count(&key()), 2);

        // The first lease has expired, the second has not.
        sleep(Duration::from_millis(7_500)).await;
        assert!(tracker.is_present(&key()));
        assert_eq!(tracker.lease_count(&key()), 1);

        sleep(Duration::from_millis(2_000)).await;
        assert!(tracker.is_present(&key()));

        sleep(Duration::from_millis(1_000)).await;
        assert!(!tracker.is_present(&key()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_lease_inside_long_lease() {
        let tracker = ActivityTracker::new();

        tracker.lease(key(), Duration::from_secs(10));
        sleep(Duration::from_secs(1)).await;
        tracker.lease(key(), Duration::from_secs(2));

        sleep(Duration::from_secs(5)).await;
        assert!(tracker.is_present(&key()));

        sleep(Duration::from_secs(5)).await;
        assert!(!tracker.is_present(&key()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let tracker = ActivityTracker::new();
        let other_channel = ActivityKey::new("C2", "U1");
        let other_user = ActivityKey::new("C1", "U2");

        tracker.lease(key(), Duration::from_secs(10));

        assert!(tracker.is_present(&key()));
        assert!(!tracker.is_present(&other_channel));
        assert!(!tracker.is_present(&other_user));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_lease_is_noop() {
        let tracker = ActivityTracker::new();

        tracker.lease(key(), Duration::ZERO);

        assert!(!tracker.is_present(&key()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_concurrent_leases() {
        let tracker = ActivityTracker::new();

        for i in 1..=50 {
            tracker.lease(key(), Duration::from_millis(i * 100));
        }
        assert_eq!(tracker.lease_count(&key()), 50);

        sleep(Duration::from_millis(2_550)).await;
        assert_eq!(tracker.lease_count(&key()), 25);

        sleep(Duration::from_secs(3)).await;
        assert!(!tracker.is_present(&key()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_contending_leases_on_one_key() {
        let tracker = ActivityTracker::new();

        let workers = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    for i in 0..100u64 {
                        tracker.lease(key(), Duration::from_millis(50 + i % 7));
                        tracker.lease(ActivityKey::new("C1", "U2"), Duration::from_secs(60));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect::<Vec<_>>();

        for worker in workers {
            worker.await.unwrap();
        }

        assert_eq!(tracker.lease_count(&ActivityKey::new("C1", "U2")), 800);
        assert!(tracker.lease_count(&key()) <= 800);

        sleep(Duration::from_millis(500)).await;

        assert_eq!(tracker.lease_count(&key()), 0);
        assert!(!tracker.is_present(&key()));
        assert_eq!(tracker.counts.len(), 1);
    }

    #[test]
    fn test_never_leased_is_absent() {
        assert!(!ActivityTracker::new().is_present(&key()));
    }
}
