//! Keyed, single-writer memoization of test outcomes.
//!
//! One entry per `(test, tuple)` key for the lifetime of a job. Concurrent
//! callers of [`TupleCache::get_or_compute`] for the same key block until
//! the first producer finishes, then observe the same outcome; failures are
//! cached as outcomes too, so a retried work item never re-hits the
//! provider within the job.

use bdq_protocol::{hash_parts, Outcome};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// Cache key: the test's GUID-preferred identity plus a stable hash of the
/// normalized tuple values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleKey {
    pub test: String,
    pub tuple_hash: String,
}

impl TupleKey {
    pub fn new(test: &str, tuple: &[String]) -> Self {
        let parts: Vec<&str> = tuple.iter().map(String::as_str).collect();
        Self {
            test: test.to_string(),
            tuple_hash: hash_parts(&parts),
        }
    }
}

/// Job-scoped outcome cache. No eviction; the entry count is bounded by the
/// number of distinct tuples per test.
#[derive(Default)]
pub struct TupleCache {
    entries: Mutex<HashMap<TupleKey, Arc<OnceCell<Outcome>>>>,
    computed: AtomicUsize,
}

impl TupleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached outcome for `key`, computing it via `compute` when
    /// absent. `compute` runs at most once per key per job; concurrent
    /// callers wait on the first producer.
    pub async fn get_or_compute<F, Fut>(&self, key: TupleKey, compute: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let cell = {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            entries.entry(key).or_default().clone()
        };
        // The compute future runs outside the map lock; OnceCell serializes
        // initializers so the counter tracks provider-facing computations.
        cell.get_or_init(|| async {
            self.computed.fetch_add(1, Ordering::SeqCst);
            compute().await
        })
        .await
        .clone()
    }

    /// Finalized outcome for a key, if any.
    pub fn get(&self, key: &TupleKey) -> Option<Outcome> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(key).and_then(|cell| cell.get().cloned())
    }

    /// All finalized entries.
    pub fn snapshot(&self) -> Vec<(TupleKey, Outcome)> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries
            .iter()
            .filter_map(|(key, cell)| cell.get().map(|outcome| (key.clone(), outcome.clone())))
            .collect()
    }

    /// How many compute closures actually ran.
    pub fn computed(&self) -> usize {
        self.computed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(test: &str, values: &[&str]) -> TupleKey {
        let tuple: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        TupleKey::new(test, &tuple)
    }

    #[test]
    fn keys_are_stable_and_length_delimited() {
        assert_eq!(key("t", &["ab", "c"]), key("t", &["ab", "c"]));
        assert_ne!(key("t", &["ab", "c"]), key("t", &["a", "bc"]));
        assert_ne!(key("t", &["US"]), key("u", &["US"]));
        // case is not folded
        assert_ne!(key("t", &["US"]), key("t", &["us"]));
    }

    #[tokio::test]
    async fn compute_runs_once_per_key() {
        let cache = Arc::new(TupleCache::new());
        let key = key("VALIDATION_X", &["US"]);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(key, || async {
                        // widen the race window
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Outcome::compliant("ok")
                    })
                    .await
            }));
        }
        for handle in handles {
            let outcome = handle.await.unwrap();
            assert_eq!(outcome, Outcome::compliant("ok"));
        }
        assert_eq!(cache.computed(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn failures_are_cached_as_outcomes() {
        let cache = TupleCache::new();
        let key = key("VALIDATION_X", &["XX"]);
        let first = cache
            .get_or_compute(key.clone(), || async {
                Outcome::internal_prerequisites_not_met("provider unreachable")
            })
            .await;
        let second = cache
            .get_or_compute(key.clone(), || async { Outcome::compliant("never runs") })
            .await;
        assert_eq!(first, second);
        assert_eq!(cache.computed(), 1);
    }

    #[tokio::test]
    async fn snapshot_returns_finalized_entries() {
        let cache = TupleCache::new();
        cache
            .get_or_compute(key("A", &["1"]), || async { Outcome::compliant("") })
            .await;
        cache
            .get_or_compute(key("B", &["2"]), || async { Outcome::not_compliant("") })
            .await;
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 2);
    }
}
