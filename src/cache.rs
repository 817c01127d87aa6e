//! Scrape-synchronized sample cache.
//!
//! Samples are grouped into buckets keyed by `(node id, encoding path)`.
//! Every new envelope for a source replaces the source's bucket wholesale:
//! a counter whose last observation is seconds old must not keep being
//! reported at a stale value, or the time-series store shows flat lines for
//! a device that went silent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Identity of one stream of samples: the device's self-reported node id
/// plus the YANG encoding path it streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub node_id: String,
    pub path: String,
}

impl SourceKey {
    pub fn new(node_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Gauge,
    Counter,
}

/// Process-global metric descriptor. Declared as `static` items next to the
/// decoder that emits them.
#[derive(Debug)]
pub struct Descriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub desc: &'static Descriptor,
    pub kind: SampleKind,
    pub value: f64,
    pub labels: Vec<String>,
    /// Producer timestamp from the envelope, milliseconds.
    pub timestamp_ms: i64,
}

/// Mutable sample list for one source. The inner lock guards list mutation
/// only; decoders hold it just long enough to push.
#[derive(Debug, Default)]
pub struct Bucket {
    samples: Mutex<Vec<Sample>>,
}

impl Bucket {
    pub fn record(
        &self,
        desc: &'static Descriptor,
        kind: SampleKind,
        value: f64,
        labels: Vec<String>,
        timestamp_ms: i64,
    ) {
        debug_assert_eq!(desc.labels.len(), labels.len(), "label arity mismatch for {}", desc.name);
        let sample = Sample {
            desc,
            kind,
            value,
            labels,
            timestamp_ms,
        };
        self.samples.lock().expect("bucket lock poisoned").push(sample);
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.samples.lock().expect("bucket lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().expect("bucket lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The outer map from source to bucket. The outer lock is held only for
/// pointer-level operations so scrapes never block ingestion for longer
/// than a single bucket copy.
#[derive(Debug, Default)]
pub struct SampleCache {
    buckets: Mutex<HashMap<SourceKey, Arc<Bucket>>>,
}

impl SampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replaces any prior bucket for `key` with a fresh empty one
    /// and returns it. The old bucket is discarded before the new one
    /// becomes visible, so a scrape sees either of them in full, never a
    /// torn mix.
    pub fn install(&self, key: SourceKey) -> Arc<Bucket> {
        let bucket = Arc::new(Bucket::default());
        self.buckets
            .lock()
            .expect("cache lock poisoned")
            .insert(key, Arc::clone(&bucket));
        bucket
    }

    /// Drops the bucket for `key`. Called when the owning stream ends.
    pub fn remove(&self, key: &SourceKey) {
        self.buckets.lock().expect("cache lock poisoned").remove(key);
    }

    /// Copies the bucket pointers under the outer lock, then reads each
    /// bucket under its own lock. Returns a flat sample list.
    pub fn snapshot(&self) -> Vec<Sample> {
        let buckets: Vec<Arc<Bucket>> = self
            .buckets
            .lock()
            .expect("cache lock poisoned")
            .values()
            .cloned()
            .collect();

        buckets.iter().flat_map(|b| b.samples()).collect()
    }

    pub fn contains(&self, key: &SourceKey) -> bool {
        self.buckets
            .lock()
            .expect("cache lock poisoned")
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_DESC: Descriptor = Descriptor {
        name: "test_metric",
        help: "test metric",
        labels: &["node"],
    };

    fn sample(value: f64) -> Sample {
        Sample {
            desc: &TEST_DESC,
            kind: SampleKind::Gauge,
            value,
            labels: vec!["10.0.0.1".to_string()],
            timestamp_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn install_replaces_prior_bucket() {
        let cache = SampleCache::new();
        let key = SourceKey::new("10.0.0.1", "path");

        let first = cache.install(key.clone());
        first.record(&TEST_DESC, SampleKind::Gauge, 1.0, vec!["10.0.0.1".into()], 1);
        assert_eq!(cache.snapshot().len(), 1);

        // A new message for the same source key starts from an empty bucket.
        let second = cache.install(key.clone());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.snapshot().len(), 0);

        second.record(&TEST_DESC, SampleKind::Gauge, 2.0, vec!["10.0.0.1".into()], 2);
        let snap = cache.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].value, 2.0);

        // Writes through the replaced bucket are invisible to scrapes.
        first.record(&TEST_DESC, SampleKind::Gauge, 9.0, vec!["10.0.0.1".into()], 3);
        assert_eq!(cache.snapshot().len(), 1);
    }

    #[test]
    fn distinct_paths_get_distinct_buckets() {
        let cache = SampleCache::new();
        cache.install(SourceKey::new("10.0.0.1", "path-a"));
        cache.install(SourceKey::new("10.0.0.1", "path-b"));
        cache.install(SourceKey::new("10.0.0.2", "path-a"));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn remove_drops_bucket() {
        let cache = SampleCache::new();
        let key = SourceKey::new("10.0.0.1", "path");
        let bucket = cache.install(key.clone());
        bucket.record(&TEST_DESC, SampleKind::Gauge, 1.0, vec!["10.0.0.1".into()], 1);

        cache.remove(&key);
        assert!(!cache.contains(&key));
        assert!(cache.snapshot().is_empty());
    }

    #[test]
    fn snapshot_is_a_copy() {
        let cache = SampleCache::new();
        let key = SourceKey::new("10.0.0.1", "path");
        let bucket = cache.install(key);
        bucket.record(&TEST_DESC, SampleKind::Gauge, 1.0, vec!["10.0.0.1".into()], 1);

        let snap = cache.snapshot();
        bucket.record(&TEST_DESC, SampleKind::Gauge, 2.0, vec!["10.0.0.1".into()], 2);
        assert_eq!(snap.len(), 1);
        assert_eq!(cache.snapshot().len(), 2);
    }

    #[test]
    fn samples_keep_producer_timestamps() {
        let cache = SampleCache::new();
        let bucket = cache.install(SourceKey::new("10.0.0.1", "path"));
        let s = sample(7.0);
        bucket.record(s.desc, s.kind, s.value, s.labels.clone(), s.timestamp_ms);
        assert_eq!(cache.snapshot()[0].timestamp_ms, 1_700_000_000_000);
    }
}
