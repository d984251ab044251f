use parking_lot::RwLock;
use std::collections::HashMap;

use crate::types::Sample;

/// Most recent sample per `source_id:tag`.
///
/// A read optimization only: nothing here is durable and every upsert
/// overwrites unconditionally, so a late, older sample replaces a newer one.
#[derive(Default)]
pub struct LatestStateCache {
    entries: RwLock<HashMap<String, Sample>>,
}

impl LatestStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, sample: Sample) {
        let key = sample.key().cache_key();
        self.entries.write().insert(key, sample);
    }

    pub fn get(&self, source_id: &str, tag: &str) -> Option<Sample> {
        self.entries.read().get(&format!("{}:{}", source_id, tag)).cloned()
    }

    /// Copy of every entry, sorted by key.
    pub fn snapshot(&self) -> Vec<Sample> {
        let mut samples: Vec<Sample> = self.entries.read().values().cloned().collect();
        samples.sort_by(|a, b| (&a.source_id, &a.tag).cmp(&(&b.source_id, &b.tag)));
        samples
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
