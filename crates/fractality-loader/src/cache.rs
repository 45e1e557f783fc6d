use fractality_graph::Graph;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct CacheEntry {
    graph: Arc<Graph>,
    bytes: usize,
    hits: u64,
    last_access: Duration,
}

impl CacheEntry {
    /// Frequently hit, recently used entries score high.
    fn score(&self, now: Duration) -> f64 {
        let age = now.saturating_sub(self.last_access).as_secs_f64();
        (self.hits as f64 + 1.0) / (1.0 + age)
    }
}

/// Byte-budgeted graph cache. Lowest-scoring entries are evicted first; a
/// graph larger than the whole budget is never stored.
#[derive(Debug)]
pub(crate) struct GraphCache {
    entries: HashMap<String, CacheEntry>,
    bytes: usize,
    budget: usize,
    evictions: u64,
}

impl GraphCache {
    pub(crate) fn new(budget: usize) -> Self {
        Self {
            entries: HashMap::new(),
            bytes: 0,
            budget,
            evictions: 0,
        }
    }

    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn evictions(&self) -> u64 {
        self.evictions
    }

    pub(crate) fn get(&mut self, key: &str, now: Duration) -> Option<Arc<Graph>> {
        let entry = self.entries.get_mut(key)?;
        entry.hits += 1;
        entry.last_access = now;
        Some(Arc::clone(&entry.graph))
    }

    /// Stores `graph` under `key`, evicting as needed. Returns `false` if the
    /// graph does not fit the budget at all.
    pub(crate) fn insert(&mut self, key: &str, graph: Arc<Graph>, now: Duration) -> bool {
        let bytes = graph.memory_footprint();
        if bytes > self.budget {
            tracing::debug!(
                "Not caching '{}': {} bytes exceed budget of {}",
                key,
                bytes,
                self.budget
            );
            return false;
        }
        self.remove(key);

        while self.bytes + bytes > self.budget {
            let Some(victim) = self
                .entries
                .iter()
                .min_by(|(ka, a), (kb, b)| {
                    a.score(now)
                        .total_cmp(&b.score(now))
                        .then_with(|| ka.cmp(kb))
                })
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            tracing::debug!("Evicting '{}' from graph cache", victim);
            self.remove(&victim);
            self.evictions += 1;
        }

        self.bytes += bytes;
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                graph,
                bytes,
                hits: 0,
                last_access: now,
            },
        );
        true
    }

    pub(crate) fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.bytes -= entry.bytes;
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }
}
