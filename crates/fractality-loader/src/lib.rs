//! Async graph loading with a byte-budgeted cache.
//!
//! Concurrent loads of the same source share one in-flight future; once it
//! resolves, every waiter gets the same `Arc<Graph>` (or the same error).

mod cache;
mod source;

pub use source::Source;

use cache::GraphCache;
use fractality_core::{FractalityError, LoadingConfig, Result};
use fractality_graph::{Graph, TestDataGenerator, TestPattern, from_json_slice, from_json_value};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

type Shared = Arc<OnceCell<Result<Arc<Graph>>>>;

/// Post-load filters. Applied to a copy; cached graphs are never altered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Drop nodes deeper than this.
    pub max_depth: Option<u32>,
    /// Keep only the first `n` nodes in breadth-first order from the roots.
    pub limit: Option<usize>,
}

impl LoadOptions {
    pub fn is_empty(&self) -> bool {
        self.max_depth.is_none() && self.limit.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoaderStats {
    pub generator_runs: u64,
    pub fetches: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cached_entries: usize,
    pub cached_bytes: usize,
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    generator_runs: AtomicU64,
    fetches: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

struct Inner {
    config: LoadingConfig,
    seed: Option<u64>,
    client: reqwest::Client,
    cache: Mutex<GraphCache>,
    in_flight: Mutex<HashMap<String, Shared>>,
    counters: Counters,
    started: Instant,
}

/// Cheap to clone; clones share cache and in-flight table.
#[derive(Clone)]
pub struct DataLoader {
    inner: Arc<Inner>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new(LoadingConfig::default())
    }
}

impl DataLoader {
    pub fn new(config: LoadingConfig) -> Self {
        Self::with_seed(config, None)
    }

    /// `seed` overrides the generator's default seed for synthetic patterns.
    pub fn with_seed(config: LoadingConfig, seed: Option<u64>) -> Self {
        let cache = GraphCache::new(config.max_cache_size);
        Self {
            inner: Arc::new(Inner {
                config,
                seed,
                client: reqwest::Client::new(),
                cache: Mutex::new(cache),
                in_flight: Mutex::new(HashMap::new()),
                counters: Counters::default(),
                started: Instant::now(),
            }),
        }
    }

    pub fn config(&self) -> &LoadingConfig {
        &self.inner.config
    }

    fn now(&self) -> Duration {
        self.inner.started.elapsed()
    }

    /// Parses `descriptor` with [`Source::parse`] and loads it.
    pub async fn load_descriptor(
        &self,
        descriptor: &str,
        options: LoadOptions,
    ) -> Result<Arc<Graph>> {
        let source = Source::parse(descriptor)?;
        self.load(source, options).await
    }

    pub async fn load(&self, source: Source, options: LoadOptions) -> Result<Arc<Graph>> {
        let graph = self.load_shared(source).await?;
        if options.is_empty() {
            return Ok(graph);
        }
        let filtered = graph.retain_bfs(options.limit, options.max_depth)?;
        tracing::debug!(
            "Filtered graph from {} to {} nodes",
            graph.len(),
            filtered.len()
        );
        Ok(Arc::new(filtered))
    }

    async fn load_shared(&self, source: Source) -> Result<Arc<Graph>> {
        let key = source.key();
        let counters = &self.inner.counters;

        if let Some(graph) = self.cached(&key) {
            return Ok(graph);
        }

        // A finished load publishes to the cache before leaving `in_flight`,
        // so a second look under the `in_flight` lock cannot miss both.
        let cell: Shared = {
            let mut in_flight = self.inner.in_flight.lock();
            if !in_flight.contains_key(&key)
                && let Some(graph) = self.cached(&key)
            {
                return Ok(graph);
            }
            Arc::clone(in_flight.entry(key.clone()).or_default())
        };
        counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        let result = cell
            .get_or_init(|| async {
                let started = Instant::now();
                let result = self.fetch_with_deadline(&source).await;
                match &result {
                    Ok(graph) => {
                        tracing::info!(
                            "Loaded '{}' ({} nodes) in {:?}",
                            key,
                            graph.len(),
                            started.elapsed()
                        );
                        if self.inner.config.cache_enabled {
                            self.inner
                                .cache
                                .lock()
                                .insert(&key, Arc::clone(graph), self.now());
                        }
                    }
                    Err(err) => tracing::warn!("Loading '{}' failed: {}", key, err),
                }
                result
            })
            .await
            .clone();

        let mut in_flight = self.inner.in_flight.lock();
        if in_flight.get(&key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
            in_flight.remove(&key);
        }
        result
    }

    fn cached(&self, key: &str) -> Option<Arc<Graph>> {
        if !self.inner.config.cache_enabled {
            return None;
        }
        let graph = self.inner.cache.lock().get(key, self.now())?;
        self.inner.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Cache hit for '{}'", key);
        Some(graph)
    }

    async fn fetch_with_deadline(&self, source: &Source) -> Result<Arc<Graph>> {
        let deadline = Duration::from_millis(self.inner.config.timeout_ms);
        match tokio::time::timeout(deadline, self.fetch(source)).await {
            Ok(result) => result.map(Arc::new),
            Err(_) => Err(FractalityError::NetworkFailure(format!(
                "loading '{}' timed out after {} ms",
                source.key(),
                deadline.as_millis()
            ))),
        }
    }

    async fn fetch(&self, source: &Source) -> Result<Graph> {
        match source {
            Source::Pattern(pattern) => self.generate(*pattern).await,
            Source::Url(url) => {
                self.inner.counters.fetches.fetch_add(1, Ordering::Relaxed);
                self.fetch_url(url).await
            }
            Source::File(path) => {
                self.inner.counters.fetches.fetch_add(1, Ordering::Relaxed);
                read_file(path).await
            }
            Source::Inline(value) => from_json_value(value.clone()),
        }
    }

    async fn generate(&self, pattern: TestPattern) -> Result<Graph> {
        self.inner
            .counters
            .generator_runs
            .fetch_add(1, Ordering::Relaxed);
        let seed = self.inner.seed;
        tokio::task::spawn_blocking(move || {
            let mut generator = match seed {
                Some(seed) => TestDataGenerator::new(seed),
                None => TestDataGenerator::default(),
            };
            generator.generate(pattern)
        })
        .await
        .map_err(|e| {
            FractalityError::SourceInvalid(format!("generator for '{pattern}' failed: {e}"))
        })?
    }

    async fn fetch_url(&self, url: &str) -> Result<Graph> {
        let response = self
            .inner
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(network_error)?;
        let body = response.bytes().await.map_err(network_error)?;
        from_json_slice(&body)
    }

    pub fn stats(&self) -> LoaderStats {
        let counters = &self.inner.counters;
        let cache = self.inner.cache.lock();
        LoaderStats {
            generator_runs: counters.generator_runs.load(Ordering::Relaxed),
            fetches: counters.fetches.load(Ordering::Relaxed),
            cache_hits: counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: counters.cache_misses.load(Ordering::Relaxed),
            cached_entries: cache.len(),
            cached_bytes: cache.bytes(),
            evictions: cache.evictions(),
        }
    }

    /// Drops the cached graph for `source`. Returns whether one was cached.
    pub fn invalidate(&self, source: &Source) -> bool {
        self.inner.cache.lock().remove(&source.key())
    }

    pub fn clear(&self) {
        self.inner.cache.lock().clear();
    }
}

fn network_error(err: reqwest::Error) -> FractalityError {
    FractalityError::NetworkFailure(err.to_string())
}

async fn read_file(path: &Path) -> Result<Graph> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        FractalityError::SourceInvalid(format!("cannot read {}: {e}", path.display()))
    })?;
    from_json_slice(&bytes)
}
