//! Time-expiring caches over the aggregate ontology views.
//!
//! Each view is a single-entry `moka` cache keyed by `()`. A miss recomputes
//! synchronously and repopulates. Reads racing an invalidation may still
//! return the value computed before it, but never store it: a generation
//! counter bumped by `invalidate_all` makes such a recompute skip the insert,
//! so the next read after `invalidate_all` returns observes the write.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::sync::Cache;

use super::client::ClientApiOntology;
use super::{Concept, OntologyProperty, Relationship};

/// Default time-to-live for every view.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60 * 60);

/// The four cached views.
pub struct CacheManager {
    concepts: Cache<(), Arc<Vec<Concept>>>,
    properties: Cache<(), Arc<Vec<OntologyProperty>>>,
    relationships: Cache<(), Arc<Vec<Relationship>>>,
    client: Cache<(), Arc<ClientApiOntology>>,
    generation: AtomicU64,
    ttl: Duration,
}

fn build<V: Clone + Send + Sync + 'static>(ttl: Duration) -> Cache<(), V> {
    Cache::builder().max_capacity(1).time_to_live(ttl).build()
}

/// Return the cached value or compute, store and return a fresh one.
///
/// The value is only stored if no invalidation happened while computing.
fn get_or_compute<V, E, F>(
    cache: &Cache<(), Arc<V>>,
    generation: &AtomicU64,
    view: &'static str,
    compute: F,
) -> Result<Arc<V>, E>
where
    V: Send + Sync + 'static,
    F: FnOnce() -> Result<V, E>,
{
    if let Some(hit) = cache.get(&()) {
        return Ok(hit);
    }
    let started_generation = generation.load(Ordering::Acquire);
    let started = Instant::now();
    let value = Arc::new(compute()?);
    if generation.load(Ordering::Acquire) == started_generation {
        cache.insert((), Arc::clone(&value));
        // An invalidation between the check and the insert must still win.
        if generation.load(Ordering::Acquire) != started_generation {
            cache.invalidate(&());
        }
    } else {
        tracing::debug!(view, "ontology view invalidated during recompute, not cached");
    }
    tracing::debug!(view, elapsed_ms = started.elapsed().as_millis() as u64, "recomputed ontology view");
    Ok(value)
}

impl CacheManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            concepts: build(ttl),
            properties: build(ttl),
            relationships: build(ttl),
            client: build(ttl),
            generation: AtomicU64::new(0),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn concepts<E>(
        &self,
        compute: impl FnOnce() -> Result<Vec<Concept>, E>,
    ) -> Result<Arc<Vec<Concept>>, E> {
        get_or_compute(&self.concepts, &self.generation, "concepts", compute)
    }

    pub fn properties<E>(
        &self,
        compute: impl FnOnce() -> Result<Vec<OntologyProperty>, E>,
    ) -> Result<Arc<Vec<OntologyProperty>>, E> {
        get_or_compute(&self.properties, &self.generation, "properties", compute)
    }

    pub fn relationships<E>(
        &self,
        compute: impl FnOnce() -> Result<Vec<Relationship>, E>,
    ) -> Result<Arc<Vec<Relationship>>, E> {
        get_or_compute(&self.relationships, &self.generation, "relationships", compute)
    }

    pub fn client<E>(
        &self,
        compute: impl FnOnce() -> Result<ClientApiOntology, E>,
    ) -> Result<Arc<ClientApiOntology>, E> {
        get_or_compute(&self.client, &self.generation, "client", compute)
    }

    /// Drop every cached view immediately.
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.concepts.invalidate_all();
        self.properties.invalidate_all();
        self.relationships.invalidate_all();
        self.client.invalidate_all();
        tracing::trace!("ontology caches invalidated");
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager").field("ttl", &self.ttl).finish()
    }
}
