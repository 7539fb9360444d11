use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use super::assemble::CompiledQuery;
use super::signature::MethodSignature;
use super::telemetry;
use crate::errors::DbError;
use crate::schema::EntitySchema;

// The same signature compiles differently against a changed schema.
type CacheKey = (MethodSignature, String);

/// Bounded LRU of compiled method signatures.
pub struct QueryCache {
    store: Mutex<LruCache<CacheKey, Arc<CompiledQuery>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

static GLOBAL: LazyLock<QueryCache> = LazyLock::new(|| QueryCache::new(QueryCache::DEFAULT_CAPACITY));

fn schema_fingerprint(schema: &EntitySchema) -> String {
    serde_json::to_string(schema).map_or_else(|_| schema.name.clone(), |s| telemetry::sha256_hex(&s))
}

impl QueryCache {
    /// Capacity of the process-wide cache.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            store: Mutex::new(LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Process-wide instance shared by repositories that do not bring their own.
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Return the cached compilation of `signature`, compiling it on a miss.
    ///
    /// Compilation runs outside the lock; two racing first calls both compile and
    /// the later insert wins. Failed compilations are not cached.
    ///
    /// # Errors
    /// Propagates the compile error.
    pub fn get_or_compile(&self, signature: &MethodSignature, schema: &EntitySchema) -> Result<Arc<CompiledQuery>, DbError> {
        let key = (signature.clone(), schema_fingerprint(schema));
        if let Some(hit) = self.store.lock().get(&key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            telemetry::record_cache_hit();
            return Ok(hit);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(CompiledQuery::compile(signature, schema)?);
        telemetry::record_compiled();
        self.store.lock().put(key, compiled.clone());
        Ok(compiled)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    pub fn clear(&self) {
        self.store.lock().clear();
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
