use cellscope_kernel::Store;
use std::sync::Arc;

use crate::query_cache::QueryCache;

/// Shared per-process services, injected into every handler.
///
/// The store and cache are constructed once at startup and live for the
/// process lifetime; cloning the state is an `Arc` bump.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    store: Store,
    cache: QueryCache,
    source_tag: String,
}

impl AppState {
    pub fn new(store: Store, cache: QueryCache, source_tag: String) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                cache,
                source_tag,
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    pub fn source_tag(&self) -> &str {
        &self.inner.source_tag
    }
}
