use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use ttl_cache::TtlCache;
use url::Url;

use pipeline_core::{
    asset_cache_repository::AssetCacheRepository,
    constants::{PACKAGE_SCHEME, S3_SCHEME},
};

/// In-memory asset cache. Entries expire after `ttl` and the oldest are
/// evicted beyond `capacity`.
#[derive(Clone)]
pub struct TtlAssetCache {
    entries: Arc<Mutex<TtlCache<String, Bytes>>>,
    ttl: Duration,
}

impl TtlAssetCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        TtlAssetCache {
            entries: Arc::new(Mutex::new(TtlCache::new(capacity))),
            ttl,
        }
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, TtlCache<String, Bytes>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AssetCacheRepository for TtlAssetCache {
    async fn get(&self, uri: String) -> Result<Option<Bytes>> {
        Ok(self.lock_entries().get(&uri).cloned())
    }

    async fn set(&self, uri: String, data: Bytes) -> Result<()> {
        self.lock_entries().insert(uri, data, self.ttl);
        Ok(())
    }

    // Plain web URLs are left to the HTTP layer's own caching
    fn check_uri_needs_cache(&self, uri: &str) -> bool {
        match Url::parse(uri) {
            Ok(url) => url.scheme() == S3_SCHEME || url.scheme() == PACKAGE_SCHEME,
            Err(_) => false,
        }
    }
}
