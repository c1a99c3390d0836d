use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use mockall::automock;

// Content-addressable local asset storage keyed by full URI
#[automock]
#[async_trait]
pub trait AssetCacheRepository: Send + Sync + 'static {
    async fn get(&self, uri: String) -> Result<Option<Bytes>>;
    async fn set(&self, uri: String, data: Bytes) -> Result<()>;
    fn check_uri_needs_cache(&self, uri: &str) -> bool;
}
