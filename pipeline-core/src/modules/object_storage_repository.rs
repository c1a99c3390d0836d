use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use mockall::automock;

use crate::models::asset::SecurityToken;

#[automock]
#[async_trait]
pub trait ObjectStorageRepository: Send + Sync + 'static {
    async fn get_object(&self, token: SecurityToken, bucket: String, key: String) -> Result<Bytes>;
}
