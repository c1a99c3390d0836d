use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::AUTHORIZATION;

use pipeline_core::{
    error::PipelineError, models::asset::SecurityToken,
    object_storage_repository::ObjectStorageRepository,
};

/// Reads objects from an HTTP object storage gateway at
/// `{endpoint}/{bucket}/{key}`, authorized by the session token.
#[derive(Clone, Default)]
pub struct HttpObjectStorage {
    client: reqwest::Client,
}

impl HttpObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn object_url(endpoint: &str, bucket: &str, key: &str) -> String {
    format!(
        "{}/{}/{}",
        endpoint.trim_end_matches('/'),
        bucket,
        key.trim_start_matches('/')
    )
}

#[async_trait]
impl ObjectStorageRepository for HttpObjectStorage {
    async fn get_object(&self, token: SecurityToken, bucket: String, key: String) -> Result<Bytes> {
        let url = object_url(&token.endpoint, &bucket, &key);

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", token.session_token))
            .header("x-access-key-id", &token.access_key_id)
            .send()
            .await
            .map_err(|err| PipelineError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::HttpStatus {
                uri: url,
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
            }
            .into());
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| PipelineError::Transport(err.to_string()))?;
        Ok(body)
    }
}
