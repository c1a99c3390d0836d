use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use pipeline_core::{
    error::PipelineError,
    http_client_repository::{HttpClientRepository, HttpResponse},
};

#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        ReqwestHttpClient { client }
    }
}

#[async_trait]
impl HttpClientRepository for ReqwestHttpClient {
    async fn get(&self, url: String) -> Result<HttpResponse> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| PipelineError::Transport(err.to_string()))?;

        let status = response.status();
        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|err| PipelineError::Transport(err.to_string()))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            media_type,
            body,
        })
    }
}
