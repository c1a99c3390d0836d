use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::models::asset::SecurityToken;

#[automock]
#[async_trait]
pub trait SecurityTokenRepository: Send + Sync + 'static {
    async fn generate_security_token(
        &self,
        project: String,
        expire_duration: Duration,
    ) -> Result<SecurityToken>;
}
