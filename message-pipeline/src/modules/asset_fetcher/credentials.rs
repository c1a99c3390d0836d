use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{sync::Mutex, time::Instant};

use pipeline_core::{
    models::asset::SecurityToken, security_token_repository::SecurityTokenRepository,
};

struct CachedCredential {
    project: String,
    token: SecurityToken,
    expires_at: Instant,
}

/// Issues object storage credentials, reusing the last one while it belongs to
/// the same project and has not expired.
pub struct CredentialProvider {
    repository: Arc<dyn SecurityTokenRepository>,
    expire_duration: Duration,
    cached: Mutex<Option<CachedCredential>>,
}

impl CredentialProvider {
    pub fn new(repository: Arc<dyn SecurityTokenRepository>, expire_duration: Duration) -> Self {
        CredentialProvider {
            repository,
            expire_duration,
            cached: Mutex::new(None),
        }
    }

    pub async fn get(&self, project: &str) -> Result<SecurityToken> {
        // Held across the request so concurrent fetches share one credential
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref() {
            if credential.project == project && Instant::now() < credential.expires_at {
                return Ok(credential.token.clone());
            }
        }

        tracing::debug!(project, "requesting security token");
        let token = self
            .repository
            .generate_security_token(project.to_string(), self.expire_duration)
            .await?;
        *cached = Some(CachedCredential {
            project: project.to_string(),
            token: token.clone(),
            expires_at: Instant::now() + self.expire_duration,
        });

        Ok(token)
    }
}
