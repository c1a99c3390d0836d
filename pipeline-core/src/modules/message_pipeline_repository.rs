use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    player_state::PlayerState, publishers::AdvertiseOptions, subscriptions::SubscribePayload,
};

/// Mutations accepted by the pipeline store. Implementations serialize them
/// through a single writer.
#[async_trait]
pub trait MessagePipelineRepository: Send + Sync {
    async fn set_subscriptions(&self, id: String, payloads: Vec<SubscribePayload>) -> Result<()>;
    async fn set_publishers(&self, id: String, payloads: Vec<AdvertiseOptions>) -> Result<()>;
    async fn update_player_state(&self, player_state: PlayerState) -> Result<()>;
    async fn reset(&self) -> Result<()>;
}
