use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use tokio_util::sync::CancellationToken;

use crate::models::{
    asset::Asset,
    player_state::PlayerState,
    publishers::{AdvertiseOptions, PublishPayload},
    subscriptions::SubscribePayload,
    time::Time,
};

/// Receives every state a player emits. The returned future resolves once the
/// pipeline is ready for the next tick; players must not emit again before it
/// does.
#[automock]
#[async_trait]
pub trait PlayerStateListener: Send + Sync + 'static {
    async fn on_player_state(&self, player_state: PlayerState) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerMetadata {
    pub name: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A data source driving the pipeline. Playback methods are only reachable
/// through the pipeline when the matching capability is advertised.
#[automock]
#[async_trait]
pub trait Player: Send + Sync + 'static {
    fn set_listener(&self, listener: Arc<dyn PlayerStateListener>);
    fn close(&self);
    fn re_open(&self);
    fn set_subscriptions(&self, subscriptions: Arc<Vec<SubscribePayload>>);
    fn set_publishers(&self, publishers: Vec<AdvertiseOptions>);
    fn set_parameter(&self, key: String, value: serde_json::Value);
    fn publish(&self, payload: PublishPayload);
    async fn call_service(
        &self,
        service: String,
        request: serde_json::Value,
    ) -> Result<serde_json::Value>;
    fn start_playback(&self);
    fn pause_playback(&self);
    fn seek_playback(&self, time: Time);
    fn set_playback_speed(&self, speed: f64);
    fn play_until(&self, time: Time);
    fn enable_repeat_playback(&self, enable: bool);
    async fn fetch_asset(
        &self,
        uri: String,
        cancellation: Option<CancellationToken>,
    ) -> Result<Asset>;
    fn get_metadata(&self) -> Vec<PlayerMetadata>;
}
