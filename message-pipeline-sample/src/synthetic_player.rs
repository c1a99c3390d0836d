use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use pipeline_core::{
    constants::player_capabilities::{PLAYBACK_CONTROL, SET_SPEED},
    iterable_source::{IterableSource, IteratorResult, MessageCursor, MessageIteratorArgs},
    models::{
        asset::Asset,
        message_event::MessageEvent,
        player_state::{PlayerPresence, PlayerState, PlayerStateActiveData, Topic},
        publishers::{AdvertiseOptions, PublishPayload},
        subscriptions::SubscribePayload,
        time::Time,
    },
    player::{Player, PlayerMetadata, PlayerStateListener},
};

/// Plays back an iterable source tick by tick, waiting for the pipeline to
/// finish each frame before emitting the next.
pub struct SyntheticPlayer {
    listener: Mutex<Option<Arc<dyn PlayerStateListener>>>,
    subscriptions: Mutex<Arc<Vec<SubscribePayload>>>,
    cursor: AsyncMutex<Option<Box<dyn MessageCursor>>>,
    is_playing: AtomicBool,
    topics: Arc<Vec<Topic>>,
    start: Time,
    end: Time,
}

impl SyntheticPlayer {
    pub async fn new(mut source: impl IterableSource) -> Result<Self> {
        let initialization = source.initialize().await?;
        let args = MessageIteratorArgs {
            topics: initialization.topics.iter().map(|t| t.name.clone()).collect(),
            start: Some(initialization.start),
            end: None,
        };
        let cursor = source.message_iterator(args)?;

        Ok(SyntheticPlayer {
            listener: Mutex::new(None),
            subscriptions: Mutex::new(Arc::new(Vec::new())),
            cursor: AsyncMutex::new(Some(cursor)),
            is_playing: AtomicBool::new(true),
            topics: Arc::new(initialization.topics),
            start: initialization.start,
            end: initialization.end,
        })
    }

    fn listener(&self) -> Option<Arc<dyn PlayerStateListener>> {
        self.listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn subscribed(&self, topic: &str) -> bool {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .any(|s| s.topic == topic)
    }

    /// Emits up to `ticks` states, each covering `tick_seconds` of log time.
    pub async fn run(&self, ticks: usize, tick_seconds: f64) -> Result<()> {
        let Some(listener) = self.listener() else {
            bail!("no listener registered");
        };

        let mut current_time = self.start;
        for tick in 0..ticks {
            current_time = current_time.add_seconds(tick_seconds);

            let results = {
                let mut cursor = self.cursor.lock().await;
                match cursor.as_mut() {
                    Some(cursor) => cursor.read_until(current_time).await?,
                    None => None,
                }
            };
            let Some(results) = results else {
                tracing::info!(tick, "end of source reached");
                break;
            };

            let messages: Vec<MessageEvent> = results
                .into_iter()
                .filter_map(|result| match result {
                    IteratorResult::MessageEvent(event) => Some(event),
                    _ => None,
                })
                .filter(|event| self.subscribed(&event.topic))
                .collect();
            tracing::debug!(tick, count = messages.len(), "emitting player state");

            listener.on_player_state(self.player_state(messages, current_time)).await?;
        }

        Ok(())
    }

    fn player_state(&self, messages: Vec<MessageEvent>, current_time: Time) -> PlayerState {
        PlayerState {
            presence: PlayerPresence::Present,
            capabilities: Arc::new(vec![PLAYBACK_CONTROL.to_string(), SET_SPEED.to_string()]),
            player_id: "synthetic".to_string(),
            name: Some("Synthetic player".to_string()),
            active_data: Some(PlayerStateActiveData {
                messages: Arc::new(messages),
                start_time: self.start,
                end_time: self.end,
                current_time,
                is_playing: self.is_playing.load(Ordering::Acquire),
                topics: self.topics.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Player for SyntheticPlayer {
    fn set_listener(&self, listener: Arc<dyn PlayerStateListener>) {
        *self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(listener);
    }

    fn close(&self) {
        self.is_playing.store(false, Ordering::Release);
    }

    fn re_open(&self) {
        self.is_playing.store(true, Ordering::Release);
    }

    fn set_subscriptions(&self, subscriptions: Arc<Vec<SubscribePayload>>) {
        tracing::info!(count = subscriptions.len(), "player subscriptions updated");
        *self
            .subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = subscriptions;
    }

    fn set_publishers(&self, publishers: Vec<AdvertiseOptions>) {
        tracing::info!(count = publishers.len(), "player publishers updated");
    }

    fn set_parameter(&self, key: String, value: serde_json::Value) {
        tracing::info!(%key, %value, "parameter set");
    }

    fn publish(&self, payload: PublishPayload) {
        tracing::info!(topic = %payload.topic, "message published");
    }

    async fn call_service(
        &self,
        service: String,
        request: serde_json::Value,
    ) -> Result<serde_json::Value> {
        Ok(json!({ "service": service, "request": request }))
    }

    fn start_playback(&self) {
        self.is_playing.store(true, Ordering::Release);
    }

    fn pause_playback(&self) {
        self.is_playing.store(false, Ordering::Release);
    }

    fn seek_playback(&self, time: Time) {
        tracing::info!(?time, "seek is not supported by the synthetic player");
    }

    fn set_playback_speed(&self, speed: f64) {
        tracing::info!(speed, "playback speed set");
    }

    fn play_until(&self, time: Time) {
        tracing::info!(?time, "play until");
    }

    fn enable_repeat_playback(&self, enable: bool) {
        tracing::info!(enable, "repeat playback");
    }

    async fn fetch_asset(
        &self,
        uri: String,
        _cancellation: Option<CancellationToken>,
    ) -> Result<Asset> {
        bail!("synthetic player has no asset {}", uri)
    }

    fn get_metadata(&self) -> Vec<PlayerMetadata> {
        vec![PlayerMetadata {
            name: "synthetic".to_string(),
            metadata: serde_json::Map::new(),
        }]
    }
}
