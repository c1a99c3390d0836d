use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

mod modules;
pub use modules::{
    asset_fetcher::{
        AssetFetcher, cache::TtlAssetCache, http_client::ReqwestHttpClient,
        object_storage::HttpObjectStorage,
    },
    config::MessagePipelineConfig,
    frame_pacer::{FramePacer, FrameResumer},
    logging::init_logging,
    message_pipeline::{
        context::{MessagePipelineContext, PlaybackControls},
        store::{MessagePipelineStore, PipelineAction},
    },
    worker_iterable_source::{WorkerIterableSource, cursor::WorkerMessageCursor},
};
pub use pipeline_core::{constants, error::PipelineError};
use pipeline_core::{
    message_pipeline_repository::MessagePipelineRepository,
    models::{
        asset::{Asset, FetchAssetOptions},
        publishers::{AdvertiseOptions, PublishPayload},
        subscriptions::SubscribePayload,
    },
    player::{Player, PlayerMetadata},
};

use modules::message_pipeline::{
    commands::MessagePipelineCommand, listener::PipelineListener,
    manager::message_pipeline_manager, wrapper::MessagePipelineWrapper,
};

/// Mediates between one player and any number of consumers. Consumers
/// register subscriptions and publishers by id and read the latest
/// [`MessagePipelineContext`] every frame.
pub struct MessagePipeline {
    player: Option<Arc<dyn Player>>,
    repository: MessagePipelineWrapper,
    snapshot_rx: watch::Receiver<Arc<MessagePipelineContext>>,
    pacer: FramePacer,
    asset_fetcher: AssetFetcher,
}

impl MessagePipeline {
    /// Must be called from within a tokio runtime.
    pub fn new(config: &MessagePipelineConfig, player: Option<Arc<dyn Player>>) -> Self {
        Self::with_asset_fetcher(config, player, AssetFetcher::from_config(config))
    }

    pub fn with_asset_fetcher(
        config: &MessagePipelineConfig,
        player: Option<Arc<dyn Player>>,
        asset_fetcher: AssetFetcher,
    ) -> Self {
        let store = MessagePipelineStore::new(player.clone());
        let (snapshot_tx, snapshot_rx) = watch::channel(store.public());

        // Spawn store management thread
        let (tx, mut rx) = mpsc::channel::<MessagePipelineCommand>(config.command_buffer_size);
        tokio::spawn(
            async move { message_pipeline_manager(&mut rx, store, snapshot_tx).await }
                .instrument(tracing::info_span!("Message Pipeline Manager")),
        );

        let repository = MessagePipelineWrapper::new(tx);
        let pacer = FramePacer::new(config.pause_frame_timeout);

        if let Some(player) = &player {
            let listener =
                PipelineListener::new(repository.clone(), pacer.clone(), config.frame_interval);
            player.set_listener(Arc::new(listener));
            tracing::info!("player bound to message pipeline");
        }

        MessagePipeline {
            player,
            repository,
            snapshot_rx,
            pacer,
            asset_fetcher,
        }
    }

    /// Latest published snapshot.
    pub fn context(&self) -> Arc<MessagePipelineContext> {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified whenever a new snapshot is published.
    pub fn subscribe_context(&self) -> watch::Receiver<Arc<MessagePipelineContext>> {
        self.snapshot_rx.clone()
    }

    pub async fn set_subscriptions(
        &self,
        id: impl Into<String>,
        payloads: Vec<SubscribePayload>,
    ) -> Result<()> {
        self.repository.set_subscriptions(id.into(), payloads).await
    }

    pub async fn set_publishers(
        &self,
        id: impl Into<String>,
        payloads: Vec<AdvertiseOptions>,
    ) -> Result<()> {
        self.repository.set_publishers(id.into(), payloads).await
    }

    pub fn set_parameter(&self, key: impl Into<String>, value: serde_json::Value) {
        match &self.player {
            Some(player) => player.set_parameter(key.into(), value),
            None => tracing::debug!("set_parameter ignored without a player"),
        }
    }

    pub fn publish(&self, payload: PublishPayload) {
        match &self.player {
            Some(player) => player.publish(payload),
            None => tracing::debug!(topic = %payload.topic, "publish ignored without a player"),
        }
    }

    pub async fn call_service(
        &self,
        service: impl Into<String>,
        request: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let Some(player) = &self.player else {
            let err = PipelineError::NoPlayer("call_service");
            tracing::error!("{}", err);
            return Err(err.into());
        };
        player.call_service(service.into(), request).await
    }

    pub async fn fetch_asset(&self, uri: &str, options: FetchAssetOptions) -> Result<Asset> {
        let capabilities = self.context().player_state.capabilities.clone();
        self.asset_fetcher
            .fetch_asset(uri, options, self.player.as_ref(), &capabilities)
            .await
    }

    /// Holds the next player tick until the returned resumer is resumed or
    /// dropped.
    pub fn pause_frame(&self, name: impl Into<String>) -> FrameResumer {
        self.pacer.pause_frame(name)
    }

    pub fn close(&self) {
        if let Some(player) = &self.player {
            player.close();
        }
    }

    pub fn re_open(&self) {
        if let Some(player) = &self.player {
            player.re_open();
        }
    }

    /// Clears subscriptions, publishers and cached messages. The player stays
    /// bound.
    pub async fn reset(&self) -> Result<()> {
        self.repository.reset().await
    }

    pub fn get_metadata(&self) -> Vec<PlayerMetadata> {
        match &self.player {
            Some(player) => player.get_metadata(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod success {
    use std::sync::{Arc, Mutex};

    use pipeline_core::{
        constants::player_capabilities::PLAYBACK_CONTROL,
        models::{
            message_event::MessageEvent,
            player_state::{PlayerState, PlayerStateActiveData},
            publishers::PublishPayload,
            subscriptions::SubscribePayload,
            time::Time,
        },
        player::{MockPlayer, Player, PlayerStateListener},
    };
    use serde_json::json;

    use crate::{MessagePipeline, MessagePipelineConfig};

    type ListenerSlot = Arc<Mutex<Option<Arc<dyn PlayerStateListener>>>>;

    fn config() -> MessagePipelineConfig {
        let mut config = MessagePipelineConfig::new();
        config.frame_interval = std::time::Duration::ZERO;
        config
    }

    fn capture_listener(player: &mut MockPlayer) -> ListenerSlot {
        let slot: ListenerSlot = Arc::new(Mutex::new(None));
        let captured = slot.clone();
        player
            .expect_set_listener()
            .times(1)
            .returning(move |listener| *captured.lock().unwrap() = Some(listener));
        slot
    }

    #[tokio::test]
    async fn ticks_are_delivered_to_subscribers() {
        let mut player = MockPlayer::new();
        let slot = capture_listener(&mut player);
        player.expect_set_subscriptions().times(1).return_const(());
        let player: Arc<dyn Player> = Arc::new(player);
        let pipeline = MessagePipeline::new(&config(), Some(player));

        pipeline
            .set_subscriptions("panelA", vec![SubscribePayload::new("/imu")])
            .await
            .unwrap();

        let event = MessageEvent::new("/imu", "sensor_msgs/Imu", Time::new(1, 0), json!({}));
        let state = PlayerState {
            capabilities: Arc::new(vec![PLAYBACK_CONTROL.to_string()]),
            active_data: Some(PlayerStateActiveData {
                messages: Arc::new(vec![event.clone()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let listener = slot.lock().unwrap().clone().unwrap();
        listener.on_player_state(state).await.unwrap();

        let context = pipeline.context();
        assert_eq!(
            context.message_events("panelA").map(|b| b.as_ref().clone()),
            Some(vec![event])
        );
        assert!(context.playback.start_playback.is_some());
    }

    #[tokio::test]
    async fn pass_through_to_player() {
        let mut player = MockPlayer::new();
        let _slot = capture_listener(&mut player);
        player
            .expect_set_parameter()
            .withf(|key, value| key == "/rate" && *value == json!(10))
            .times(1)
            .return_const(());
        player
            .expect_publish()
            .withf(|payload| payload.topic == "/cmd")
            .times(1)
            .return_const(());
        player
            .expect_call_service()
            .times(1)
            .returning(|_, request| Ok(json!({ "echo": request })));
        player.expect_close().times(1).return_const(());
        player.expect_re_open().times(1).return_const(());
        player.expect_get_metadata().times(1).returning(Vec::new);
        let player: Arc<dyn Player> = Arc::new(player);
        let pipeline = MessagePipeline::new(&config(), Some(player));

        pipeline.set_parameter("/rate", json!(10));
        pipeline.publish(PublishPayload {
            topic: "/cmd".to_string(),
            msg: json!({ "data": 1 }),
        });
        let response = pipeline.call_service("/reset", json!(1)).await.unwrap();
        pipeline.close();
        pipeline.re_open();

        assert_eq!(response, json!({ "echo": 1 }));
        assert!(pipeline.get_metadata().is_empty());
    }

    #[tokio::test]
    async fn reset_clears_subscriptions() {
        let pipeline = MessagePipeline::new(&config(), None);
        pipeline
            .set_subscriptions("panelA", vec![SubscribePayload::new("/imu")])
            .await
            .unwrap();
        assert_eq!(pipeline.context().subscriptions.len(), 1);

        pipeline.reset().await.unwrap();

        assert!(pipeline.context().subscriptions.is_empty());
    }
}

#[cfg(test)]
mod failure {
    use serde_json::json;

    use crate::{MessagePipeline, MessagePipelineConfig, PipelineError};

    #[tokio::test]
    async fn call_service_without_player() {
        let pipeline = MessagePipeline::new(&MessagePipelineConfig::new(), None);

        let err = pipeline.call_service("/reset", json!({})).await.unwrap_err();

        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::NoPlayer("call_service"))
        );
        assert_eq!(err.to_string(), "call_service can only be used when a player is present");
    }
}
