use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use pipeline_core::{
    error::PipelineError,
    message_pipeline_repository::MessagePipelineRepository,
    models::{
        player_state::PlayerState, publishers::AdvertiseOptions, subscriptions::SubscribePayload,
    },
};

use crate::modules::message_pipeline::commands::MessagePipelineCommand;

// Wrapper to encapsulate channel-related operations
#[derive(Clone)]
pub(crate) struct MessagePipelineWrapper {
    tx: mpsc::Sender<MessagePipelineCommand>,
}

impl MessagePipelineWrapper {
    pub fn new(tx: mpsc::Sender<MessagePipelineCommand>) -> Self {
        Self { tx }
    }

    async fn request<T>(
        &self,
        cmd: MessagePipelineCommand,
        resp_rx: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| PipelineError::StoreClosed)?;

        resp_rx.await.map_err(|_| PipelineError::StoreClosed)?
    }
}

#[async_trait]
impl MessagePipelineRepository for MessagePipelineWrapper {
    async fn set_subscriptions(&self, id: String, payloads: Vec<SubscribePayload>) -> Result<()> {
        let (resp_tx, resp_rx) = oneshot::channel::<Result<()>>();

        let cmd = MessagePipelineCommand::SetSubscriptions {
            id,
            payloads,
            resp: resp_tx,
        };
        self.request(cmd, resp_rx).await
    }

    async fn set_publishers(&self, id: String, payloads: Vec<AdvertiseOptions>) -> Result<()> {
        let (resp_tx, resp_rx) = oneshot::channel::<Result<()>>();

        let cmd = MessagePipelineCommand::SetPublishers {
            id,
            payloads,
            resp: resp_tx,
        };
        self.request(cmd, resp_rx).await
    }

    async fn update_player_state(&self, player_state: PlayerState) -> Result<()> {
        let (resp_tx, resp_rx) = oneshot::channel::<Result<()>>();

        let cmd = MessagePipelineCommand::UpdatePlayerState {
            player_state,
            resp: resp_tx,
        };
        self.request(cmd, resp_rx).await
    }

    async fn reset(&self) -> Result<()> {
        let (resp_tx, resp_rx) = oneshot::channel::<Result<()>>();

        let cmd = MessagePipelineCommand::Reset { resp: resp_tx };
        self.request(cmd, resp_rx).await
    }
}
