use anyhow::Result;
use tokio::sync::oneshot;

use pipeline_core::models::{
    player_state::PlayerState, publishers::AdvertiseOptions, subscriptions::SubscribePayload,
};

#[cfg(test)]
use std::collections::HashMap;

#[derive(Debug)]
pub(crate) enum MessagePipelineCommand {
    SetSubscriptions {
        id: String,
        payloads: Vec<SubscribePayload>,
        resp: oneshot::Sender<Result<()>>,
    },
    SetPublishers {
        id: String,
        payloads: Vec<AdvertiseOptions>,
        resp: oneshot::Sender<Result<()>>,
    },
    UpdatePlayerState {
        player_state: PlayerState,
        resp: oneshot::Sender<Result<()>>,
    },
    Reset {
        resp: oneshot::Sender<Result<()>>,
    },
    #[cfg(test)]
    GetSubscriberIdsByTopic {
        resp: oneshot::Sender<Result<HashMap<String, Vec<String>>>>,
    },
}
