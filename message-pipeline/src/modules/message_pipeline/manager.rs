use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::modules::message_pipeline::{
    commands::{MessagePipelineCommand, MessagePipelineCommand::*},
    context::MessagePipelineContext,
    store::{MessagePipelineStore, PipelineAction},
};

pub(crate) type SnapshotSender = watch::Sender<Arc<MessagePipelineContext>>;

/// Owns the store for its whole lifetime. Commands are applied one at a time
/// and the resulting snapshot is published before the caller is answered.
pub(crate) async fn message_pipeline_manager(
    rx: &mut mpsc::Receiver<MessagePipelineCommand>,
    mut store: MessagePipelineStore,
    snapshot_tx: SnapshotSender,
) {
    tracing::trace!("message_pipeline_manager start");

    while let Some(cmd) = rx.recv().await {
        tracing::trace!("command received: {:?}", cmd);
        match cmd {
            SetSubscriptions { id, payloads, resp } => {
                store.set_subscriptions(id, payloads);
                snapshot_tx.send_replace(store.public());
                let _ = resp.send(Ok(()));
            }
            SetPublishers { id, payloads, resp } => {
                store.set_publishers(id, payloads);
                snapshot_tx.send_replace(store.public());
                let _ = resp.send(Ok(()));
            }
            UpdatePlayerState { player_state, resp } => {
                store.dispatch(PipelineAction::UpdatePlayerState(player_state));
                snapshot_tx.send_replace(store.public());
                let _ = resp.send(Ok(()));
            }
            Reset { resp } => {
                store.reset();
                snapshot_tx.send_replace(store.public());
                let _ = resp.send(Ok(()));
            }
            #[cfg(test)]
            GetSubscriberIdsByTopic { resp } => {
                let _ = resp.send(Ok(store.subscriber_ids_by_topic().clone()));
            }
        }
    }

    tracing::trace!("message_pipeline_manager end");
}
