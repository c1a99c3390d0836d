use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;

use pipeline_core::{
    error::PipelineError,
    message_pipeline_repository::MessagePipelineRepository,
    models::player_state::PlayerState,
    player::PlayerStateListener,
};

use crate::modules::{frame_pacer::FramePacer, message_pipeline::wrapper::MessagePipelineWrapper};

// Clears the in-flight flag even when the tick future is dropped mid-frame
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Feeds player ticks into the store and holds the player back until the
/// frame has been rendered.
pub(crate) struct PipelineListener {
    repository: MessagePipelineWrapper,
    pacer: FramePacer,
    frame_interval: Duration,
    in_flight: AtomicBool,
}

impl PipelineListener {
    pub(crate) fn new(
        repository: MessagePipelineWrapper,
        pacer: FramePacer,
        frame_interval: Duration,
    ) -> Self {
        PipelineListener {
            repository,
            pacer,
            frame_interval,
            in_flight: AtomicBool::new(false),
        }
    }

    async fn render_frame(&self, player_state: PlayerState) -> Result<()> {
        self.repository.update_player_state(player_state).await?;

        // Consumers read the new snapshot and register pause tokens meanwhile
        if self.frame_interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.frame_interval).await;
        }

        self.pacer.wait_for_frame().await;
        Ok(())
    }
}

#[async_trait]
impl PlayerStateListener for PipelineListener {
    async fn on_player_state(&self, player_state: PlayerState) -> Result<()> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            let err = PipelineError::FrameInFlight;
            tracing::error!("{}", err);
            return Err(err.into());
        }

        let _guard = InFlightGuard(&self.in_flight);

        self.render_frame(player_state).await
    }
}
