mod synthetic_player;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use clap::Parser;
use message_pipeline::{
    MessagePipeline, MessagePipelineConfig, WorkerIterableSource, init_logging,
};
use pipeline_core::{
    iterable_source::VecIterableSource,
    models::{message_event::MessageEvent, subscriptions::SubscribePayload, time::Time},
    player::Player,
};
use serde_json::json;

use crate::synthetic_player::SyntheticPlayer;

#[derive(Debug, Parser)]
struct Arg {
    #[arg(short = 'l', long = "log", help = "Log Level", default_value = "INFO")]
    log_level: String,
    #[arg(short = 't', long = "topics", help = "Number of synthetic topics", default_value_t = 3)]
    topics: usize,
    #[arg(short = 'n', long = "ticks", help = "Number of player ticks", default_value_t = 50)]
    ticks: usize,
    #[arg(short = 'f', long = "frame-ms", help = "Frame interval in milliseconds", default_value_t = 16)]
    frame_ms: u64,
}

fn synthetic_messages(topics: usize, ticks: usize) -> Vec<MessageEvent> {
    let mut messages = Vec::new();
    for tick in 0..ticks as u32 {
        for topic in 0..topics {
            let receive_time = Time::new(tick / 10, (tick % 10) * 100_000_000);
            messages.push(MessageEvent::new(
                format!("/synthetic/{topic}"),
                "std_msgs/Float64",
                receive_time,
                json!({ "data": tick as f64 * 0.1 }),
            ));
        }
    }
    messages
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Arg::parse();

    let mut config = MessagePipelineConfig::new();
    config.log_level = args.log_level.to_string();
    config.frame_interval = Duration::from_millis(args.frame_ms);
    config.pause_frame_timeout = Some(Duration::from_secs(1));
    init_logging(&config.log_level)?;

    let source = WorkerIterableSource::new(
        Box::new(VecIterableSource::new(synthetic_messages(args.topics, args.ticks))),
        config.worker_batch_size,
        config.command_buffer_size,
    );
    let player = Arc::new(SyntheticPlayer::new(source).await?);
    let pipeline = Arc::new(MessagePipeline::new(
        &config,
        Some(player.clone() as Arc<dyn Player>),
    ));

    let payloads = (0..args.topics)
        .map(|topic| SubscribePayload::new(format!("/synthetic/{topic}")))
        .collect();
    pipeline.set_subscriptions("panel", payloads).await?;

    // Consumer rendering every snapshot and pausing the frame while it does
    let mut snapshot_rx = pipeline.subscribe_context();
    let consumer_pipeline = pipeline.clone();
    let received = Arc::new(AtomicUsize::new(0));
    let consumer_received = received.clone();
    let consumer = tokio::spawn(async move {
        while snapshot_rx.changed().await.is_ok() {
            let context = snapshot_rx.borrow_and_update().clone();
            let Some(events) = context.message_events("panel") else {
                continue;
            };
            let resumer = consumer_pipeline.pause_frame("panel");
            let total = consumer_received.fetch_add(events.len(), Ordering::Relaxed) + events.len();
            tracing::debug!(count = events.len(), total, "panel rendered");
            resumer.resume();
        }
    });

    player.run(args.ticks, 0.1).await?;
    tracing::info!(metadata = ?pipeline.get_metadata(), "playback finished");

    consumer.abort();
    tracing::info!(received = received.load(Ordering::Relaxed), "consumer stopped");

    Ok(())
}
