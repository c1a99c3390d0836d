use anyhow::Result;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use pipeline_core::{
    iterable_source::{
        GetBackfillMessagesArgs, Initialization, IteratorResult, MessageIteratorArgs,
    },
    models::{message_event::MessageEvent, time::Time},
};

pub(crate) type CursorId = u64;

#[derive(Debug)]
pub(crate) enum WorkerCommand {
    Initialize {
        resp: oneshot::Sender<Result<Initialization>>,
    },
    OpenCursor {
        cursor_id: CursorId,
        args: MessageIteratorArgs,
        resp: oneshot::Sender<Result<()>>,
    },
    // `Ok(None)` is the end-of-stream sentinel
    NextBatch {
        cursor_id: CursorId,
        duration_ms: u64,
        max_batch_size: usize,
        cancellation: CancellationToken,
        resp: oneshot::Sender<Result<Option<Vec<IteratorResult>>>>,
    },
    ReadUntil {
        cursor_id: CursorId,
        end: Time,
        cancellation: CancellationToken,
        resp: oneshot::Sender<Result<Option<Vec<IteratorResult>>>>,
    },
    EndCursor {
        cursor_id: CursorId,
        resp: oneshot::Sender<Result<()>>,
    },
    GetBackfillMessages {
        args: GetBackfillMessagesArgs,
        cancellation: CancellationToken,
        resp: oneshot::Sender<Result<Vec<MessageEvent>>>,
    },
    #[cfg(test)]
    GetOpenCursorCount {
        resp: oneshot::Sender<Result<usize>>,
    },
}
