use std::{
    collections::HashMap,
    future::Future,
    time::{Duration, Instant},
};

use anyhow::{Result, anyhow};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pipeline_core::{
    error::PipelineError,
    iterable_source::{IterableSource, IteratorResult, MessageCursor},
};

use crate::modules::worker_iterable_source::commands::{
    CursorId, WorkerCommand, WorkerCommand::*,
};

async fn read_batch(
    cursor: &mut dyn MessageCursor,
    duration_ms: u64,
    max_batch_size: usize,
) -> Result<Option<Vec<IteratorResult>>> {
    let deadline = Instant::now() + Duration::from_millis(duration_ms);
    let Some(first) = cursor.next().await? else {
        return Ok(None);
    };

    let mut results = vec![first];
    while results.len() < max_batch_size && Instant::now() < deadline {
        match cursor.next().await? {
            Some(result) => results.push(result),
            None => break,
        }
    }
    Ok(Some(results))
}

// An exhausted cursor is closed on the worker side right away
async fn close_if_exhausted(
    cursors: &mut HashMap<CursorId, Box<dyn MessageCursor>>,
    cursor_id: CursorId,
    result: &Result<Option<Vec<IteratorResult>>>,
) {
    if !matches!(result, Ok(None)) {
        return;
    }
    if let Some(mut cursor) = cursors.remove(&cursor_id) {
        if let Err(err) = cursor.end().await {
            tracing::warn!(cursor_id, "failed to end exhausted cursor: {:?}", err);
        }
        tracing::debug!(cursor_id, "cursor reached end of stream");
    }
}

async fn abortable<T>(
    cancellation: &CancellationToken,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(PipelineError::Cancelled.into()),
        result = future => result,
    }
}

/// Owns an [`IterableSource`] and its open cursors. Requests are served one
/// at a time in arrival order.
pub(crate) async fn iterable_source_worker(
    rx: &mut mpsc::Receiver<WorkerCommand>,
    mut source: Box<dyn IterableSource>,
) {
    tracing::trace!("iterable_source_worker start");
    // {
    //   "${cursor_id}" : Box<dyn MessageCursor>,
    // }
    let mut cursors: HashMap<CursorId, Box<dyn MessageCursor>> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        tracing::trace!("command received: {:?}", cmd);
        match cmd {
            Initialize { resp } => {
                let _ = resp.send(source.initialize().await);
            }
            OpenCursor {
                cursor_id,
                args,
                resp,
            } => match source.message_iterator(args) {
                Ok(cursor) => {
                    cursors.insert(cursor_id, cursor);
                    let _ = resp.send(Ok(()));
                }
                Err(err) => {
                    tracing::error!(cursor_id, "message_iterator: err: {:?}", err);
                    let _ = resp.send(Err(err));
                }
            },
            NextBatch {
                cursor_id,
                duration_ms,
                max_batch_size,
                cancellation,
                resp,
            } => {
                let Some(cursor) = cursors.get_mut(&cursor_id) else {
                    let _ = resp.send(Err(anyhow!("cursor {} is not open", cursor_id)));
                    continue;
                };
                let result = abortable(
                    &cancellation,
                    read_batch(cursor.as_mut(), duration_ms, max_batch_size),
                )
                .await;
                close_if_exhausted(&mut cursors, cursor_id, &result).await;
                let _ = resp.send(result);
            }
            ReadUntil {
                cursor_id,
                end,
                cancellation,
                resp,
            } => {
                let Some(cursor) = cursors.get_mut(&cursor_id) else {
                    let _ = resp.send(Err(anyhow!("cursor {} is not open", cursor_id)));
                    continue;
                };
                let result = abortable(&cancellation, cursor.read_until(end)).await;
                close_if_exhausted(&mut cursors, cursor_id, &result).await;
                let _ = resp.send(result);
            }
            EndCursor { cursor_id, resp } => {
                let result = match cursors.remove(&cursor_id) {
                    Some(mut cursor) => cursor.end().await,
                    None => Ok(()),
                };
                let _ = resp.send(result);
            }
            GetBackfillMessages {
                args,
                cancellation,
                resp,
            } => {
                let result = abortable(&cancellation, source.get_backfill_messages(args)).await;
                let _ = resp.send(result);
            }
            #[cfg(test)]
            GetOpenCursorCount { resp } => {
                let _ = resp.send(Ok(cursors.len()));
            }
        }
    }

    tracing::trace!("iterable_source_worker end");
}
