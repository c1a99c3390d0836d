use std::collections::VecDeque;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use pipeline_core::{
    error::PipelineError,
    iterable_source::{IteratorResult, MessageCursor, MessageIteratorArgs},
    models::time::Time,
};

use crate::modules::worker_iterable_source::commands::{CursorId, WorkerCommand};

// Budget for the batch fetched behind a single `next()`
const PREFETCH_DURATION_MS: u64 = 5;

/// Client half of a cursor living on the worker. Results are fetched in
/// batches and handed out from a local buffer.
pub struct WorkerMessageCursor {
    cursor_id: CursorId,
    tx: mpsc::Sender<WorkerCommand>,
    // Sent with the first request to open the remote cursor
    pending_args: Option<MessageIteratorArgs>,
    max_batch_size: usize,
    cancellation: CancellationToken,
    buffered: VecDeque<IteratorResult>,
    done: bool,
    released: bool,
}

impl WorkerMessageCursor {
    pub(crate) fn new(
        cursor_id: CursorId,
        tx: mpsc::Sender<WorkerCommand>,
        args: MessageIteratorArgs,
        max_batch_size: usize,
        cancellation: CancellationToken,
    ) -> Self {
        WorkerMessageCursor {
            cursor_id,
            tx,
            pending_args: Some(args),
            max_batch_size,
            cancellation,
            buffered: VecDeque::new(),
            done: false,
            released: false,
        }
    }

    async fn request<T>(
        &self,
        cmd: WorkerCommand,
        resp_rx: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| PipelineError::WorkerClosed)?;

        resp_rx.await.map_err(|_| PipelineError::WorkerClosed)?
    }

    async fn open(&mut self) -> Result<()> {
        let Some(args) = self.pending_args.take() else {
            return Ok(());
        };
        let (resp_tx, resp_rx) = oneshot::channel::<Result<()>>();

        let cmd = WorkerCommand::OpenCursor {
            cursor_id: self.cursor_id,
            args,
            resp: resp_tx,
        };
        self.request(cmd, resp_rx).await
    }

    async fn fetch_batch(&mut self, duration_ms: u64) -> Result<Option<Vec<IteratorResult>>> {
        if self.done {
            return Ok(None);
        }
        self.open().await?;
        let (resp_tx, resp_rx) = oneshot::channel::<Result<Option<Vec<IteratorResult>>>>();

        let cmd = WorkerCommand::NextBatch {
            cursor_id: self.cursor_id,
            duration_ms,
            max_batch_size: self.max_batch_size,
            cancellation: self.cancellation.clone(),
            resp: resp_tx,
        };
        let batch = self.request(cmd, resp_rx).await?;
        if batch.is_none() {
            self.mark_exhausted();
        }
        Ok(batch)
    }

    // The worker has already closed its half
    fn mark_exhausted(&mut self) {
        self.done = true;
        self.released = true;
    }

    fn take_buffered(&mut self) -> Option<Vec<IteratorResult>> {
        if self.buffered.is_empty() {
            return None;
        }
        Some(self.buffered.drain(..).collect())
    }
}

#[async_trait]
impl MessageCursor for WorkerMessageCursor {
    async fn next(&mut self) -> Result<Option<IteratorResult>> {
        if let Some(result) = self.buffered.pop_front() {
            return Ok(Some(result));
        }

        match self.fetch_batch(PREFETCH_DURATION_MS).await? {
            Some(batch) => {
                self.buffered.extend(batch);
                Ok(self.buffered.pop_front())
            }
            None => Ok(None),
        }
    }

    async fn next_batch(&mut self, duration_ms: u64) -> Result<Option<Vec<IteratorResult>>> {
        if let Some(buffered) = self.take_buffered() {
            return Ok(Some(buffered));
        }
        self.fetch_batch(duration_ms).await
    }

    async fn read_until(&mut self, end: Time) -> Result<Option<Vec<IteratorResult>>> {
        let mut results = Vec::new();
        while let Some(front) = self.buffered.front() {
            if front.time().is_some_and(|time| time > end) {
                return Ok(Some(results));
            }
            results.extend(self.buffered.pop_front());
        }

        if self.done {
            return Ok(if results.is_empty() { None } else { Some(results) });
        }
        self.open().await?;

        let (resp_tx, resp_rx) = oneshot::channel::<Result<Option<Vec<IteratorResult>>>>();
        let cmd = WorkerCommand::ReadUntil {
            cursor_id: self.cursor_id,
            end,
            cancellation: self.cancellation.clone(),
            resp: resp_tx,
        };
        match self.request(cmd, resp_rx).await? {
            Some(more) => {
                results.extend(more);
                Ok(Some(results))
            }
            None => {
                self.mark_exhausted();
                Ok(if results.is_empty() { None } else { Some(results) })
            }
        }
    }

    async fn end(&mut self) -> Result<()> {
        self.done = true;
        self.buffered.clear();
        let opened = self.pending_args.take().is_none();
        if !opened || self.released {
            self.released = true;
            return Ok(());
        }
        self.released = true;

        let (resp_tx, resp_rx) = oneshot::channel::<Result<()>>();
        let cmd = WorkerCommand::EndCursor {
            cursor_id: self.cursor_id,
            resp: resp_tx,
        };
        self.request(cmd, resp_rx).await
    }
}

impl Drop for WorkerMessageCursor {
    fn drop(&mut self) {
        if self.pending_args.is_some() || self.released {
            return;
        }
        // Best effort; the worker may already be gone
        let (resp_tx, _) = oneshot::channel::<Result<()>>();
        let _ = self.tx.try_send(WorkerCommand::EndCursor {
            cursor_id: self.cursor_id,
            resp: resp_tx,
        });
    }
}
