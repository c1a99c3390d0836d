pub(crate) mod commands;
pub mod cursor;
pub(crate) mod worker;

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use pipeline_core::{
    error::PipelineError,
    iterable_source::{
        GetBackfillMessagesArgs, Initialization, IterableSource, MessageCursor,
        MessageIteratorArgs,
    },
    models::message_event::MessageEvent,
};

use crate::modules::worker_iterable_source::{
    commands::WorkerCommand, cursor::WorkerMessageCursor, worker::iterable_source_worker,
};

/// Runs an [`IterableSource`] on its own task so decoding never blocks the
/// caller. Cancelling the source token aborts every in-flight request.
pub struct WorkerIterableSource {
    tx: mpsc::Sender<WorkerCommand>,
    batch_size: usize,
    next_cursor_id: AtomicU64,
    cancellation: CancellationToken,
}

impl WorkerIterableSource {
    pub fn new(
        source: Box<dyn IterableSource>,
        batch_size: usize,
        command_buffer_size: usize,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<WorkerCommand>(command_buffer_size);
        tokio::spawn(
            async move { iterable_source_worker(&mut rx, source).await }
                .instrument(tracing::info_span!("Iterable Source Worker")),
        );

        WorkerIterableSource {
            tx,
            batch_size: batch_size.max(1),
            next_cursor_id: AtomicU64::new(0),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Opens a cursor whose reads abort once `cancellation` is cancelled. The
    /// source token does not apply to it.
    pub fn message_iterator_with_cancellation(
        &self,
        args: MessageIteratorArgs,
        cancellation: &CancellationToken,
    ) -> WorkerMessageCursor {
        let cursor_id = self.next_cursor_id.fetch_add(1, Ordering::Relaxed);

        WorkerMessageCursor::new(
            cursor_id,
            self.tx.clone(),
            args,
            self.batch_size,
            cancellation.child_token(),
        )
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
}

#[async_trait]
impl IterableSource for WorkerIterableSource {
    async fn initialize(&mut self) -> Result<Initialization> {
        let (resp_tx, resp_rx) = oneshot::channel::<Result<Initialization>>();

        let cmd = WorkerCommand::Initialize { resp: resp_tx };
        self.request(cmd, resp_rx).await
    }

    fn message_iterator(&self, args: MessageIteratorArgs) -> Result<Box<dyn MessageCursor>> {
        let cursor_id = self.next_cursor_id.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(WorkerMessageCursor::new(
            cursor_id,
            self.tx.clone(),
            args,
            self.batch_size,
            self.cancellation.child_token(),
        )))
    }

    async fn get_backfill_messages(
        &self,
        args: GetBackfillMessagesArgs,
    ) -> Result<Vec<MessageEvent>> {
        let (resp_tx, resp_rx) = oneshot::channel::<Result<Vec<MessageEvent>>>();

        let cmd = WorkerCommand::GetBackfillMessages {
            args,
            cancellation: self.cancellation.child_token(),
            resp: resp_tx,
        };
        self.request(cmd, resp_rx).await
    }
}


#[cfg(test)]
mod success {
    use std::time::Duration;

    use pipeline_core::{
        iterable_source::{
            GetBackfillMessagesArgs, IterableSource, IteratorResult, MessageCursor,
            MessageIteratorArgs, VecIterableSource,
        },
        models::{message_event::MessageEvent, time::Time},
    };
    use serde_json::json;

    use crate::modules::worker_iterable_source::{WorkerIterableSource, test_helper_fn};

    fn message(topic: &str, sec: u32) -> MessageEvent {
        MessageEvent::new(topic, "std_msgs/Int32", Time::new(sec, 0), json!({ "data": sec }))
    }

    fn worker_source(batch_size: usize) -> WorkerIterableSource {
        let messages = (1..=10)
            .map(|sec| message(if sec % 2 == 0 { "/odom" } else { "/imu" }, sec))
            .collect();
        WorkerIterableSource::new(Box::new(VecIterableSource::new(messages)), batch_size, 16)
    }

    fn all_topics() -> MessageIteratorArgs {
        MessageIteratorArgs {
            topics: vec!["/imu".to_string(), "/odom".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn initialize() {
        let mut source = worker_source(4);

        let initialization = source.initialize().await.unwrap();

        assert_eq!(initialization.start, Time::new(1, 0));
        assert_eq!(initialization.end, Time::new(10, 0));
        assert_eq!(initialization.topics.len(), 2);
    }

    #[tokio::test]
    async fn batches_respect_batch_size_and_end_of_stream() {
        let source = worker_source(4);
        let mut cursor = source.message_iterator(all_topics()).unwrap();

        let mut sizes = vec![];
        while let Some(batch) = cursor.next_batch(1000).await.unwrap() {
            sizes.push(batch.len());
        }

        assert_eq!(sizes, vec![4, 4, 2]);
        assert!(cursor.next_batch(1000).await.unwrap().is_none());
        assert!(cursor.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn next_reads_in_order() {
        let source = worker_source(3);
        let args = MessageIteratorArgs {
            topics: vec!["/imu".to_string()],
            start: Some(Time::new(4, 0)),
            end: None,
        };
        let mut cursor = source.message_iterator(args).unwrap();

        let mut seconds = vec![];
        while let Some(IteratorResult::MessageEvent(event)) = cursor.next().await.unwrap() {
            seconds.push(event.receive_time.sec);
        }

        assert_eq!(seconds, vec![5, 7, 9]);
    }

    #[tokio::test]
    async fn read_until_uses_buffered_results_first() {
        let source = worker_source(4);
        let mut cursor = source.message_iterator(all_topics()).unwrap();

        // Prefetches a batch of four into the local buffer
        let first = cursor.next().await.unwrap();
        assert_eq!(first.and_then(|r| r.time()), Some(Time::new(1, 0)));

        let until_two = cursor.read_until(Time::new(2, 0)).await.unwrap().unwrap();
        assert_eq!(until_two.len(), 1);
        let until_six = cursor.read_until(Time::new(6, 0)).await.unwrap().unwrap();
        let seconds: Vec<u32> = until_six.iter().filter_map(|r| r.time()).map(|t| t.sec).collect();
        assert_eq!(seconds, vec![3, 4, 5, 6]);
        let rest = cursor.read_until(Time::new(100, 0)).await.unwrap().unwrap();
        assert_eq!(rest.len(), 4);
        assert!(cursor.read_until(Time::new(200, 0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn backfill() {
        let source = worker_source(4);
        let args = GetBackfillMessagesArgs {
            topics: vec!["/imu".to_string(), "/odom".to_string()],
            time: Time::new(6, 500_000_000),
        };

        let backfill = source.get_backfill_messages(args).await.unwrap();

        let seconds: Vec<u32> = backfill.iter().map(|e| e.receive_time.sec).collect();
        assert_eq!(seconds, vec![5, 6]);
    }

    #[tokio::test]
    async fn end_releases_remote_cursor() {
        let source = worker_source(4);
        let mut cursor = source.message_iterator(all_topics()).unwrap();
        let _ = cursor.next().await.unwrap();
        assert_eq!(test_helper_fn::get_open_cursor_count(&source).await, 1);

        cursor.end().await.unwrap();

        assert_eq!(test_helper_fn::get_open_cursor_count(&source).await, 0);
        assert!(cursor.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exhausted_cursor_is_closed() {
        let source = worker_source(4);
        let mut cursor = source.message_iterator(all_topics()).unwrap();

        while cursor.next_batch(1000).await.unwrap().is_some() {}
        assert_eq!(test_helper_fn::get_open_cursor_count(&source).await, 0);

        let mut until_cursor = source.message_iterator(all_topics()).unwrap();
        let _ = until_cursor.read_until(Time::new(100, 0)).await.unwrap();
        assert!(until_cursor.read_until(Time::new(200, 0)).await.unwrap().is_none());
        assert_eq!(test_helper_fn::get_open_cursor_count(&source).await, 0);
        assert!(until_cursor.end().await.is_ok());
    }

    #[tokio::test]
    async fn dropped_cursor_is_released() {
        let source = worker_source(4);
        let mut cursor = source.message_iterator(all_topics()).unwrap();
        let _ = cursor.next().await.unwrap();

        drop(cursor);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(test_helper_fn::get_open_cursor_count(&source).await, 0);
    }
}

#[cfg(test)]
mod failure {
    use pipeline_core::{
        error::PipelineError,
        iterable_source::{
            GetBackfillMessagesArgs, IterableSource, MessageCursor, MessageIteratorArgs,
            VecIterableSource,
        },
        models::{message_event::MessageEvent, time::Time},
    };
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use crate::modules::worker_iterable_source::WorkerIterableSource;

    #[tokio::test]
    async fn cancelled_cursor_aborts_reads() {
        let messages = vec![MessageEvent::new("/imu", "std_msgs/Int32", Time::new(1, 0), json!({}))];
        let source = WorkerIterableSource::new(Box::new(VecIterableSource::new(messages)), 4, 16);
        let cancellation = CancellationToken::new();
        let args = MessageIteratorArgs {
            topics: vec!["/imu".to_string()],
            ..Default::default()
        };
        let mut cursor = source.message_iterator_with_cancellation(args, &cancellation);

        cancellation.cancel();
        let err = cursor.next_batch(10).await.unwrap_err();

        assert_eq!(err.downcast_ref::<PipelineError>(), Some(&PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn source_cancellation_aborts_backfill() {
        let source = WorkerIterableSource::new(Box::new(VecIterableSource::new(vec![])), 4, 16);
        source.cancellation_token().cancel();

        let err = source
            .get_backfill_messages(GetBackfillMessagesArgs {
                topics: vec!["/imu".to_string()],
                time: Time::new(1, 0),
            })
            .await
            .unwrap_err();

        assert_eq!(err.downcast_ref::<PipelineError>(), Some(&PipelineError::Cancelled));
    }
}
