use std::{
    mem,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::sync::oneshot;

type PendingToken = (String, oneshot::Receiver<()>);

/// Counting barrier between rendered frames. Consumers register a token with
/// [`FramePacer::pause_frame`] while they finish async work; the next frame
/// only starts once every token of the current one has been released.
#[derive(Clone, Default)]
pub struct FramePacer {
    pending: Arc<Mutex<Vec<PendingToken>>>,
    timeout: Option<Duration>,
}

/// Releases its pause token on [`FrameResumer::resume`] or when dropped.
#[derive(Debug)]
pub struct FrameResumer {
    name: String,
    tx: Option<oneshot::Sender<()>>,
}

impl FrameResumer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resume(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for FrameResumer {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl FramePacer {
    /// `timeout` bounds how long one frame may be held back. `None` waits
    /// for every token indefinitely.
    pub fn new(timeout: Option<Duration>) -> Self {
        FramePacer {
            pending: Arc::new(Mutex::new(Vec::new())),
            timeout,
        }
    }

    pub fn pause_frame(&self, name: impl Into<String>) -> FrameResumer {
        let name = name.into();
        let (tx, rx) = oneshot::channel::<()>();
        tracing::trace!(%name, "frame paused");

        self.lock_pending().push((name.clone(), rx));
        FrameResumer { name, tx: Some(tx) }
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Takes every token registered so far and waits until all of them are
    /// released. Tokens registered while waiting belong to the next frame.
    pub async fn wait_for_frame(&self) {
        let mut pending = mem::take(&mut *self.lock_pending());
        if pending.is_empty() {
            return;
        }

        let mut released = 0;
        let wait_all = async {
            for (_, rx) in pending.iter_mut() {
                // A dropped sender counts as released
                let _ = rx.await;
                released += 1;
            }
        };

        match self.timeout {
            None => wait_all.await,
            Some(timeout) => {
                if tokio::time::timeout(timeout, wait_all).await.is_err() {
                    let names: Vec<&str> = pending[released..]
                        .iter()
                        .map(|(name, _)| name.as_str())
                        .collect();
                    tracing::warn!(?names, ?timeout, "frame was not resumed in time, advancing");
                }
            }
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<PendingToken>> {
        // The list stays consistent even if a holder panicked
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod success {
    use std::time::Duration;

    use tokio::time::timeout;

    use crate::modules::frame_pacer::FramePacer;

    #[tokio::test]
    async fn no_tokens_does_not_block() {
        let pacer = FramePacer::new(None);

        let result = timeout(Duration::from_millis(100), pacer.wait_for_frame()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn waits_until_every_token_is_resumed() {
        let pacer = FramePacer::new(None);
        let first = pacer.pause_frame("image");
        let second = pacer.pause_frame("3d");
        assert_eq!(pacer.pending_count(), 2);

        let waiter = {
            let pacer = pacer.clone();
            tokio::spawn(async move { pacer.wait_for_frame().await })
        };

        first.resume();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        second.resume();
        let result = timeout(Duration::from_millis(500), waiter).await;
        assert!(result.is_ok());
        assert_eq!(pacer.pending_count(), 0);
    }

    #[tokio::test]
    async fn dropped_resumer_releases_frame() {
        let pacer = FramePacer::new(None);
        let resumer = pacer.pause_frame("plot");
        assert_eq!(resumer.name(), "plot");
        drop(resumer);

        let result = timeout(Duration::from_millis(100), pacer.wait_for_frame()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn watchdog_advances_stalled_frame() {
        let pacer = FramePacer::new(Some(Duration::from_millis(50)));
        let _stalled = pacer.pause_frame("stalled");

        let result = timeout(Duration::from_secs(1), pacer.wait_for_frame()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn tokens_registered_later_belong_to_next_frame() {
        let pacer = FramePacer::new(None);
        let first = pacer.pause_frame("first");

        let waiter = {
            let pacer = pacer.clone();
            tokio::spawn(async move { pacer.wait_for_frame().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _next = pacer.pause_frame("next");
        first.resume();

        let result = timeout(Duration::from_millis(500), waiter).await;
        assert!(result.is_ok());
        assert_eq!(pacer.pending_count(), 1);
    }
}
