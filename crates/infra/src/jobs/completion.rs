//! Bounded many-producer, single-consumer channel from executors to the status updater.

use tokio::sync::mpsc;

use jobrunner_core::JobCompletion;

/// Completions buffered before executors start waiting.
pub const DEFAULT_COMPLETION_CAPACITY: usize = 100;

/// Create a completion channel. A capacity of zero is raised to one.
pub fn completion_channel(capacity: usize) -> (CompletionSender, CompletionReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (
        CompletionSender { tx, capacity },
        CompletionReceiver { rx },
    )
}

/// Producer half, one clone per worker.
#[derive(Debug, Clone)]
pub struct CompletionSender {
    tx: mpsc::Sender<JobCompletion>,
    capacity: usize,
}

/// The receiver is gone; the completion was not delivered.
#[derive(Debug, thiserror::Error)]
#[error("completion channel closed; result for job {} not delivered", .0.job_id)]
pub struct CompletionClosed(pub JobCompletion);

impl CompletionSender {
    /// Enqueue a completion, waiting while the channel is full.
    pub async fn send(&self, completion: JobCompletion) -> Result<(), CompletionClosed> {
        self.tx
            .send(completion)
            .await
            .map_err(|mpsc::error::SendError(c)| CompletionClosed(c))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Completions currently waiting for the updater.
    pub fn pending(&self) -> usize {
        self.capacity - self.tx.capacity()
    }
}

/// Consumer half, owned by the status updater.
#[derive(Debug)]
pub struct CompletionReceiver {
    rx: mpsc::Receiver<JobCompletion>,
}

impl CompletionReceiver {
    /// Next completion in enqueue order; `None` once every sender is dropped
    /// and the buffer is empty.
    pub async fn recv(&mut self) -> Option<JobCompletion> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use jobrunner_core::{JobId, JobOutcome, JobOutput};

    fn completion(n: u8) -> JobCompletion {
        JobCompletion::new(JobId::new(), JobOutcome::Succeeded, "w", JobOutput::encode([n]))
    }

    #[tokio::test]
    async fn delivers_in_enqueue_order() {
        let (tx, mut rx) = completion_channel(DEFAULT_COMPLETION_CAPACITY);
        let sent: Vec<_> = (0..10).map(completion).collect();

        for c in &sent {
            tx.send(c.clone()).await.unwrap();
        }
        drop(tx);

        let mut received = Vec::new();
        while let Some(c) = rx.recv().await {
            received.push(c);
        }
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn sender_waits_while_full() {
        let (tx, mut rx) = completion_channel(2);
        tx.send(completion(0)).await.unwrap();
        tx.send(completion(1)).await.unwrap();
        assert_eq!(tx.pending(), 2);

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.send(completion(2))).await;
        assert!(blocked.is_err(), "send should wait on a full channel");

        rx.recv().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), tx.send(completion(3)))
            .await
            .expect("send should proceed once there is room")
            .unwrap();
    }

    #[tokio::test]
    async fn send_after_receiver_dropped_returns_the_completion() {
        let (tx, rx) = completion_channel(1);
        drop(rx);

        let c = completion(7);
        let err = tx.send(c.clone()).await.unwrap_err();
        assert_eq!(err.0, c);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let (tx, _rx) = completion_channel(0);
        assert_eq!(tx.capacity(), 1);
    }
}
