use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{info, warn};

use jobrunner_core::Job;

use crate::jobs::completion::CompletionSender;
use crate::jobs::executor::ShellExecutor;

/// Jobs buffered before submissions are refused.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Long-lived executor workers.
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Producer side of the bounded submission queue.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    capacity: usize,
}

impl JobQueue {
    pub(crate) fn sender(&self) -> &mpsc::Sender<Job> {
        &self.tx
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs accepted but not yet picked up by a worker.
    pub fn depth(&self) -> usize {
        self.capacity - self.tx.capacity()
    }
}

/// A fixed set of workers draining the submission queue.
///
/// Each worker runs one job at a time and hands the result to the
/// completion channel. Workers stop when every [`JobQueue`] clone is dropped
/// and the queue is empty.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<JoinHandle<u64>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) labelled `<name>/worker-<i>`.
    pub fn spawn(
        name: &str,
        size: usize,
        queue_capacity: usize,
        executor: ShellExecutor,
        completions: CompletionSender,
    ) -> (JobQueue, WorkerPool) {
        let capacity = queue_capacity.max(1);
        let (tx, rx) = mpsc::channel::<Job>(capacity);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..size.max(1))
            .map(|i| {
                let label = format!("{name}/worker-{i}");
                tokio::spawn(worker_loop(
                    label,
                    rx.clone(),
                    executor.clone(),
                    completions.clone(),
                ))
            })
            .collect();

        (JobQueue { tx, capacity }, WorkerPool { workers })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to stop. Returns the number of jobs run.
    pub async fn join(self) -> u64 {
        let mut total = 0;
        for worker in self.workers {
            match worker.await {
                Ok(ran) => total += ran,
                Err(err) => warn!(error = %err, "job worker ended abnormally"),
            }
        }
        total
    }

    /// Stop workers without waiting for in-flight jobs.
    pub fn abort(&self) {
        for worker in &self.workers {
            worker.abort();
        }
    }

    pub fn abort_handles(&self) -> Vec<AbortHandle> {
        self.workers.iter().map(JoinHandle::abort_handle).collect()
    }
}

async fn worker_loop(
    label: String,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    executor: ShellExecutor,
    completions: CompletionSender,
) -> u64 {
    let mut ran = 0;

    loop {
        // Hold the lock only while waiting for the next job.
        let next = rx.lock().await.recv().await;
        let Some(job) = next else { break };

        let completion = executor.run(&job, &label).await;
        ran += 1;

        if let Err(err) = completions.send(completion).await {
            warn!(worker = %label, job_id = %err.0.job_id, "status updater gone; stopping worker");
            break;
        }
    }

    info!(worker = %label, jobs = ran, "job worker stopped");
    ran
}
