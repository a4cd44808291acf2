//! In-process stand-in for the durable task broker: an `mpsc`-backed worker
//! pool with `prefetch = 1` semantics, so a slow channel cannot block fast
//! ones queued behind it on the same worker.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

pub const DEFAULT_WORKER_COUNT: usize = 8;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[async_trait::async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: BoxedTask);
}

/// Spawns `worker_count` workers sharing one `mpsc` receiver guarded by a
/// mutex, so each worker pulls exactly one task at a time.
pub struct InProcessTaskQueue {
    sender: mpsc::Sender<BoxedTask>,
}

impl InProcessTaskQueue {
    pub fn start(worker_count: usize, channel_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(channel_capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        for worker_id in 0..worker_count {
            let receiver = receiver.clone();
            tokio::spawn(async move {
                loop {
                    let task = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    match task {
                        Some(task) => {
                            tracing::trace!(worker_id, "picked up task");
                            task.await;
                        }
                        None => break,
                    }
                }
            });
        }

        Self { sender }
    }

    pub fn start_default() -> Self {
        Self::start(DEFAULT_WORKER_COUNT, DEFAULT_QUEUE_CAPACITY)
    }
}

#[async_trait::async_trait]
impl TaskQueue for InProcessTaskQueue {
    async fn enqueue(&self, task: BoxedTask) {
        if self.sender.send(task).await.is_err() {
            tracing::error!("task queue closed, dropping task");
        }
    }
}
