//! The FIFO of pending generation tasks.
//!
//! The queue is unbounded: enqueueing never blocks the connection path. Under
//! sustained overload pending tasks accumulate in memory without limit.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::future::Completer;
use crate::identity::Identity;

/// One pending generation: the identity and the write half of its future.
#[derive(Debug)]
pub struct GenerationTask {
    pub identity: Identity,
    pub completer: Completer,
}

/// Creates a connected queue pair.
pub fn work_queue() -> (WorkQueueSender, WorkQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        WorkQueueSender { tx },
        WorkQueue {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer side, held by the cache.
#[derive(Debug, Clone)]
pub struct WorkQueueSender {
    tx: mpsc::UnboundedSender<GenerationTask>,
}

impl WorkQueueSender {
    /// Enqueues a task, handing it back if every consumer is gone.
    pub fn enqueue(&self, task: GenerationTask) -> Result<(), GenerationTask> {
        self.tx.send(task).map_err(|err| err.0)
    }
}

/// Consumer side, shared by all workers.
///
/// The receiver sits behind an async mutex so several workers can take turns
/// pulling from it; whichever worker holds the lock receives the next task.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<GenerationTask>>>,
}

impl WorkQueue {
    /// Waits for the next task. Returns `None` once every sender is dropped
    /// and the queue is empty.
    pub async fn dequeue(&self) -> Option<GenerationTask> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// Takes a task without waiting.
    pub async fn try_dequeue(&self) -> Option<GenerationTask> {
        let mut rx = self.rx.lock().await;
        rx.try_recv().ok()
    }

    /// Number of tasks waiting to be claimed.
    pub async fn len(&self) -> usize {
        self.rx.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::pending;

    fn task(name: &str) -> GenerationTask {
        let (completer, _future) = pending();
        GenerationTask {
            identity: Identity::try_from(name).unwrap(),
            completer,
        }
    }

    #[tokio::test]
    async fn preserves_fifo_order() {
        let (tx, queue) = work_queue();
        for name in ["a", "b", "c"] {
            tx.enqueue(task(name)).unwrap();
        }
        assert_eq!(queue.len().await, 3);

        let mut order = Vec::new();
        while let Some(task) = queue.try_dequeue().await {
            order.push(task.identity.to_string());
        }
        assert_eq!(order, ["a", "b", "c"]);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn dequeue_ends_when_senders_are_gone() {
        let (tx, queue) = work_queue();
        tx.enqueue(task("last")).unwrap();
        drop(tx);

        assert_eq!(queue.dequeue().await.unwrap().identity.as_str(), "last");
        assert!(queue.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn enqueue_hands_task_back_without_consumers() {
        let (tx, queue) = work_queue();
        drop(queue);
        let rejected = tx.enqueue(task("orphan")).unwrap_err();
        assert_eq!(rejected.identity.as_str(), "orphan");
    }
}
