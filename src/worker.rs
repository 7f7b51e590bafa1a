//! Fixed-size pool of key generation workers.
//!
//! ```text
//! KeyCache → WorkQueue (unbounded) → Worker Pool (N workers)
//!                                        ↓
//!                                spawn_blocking(generate)
//!                                        ↓
//!                                 KeyCache::resolve
//! ```
//!
//! Each worker runs at most one generation at a time, so at most N keys are
//! being computed at once no matter how many connections are waiting. A
//! failing or panicking generation resolves only its own task; the worker
//! moves on to the next one.
//!
//! ## Graceful Shutdown
//!
//! [`WorkerPoolHandle::shutdown`] signals every worker through a watch
//! channel. Workers finish the task in hand, drain whatever is still queued,
//! and exit.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::KeyCache;
use crate::error::CertMintError;
use crate::generator::KeyGenerator;
use crate::queue::{GenerationTask, WorkQueue};

/// Handle for controlling a running worker pool.
pub struct WorkerPoolHandle {
    shutdown_tx: watch::Sender<bool>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        info!("Initiating graceful shutdown of worker pool");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for all workers to finish.
    pub async fn join(self) {
        for handle in self.worker_handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task terminated abnormally");
            }
        }
    }
}

/// Everything one worker needs.
struct Worker {
    id: usize,
    queue: WorkQueue,
    cache: Arc<KeyCache>,
    generator: Arc<dyn KeyGenerator>,
}

pub struct WorkerPool {
    worker_count: usize,
    queue: WorkQueue,
    cache: Arc<KeyCache>,
    generator: Arc<dyn KeyGenerator>,
}

impl WorkerPool {
    pub fn new(
        worker_count: usize,
        queue: WorkQueue,
        cache: Arc<KeyCache>,
        generator: Arc<dyn KeyGenerator>,
    ) -> Self {
        WorkerPool {
            worker_count,
            queue,
            cache,
            generator,
        }
    }

    /// Spawns `worker_count` Tokio tasks that drain the queue.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_workers(self) -> WorkerPoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(self.worker_count);

        info!(worker_count = self.worker_count, "Spawning key generation workers");

        for id in 0..self.worker_count {
            let worker = Worker {
                id,
                queue: self.queue.clone(),
                cache: Arc::clone(&self.cache),
                generator: Arc::clone(&self.generator),
            };
            handles.push(tokio::spawn(worker.run(shutdown_rx.clone())));
        }

        WorkerPoolHandle {
            shutdown_tx,
            worker_handles: handles,
        }
    }
}

impl Worker {
    async fn run(self, shutdown_rx: watch::Receiver<bool>) {
        debug!(worker_id = self.id, "Worker started");

        loop {
            tokio::select! {
                biased;

                _ = wait_for_shutdown(shutdown_rx.clone()) => {
                    info!(worker_id = self.id, "Received shutdown signal, draining queue");
                    let mut drained = 0usize;
                    while let Some(task) = self.queue.try_dequeue().await {
                        self.process(task).await;
                        drained += 1;
                    }
                    info!(worker_id = self.id, drained_tasks = drained, "Worker shutdown complete");
                    break;
                }

                task = self.queue.dequeue() => match task {
                    Some(task) => self.process(task).await,
                    None => {
                        debug!(worker_id = self.id, "Work queue closed, worker exiting");
                        break;
                    }
                },
            }
        }
    }

    async fn process(&self, task: GenerationTask) {
        let identity = task.identity.clone();
        let generator = Arc::clone(&self.generator);
        let started = Instant::now();

        let outcome = match tokio::task::spawn_blocking(move || generator.generate(&identity)).await
        {
            Ok(result) => result,
            Err(join_err) => Err(CertMintError::KeyGenerationError(format!(
                "generator task failed: {join_err}"
            ))),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => info!(
                worker_id = self.id,
                identity = %task.identity,
                elapsed_ms,
                "Generated key material"
            ),
            Err(e) => warn!(
                worker_id = self.id,
                identity = %task.identity,
                elapsed_ms,
                error = %e,
                "Key generation failed"
            ),
        }

        self.cache.resolve(task, outcome);
    }
}

/// Completes once shutdown is requested. If the handle was dropped without
/// requesting shutdown, never completes.
async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    if shutdown_rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::generator::KeyMaterial;
    use crate::identity::Identity;
    use crate::queue::work_queue;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the identity bytes as key material; panics on "panic", fails on "fail".
    #[derive(Default)]
    struct ScriptedGenerator {
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl KeyGenerator for ScriptedGenerator {
        fn generate(&self, identity: &Identity) -> Result<KeyMaterial> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(identity.to_string());
            match identity.as_str() {
                "panic" => panic!("generator blew up"),
                "fail" => Err(CertMintError::RsaError("provider unavailable".into())),
                name => Ok(KeyMaterial {
                    private_key_der: name.as_bytes().to_vec(),
                    public_key_der: vec![],
                    certificate_der: vec![],
                }),
            }
        }
    }

    fn start(worker_count: usize) -> (Arc<KeyCache>, Arc<ScriptedGenerator>, WorkerPoolHandle) {
        let (tx, queue) = work_queue();
        let cache = Arc::new(KeyCache::new(tx));
        let generator = Arc::new(ScriptedGenerator::default());
        let handle = WorkerPool::new(
            worker_count,
            queue,
            Arc::clone(&cache),
            Arc::clone(&generator) as Arc<dyn KeyGenerator>,
        )
        .spawn_workers();
        (cache, generator, handle)
    }

    #[tokio::test]
    async fn generates_and_caches() {
        let (cache, generator, handle) = start(2);
        let alice = Identity::try_from("alice").unwrap();

        let material = cache.get_or_create(&alice).wait().await.unwrap();
        assert_eq!(material.private_key_der, b"alice");
        let again = cache.get_or_create(&alice).wait().await.unwrap();
        assert!(Arc::ptr_eq(&material, &again));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test]
    async fn worker_survives_failure_and_panic() {
        let (cache, generator, handle) = start(1);

        let fail = Identity::try_from("fail").unwrap();
        let boom = Identity::try_from("panic").unwrap();
        let ok = Identity::try_from("ok").unwrap();

        assert!(cache.get_or_create(&fail).wait().await.is_err());
        let panicked = cache.get_or_create(&boom).wait().await.unwrap_err();
        assert!(matches!(panicked, CertMintError::KeyGenerationError(_)));
        assert!(cache.get_or_create(&ok).wait().await.is_ok());

        assert!(cache.peek(&fail).is_none());
        assert!(cache.peek(&boom).is_none());

        // A failed identity is generated again on the next request.
        assert!(cache.get_or_create(&fail).wait().await.is_err());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 4);

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test]
    async fn shutdown_drains_queued_tasks() {
        let (tx, queue) = work_queue();
        let cache = Arc::new(KeyCache::new(tx));
        let generator = Arc::new(ScriptedGenerator::default());

        let futures: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|name| cache.get_or_create(&Identity::try_from(*name).unwrap()))
            .collect();

        let handle = WorkerPool::new(
            1,
            queue,
            Arc::clone(&cache),
            Arc::clone(&generator) as Arc<dyn KeyGenerator>,
        )
        .spawn_workers();
        handle.shutdown();
        handle.join().await;

        for future in futures {
            assert!(future.try_get().unwrap().is_ok());
        }
        assert_eq!(*generator.seen.lock().unwrap(), ["a", "b", "c"]);
    }
}
