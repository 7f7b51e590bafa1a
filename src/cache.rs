//! Deduplicating cache from identity to key material.
//!
//! The cache guarantees that at most one generation task is ever queued for
//! an identity while its future is unresolved: concurrent callers of
//! [`KeyCache::get_or_create`] for the same identity all receive clones of one
//! [`KeyFuture`]. Successful results stay cached for the life of the process.
//! Failed results are evicted before they are published, so the next request
//! for that identity starts a fresh generation.
//!
//! The map lock is held only for the lookup/insert and the enqueue, never
//! while a key is being generated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::{CertMintError, Result};
use crate::future::{KeyFuture, pending};
use crate::generator::KeyMaterial;
use crate::identity::Identity;
use crate::queue::{GenerationTask, WorkQueueSender};

pub struct KeyCache {
    entries: Mutex<HashMap<Identity, KeyFuture>>,
    queue: WorkQueueSender,
}

impl KeyCache {
    pub fn new(queue: WorkQueueSender) -> Self {
        KeyCache {
            entries: Mutex::new(HashMap::new()),
            queue,
        }
    }

    // Nothing panics while the lock is held, but a poisoned map is still
    // structurally sound, so keep serving from it.
    fn entries(&self) -> MutexGuard<'_, HashMap<Identity, KeyFuture>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the future for `identity`, queueing a generation task only if
    /// no live entry exists yet.
    ///
    /// An entry whose task was dropped without being resolved (for example
    /// still queued when the last worker exited) counts as absent and is
    /// replaced.
    pub fn get_or_create(&self, identity: &Identity) -> KeyFuture {
        let mut entries = self.entries();
        if let Some(existing) = entries.get(identity) {
            if !existing.is_failed() {
                debug!(identity = %identity, resolved = existing.is_resolved(), "Cache hit");
                return existing.clone();
            }
            debug!(identity = %identity, "Replacing abandoned generation");
        }

        let (completer, future) = pending();
        let task = GenerationTask {
            identity: identity.clone(),
            completer,
        };
        match self.queue.enqueue(task) {
            Ok(()) => {
                debug!(identity = %identity, "Cache miss, generation queued");
                entries.insert(identity.clone(), future.clone());
            }
            Err(task) => {
                warn!(identity = %identity, "Work queue is closed, cannot schedule generation");
                entries.remove(identity);
                task.completer.complete(Err(CertMintError::GenerationAbandoned));
            }
        }
        future
    }

    /// Publishes the outcome of a generation task.
    ///
    /// On failure the entry is removed first, and only if it still belongs to
    /// this task, so a waiter that sees the error and asks again triggers a
    /// new generation.
    pub fn resolve(&self, task: GenerationTask, outcome: Result<KeyMaterial>) {
        let GenerationTask {
            identity,
            completer,
        } = task;

        match outcome {
            Ok(material) => completer.complete(Ok(Arc::new(material))),
            Err(err) => {
                {
                    let mut entries = self.entries();
                    if entries
                        .get(&identity)
                        .is_some_and(|future| future.id() == completer.id())
                    {
                        entries.remove(&identity);
                    }
                }
                debug!(identity = %identity, error = %err, "Evicted failed generation");
                completer.complete(Err(err));
            }
        }
    }

    /// The cached future for `identity`, without creating one.
    pub fn peek(&self, identity: &Identity) -> Option<KeyFuture> {
        self.entries().get(identity).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
