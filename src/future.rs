//! Single-assignment futures for generated key material.
//!
//! [`pending`] returns a write half ([`Completer`]) and a read half
//! ([`KeyFuture`]). The completer is consumed by [`Completer::complete`], so a
//! future can be resolved at most once. Read halves are cheap to clone; every
//! clone observes the same outcome. Dropping the completer without resolving
//! it wakes all waiters with [`CertMintError::GenerationAbandoned`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::error::CertMintError;
use crate::generator::KeyMaterial;

/// What a waiter eventually sees.
pub type Outcome = std::result::Result<Arc<KeyMaterial>, CertMintError>;

static NEXT_FUTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Creates an unresolved future together with the handle that resolves it.
pub fn pending() -> (Completer, KeyFuture) {
    let (tx, rx) = watch::channel(None);
    let id = NEXT_FUTURE_ID.fetch_add(1, Ordering::Relaxed);
    (Completer { tx, id }, KeyFuture { rx, id })
}

/// Write half of a single-assignment future.
#[derive(Debug)]
pub struct Completer {
    tx: watch::Sender<Option<Outcome>>,
    id: u64,
}

impl Completer {
    /// Resolves the future and wakes every waiter.
    pub fn complete(self, outcome: Outcome) {
        self.tx.send_replace(Some(outcome));
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Read half of a single-assignment future.
#[derive(Debug, Clone)]
pub struct KeyFuture {
    rx: watch::Receiver<Option<Outcome>>,
    id: u64,
}

impl KeyFuture {
    /// Waits until the future is resolved and returns the outcome.
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(resolved) => resolved.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(CertMintError::GenerationAbandoned))
    }

    /// The outcome, if already resolved.
    pub fn try_get(&self) -> Option<Outcome> {
        self.rx.borrow().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// True once the future can no longer yield key material: it resolved
    /// with an error, or its completer was dropped unresolved.
    pub fn is_failed(&self) -> bool {
        if let Some(outcome) = self.rx.borrow().as_ref() {
            return outcome.is_err();
        }
        // A closed channel is final; re-read in case `complete` raced us.
        self.rx.has_changed().is_err() && self.rx.borrow().is_none()
    }

    /// Identifies the future; all clones share one id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(tag: u8) -> Arc<KeyMaterial> {
        Arc::new(KeyMaterial {
            private_key_der: vec![tag],
            public_key_der: vec![tag],
            certificate_der: vec![tag],
        })
    }

    #[tokio::test]
    async fn all_waiters_see_the_same_value() {
        let (completer, future) = pending();
        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let future = future.clone();
                tokio::spawn(async move { future.wait().await })
            })
            .collect();

        assert!(!future.is_resolved());
        completer.complete(Ok(material(7)));

        for waiter in waiters {
            let value = waiter.await.unwrap().unwrap();
            assert_eq!(value.private_key_der, vec![7]);
        }
        assert!(future.is_resolved());
    }

    #[tokio::test]
    async fn failure_is_fanned_out() {
        let (completer, future) = pending();
        let other = future.clone();
        completer.complete(Err(CertMintError::RsaError("boom".into())));

        assert_eq!(
            future.wait().await.unwrap_err(),
            CertMintError::RsaError("boom".into())
        );
        assert_eq!(
            other.wait().await.unwrap_err(),
            CertMintError::RsaError("boom".into())
        );
    }

    #[tokio::test]
    async fn late_waiter_sees_resolved_value() {
        let (completer, future) = pending();
        completer.complete(Ok(material(1)));
        assert!(future.try_get().unwrap().is_ok());
        assert_eq!(future.wait().await.unwrap().certificate_der, vec![1]);
    }

    #[tokio::test]
    async fn dropped_completer_abandons_waiters() {
        let (completer, future) = pending();
        let waiter = tokio::spawn({
            let future = future.clone();
            async move { future.wait().await }
        });
        drop(completer);
        assert_eq!(
            waiter.await.unwrap().unwrap_err(),
            CertMintError::GenerationAbandoned
        );
    }

    #[test]
    fn failed_covers_errors_and_abandonment() {
        let (completer, future) = pending();
        assert!(!future.is_failed());
        completer.complete(Ok(material(2)));
        assert!(!future.is_failed());

        let (completer, future) = pending();
        completer.complete(Err(CertMintError::RsaError("boom".into())));
        assert!(future.is_failed());

        let (completer, future) = pending();
        drop(completer);
        assert!(future.is_failed());
    }

    #[tokio::test]
    async fn resolves_across_threads() {
        let (completer, future) = pending();
        std::thread::spawn(move || completer.complete(Ok(material(3))));
        assert_eq!(future.wait().await.unwrap().public_key_der, vec![3]);
    }

    #[test]
    fn ids_are_unique_and_shared_by_clones() {
        let (completer, future) = pending();
        let (_, other) = pending();
        assert_eq!(completer.id(), future.id());
        assert_eq!(future.clone().id(), future.id());
        assert_ne!(future.id(), other.id());
    }
}
