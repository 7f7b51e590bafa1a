//! TCP listener and per-connection protocol handling.
//!
//! Wire protocol: the client sends an ASCII identity followed by one zero
//! byte (or closes its write side). The server answers with the PEM-encoded
//! private key, public key and certificate, then closes. Any failure closes
//! the connection without writing anything.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::cache::KeyCache;
use crate::error::Result;
use crate::generator::KeyGenerator;
use crate::identity::read_identity;
use crate::pem_utils::encode_key_material;
use crate::queue::work_queue;
use crate::worker::{WorkerPool, WorkerPoolHandle};

/// Pause after a failed `accept` so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// The running service: cache, queue and worker pool.
pub struct CertMintServer {
    cache: Arc<KeyCache>,
    workers: WorkerPoolHandle,
}

impl CertMintServer {
    /// Wires the cache to a fresh work queue and spawns `worker_count` workers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(worker_count: usize, generator: Arc<dyn KeyGenerator>) -> Self {
        let (queue_tx, queue) = work_queue();
        let cache = Arc::new(KeyCache::new(queue_tx));
        let workers =
            WorkerPool::new(worker_count, queue, Arc::clone(&cache), generator).spawn_workers();
        CertMintServer { cache, workers }
    }

    pub fn cache(&self) -> &Arc<KeyCache> {
        &self.cache
    }

    pub async fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
        TcpListener::bind(addr).await
    }

    /// Accepts connections until `shutdown` completes, spawning one task per
    /// connection. Connection failures are logged and never end the loop.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "Listening for key requests");
        }
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let cache = Arc::clone(&self.cache);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(cache, stream, peer).await {
                                if e.is_malformed_request() {
                                    warn!(%peer, error = %e, "Rejected request");
                                } else {
                                    error!(%peer, error = %e, "Connection failed");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }
    }

    /// Stops the workers after they drain the queue.
    pub async fn shutdown(self) {
        self.workers.shutdown();
        self.workers.join().await;
    }
}

/// Serves one request: read identity, wait for key material, write it, close.
///
/// Returns before writing anything if the identity is invalid or generation
/// fails; dropping the stream closes the connection.
pub async fn handle_connection(
    cache: Arc<KeyCache>,
    mut stream: TcpStream,
    peer: SocketAddr,
) -> Result<()> {
    let (reader, mut writer) = stream.split();

    let identity = read_identity(reader).await?;
    info!(%peer, identity = %identity, "Key request");

    let material = cache.get_or_create(&identity).wait().await?;

    let response = encode_key_material(&material);
    writer.write_all(response.as_bytes()).await?;
    writer.shutdown().await?;

    debug!(%peer, identity = %identity, bytes = response.len(), "Sent key material");
    Ok(())
}
