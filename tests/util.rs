#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use certmint::error::{CertMintError, Result};
use certmint::generator::{KeyGenerator, KeyMaterial};
use certmint::identity::Identity;
use certmint::issuer::CaContext;
use certmint::server::CertMintServer;
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const TEST_ISSUER: &str = "CN=certmint Test CA,O=certmint";

/// Writes a fresh 2048-bit CA key to a PEM file and loads it back.
pub fn generate_ca() -> (CaContext, NamedTempFile) {
    let key = RsaPrivateKey::new(&mut rand_core::OsRng, 2048).unwrap();
    let pem = key.to_pkcs8_pem(pkcs8::LineEnding::LF).unwrap();

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(pem.as_bytes()).unwrap();
    file.flush().unwrap();

    let ca = CaContext::load(TEST_ISSUER, file.path()).unwrap();
    (ca, file)
}

/// Cheap stand-in for RSA generation.
///
/// Each call produces distinct bytes tagged with the identity and a call
/// number. Generation can be held back with [`Gate`] and made to fail for
/// chosen identities.
#[derive(Default)]
pub struct FakeGenerator {
    pub calls: AtomicUsize,
    pub gate: Gate,
    failures_left: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn gated() -> Self {
        FakeGenerator {
            gate: Gate::closed(),
            ..Default::default()
        }
    }

    /// Makes the next generation for `name` fail once.
    pub fn fail_once(&self, name: &str) {
        self.failures_left.lock().unwrap().push(name.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KeyGenerator for FakeGenerator {
    fn generate(&self, identity: &Identity) -> Result<KeyMaterial> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.wait();

        let mut failures = self.failures_left.lock().unwrap();
        if let Some(pos) = failures.iter().position(|name| name == identity.as_str()) {
            failures.remove(pos);
            return Err(CertMintError::KeyGenerationError("injected failure".into()));
        }

        let tag = format!("{identity}#{call}").into_bytes();
        Ok(KeyMaterial {
            private_key_der: tag.clone(),
            public_key_der: tag.clone(),
            certificate_der: tag,
        })
    }
}

/// Blocks generator threads until opened. Starts open.
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Default for Gate {
    fn default() -> Self {
        Gate {
            open: Mutex::new(true),
            cond: Condvar::new(),
        }
    }
}

impl Gate {
    pub fn closed() -> Self {
        Gate {
            open: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let open = self.open.lock().unwrap();
        let _open = self.cond.wait_while(open, |open| !*open).unwrap();
    }
}

/// A server listening on an ephemeral localhost port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub server: Arc<CertMintServer>,
    stop: Option<oneshot::Sender<()>>,
    accept_loop: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(worker_count: usize, generator: Arc<dyn KeyGenerator>) -> Self {
        let listener = CertMintServer::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(CertMintServer::start(worker_count, generator));

        let (stop, stopped) = oneshot::channel::<()>();
        let accept_loop = tokio::spawn({
            let server = Arc::clone(&server);
            async move {
                server
                    .serve(listener, async {
                        let _ = stopped.await;
                    })
                    .await;
            }
        });

        TestServer {
            addr,
            server,
            stop: Some(stop),
            accept_loop,
        }
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.accept_loop.await.unwrap();
        if let Ok(server) = Arc::try_unwrap(self.server) {
            server.shutdown().await;
        }
    }
}

/// Sends raw request bytes and returns everything the server wrote.
///
/// A reset from the server after rejecting a request counts as an empty
/// response.
pub async fn raw_request(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    // The server may close before reading everything; ignore write errors.
    let _ = stream.write_all(request).await;
    let _ = stream.shutdown().await;

    let mut response = Vec::new();
    match stream.read_to_end(&mut response).await {
        Ok(_) => response,
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => response,
        Err(e) => panic!("unexpected read error: {e}"),
    }
}

/// Requests `name` with the standard framing.
pub async fn request(addr: SocketAddr, name: &str) -> Vec<u8> {
    let mut bytes = name.as_bytes().to_vec();
    bytes.push(0);
    raw_request(addr, &bytes).await
}
