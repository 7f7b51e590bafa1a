//! Client side of the issuance protocol.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::{CertMintError, Result};
use crate::generator::KeyMaterial;
use crate::identity::{IDENTITY_TERMINATOR, Identity};
use crate::pem_utils::{
    CERTIFICATE_LABEL, PRIVATE_KEY_LABEL, PUBLIC_KEY_LABEL, decode_key_material, der_to_pem,
};

/// How a request should behave after the identity is sent.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Pause between sending the identity and reading the response.
    pub delay: Option<Duration>,
    /// Disconnect without reading the response.
    pub exit_early: bool,
}

/// Sends `identity` and writes its terminator.
pub async fn send_identity(stream: &mut TcpStream, identity: &Identity) -> Result<()> {
    stream.write_all(identity.as_bytes()).await?;
    stream.write_all(&[IDENTITY_TERMINATOR]).await?;
    stream.flush().await?;
    Ok(())
}

/// Reads the raw response until the server closes the connection.
pub async fn read_response(stream: &mut TcpStream) -> Result<String> {
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    if raw.is_empty() {
        return Err(CertMintError::DecodingError(
            "server closed the connection without a response".to_string(),
        ));
    }
    String::from_utf8(raw).map_err(|e| CertMintError::DecodingError(e.to_string()))
}

/// Requests key material for `identity` from the server at `addr`.
///
/// Returns `Ok(None)` when `options.exit_early` is set.
pub async fn request_key_material<A: ToSocketAddrs>(
    addr: A,
    identity: &Identity,
    options: &RequestOptions,
) -> Result<Option<KeyMaterial>> {
    let mut stream = TcpStream::connect(addr).await?;
    send_identity(&mut stream, identity).await?;
    debug!(identity = %identity, "Sent identity");

    if let Some(delay) = options.delay {
        tokio::time::sleep(delay).await;
    }
    if options.exit_early {
        return Ok(None);
    }

    let response = read_response(&mut stream).await?;
    decode_key_material(&response).map(Some)
}

/// Writes `<name>.key`, `<name>.pub` and `<name>.crt` into `dir`.
pub async fn save_key_material(
    dir: &Path,
    identity: &Identity,
    material: &KeyMaterial,
) -> Result<Vec<PathBuf>> {
    let outputs = [
        ("key", der_to_pem(&material.private_key_der, PRIVATE_KEY_LABEL)),
        ("pub", der_to_pem(&material.public_key_der, PUBLIC_KEY_LABEL)),
        ("crt", der_to_pem(&material.certificate_der, CERTIFICATE_LABEL)),
    ];

    // Identities may contain path separators; keep the files inside `dir`.
    let stem: String = identity
        .as_str()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_ascii_control() => '_',
            c => c,
        })
        .collect();

    let mut written = Vec::with_capacity(outputs.len());
    for (extension, contents) in outputs {
        let path = dir.join(format!("{stem}.{extension}"));
        tokio::fs::write(&path, contents).await?;
        written.push(path);
    }
    Ok(written)
}
