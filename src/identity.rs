use std::fmt;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::error::{CertMintError, Result};

/// Upper bound on the number of identity bytes read before a terminator.
pub const MAX_IDENTITY_LEN: usize = 4096;

/// Byte that ends an identity on the wire.
pub const IDENTITY_TERMINATOR: u8 = 0;

/// A validated subject name: non-empty, at most [`MAX_IDENTITY_LEN`] bytes,
/// and restricted to 7-bit ASCII.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// Validates raw bytes as an identity.
    ///
    /// The length check is repeated here so identities built outside the wire
    /// reader obey the same bound.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.is_empty() {
            return Err(CertMintError::EmptyIdentity);
        }
        if raw.len() > MAX_IDENTITY_LEN {
            return Err(CertMintError::IdentityTooLong(MAX_IDENTITY_LEN));
        }
        if let Some(&byte) = raw.iter().find(|b| !b.is_ascii()) {
            return Err(CertMintError::NonAsciiIdentity(byte));
        }
        // Every byte is ASCII, so this cannot fail.
        let name = String::from_utf8(raw.to_vec())
            .map_err(|e| CertMintError::InvalidInput(e.to_string()))?;
        Ok(Identity(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<&str> for Identity {
    type Error = CertMintError;

    fn try_from(value: &str) -> Result<Self> {
        Identity::from_bytes(value.as_bytes())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads raw identity bytes up to the zero terminator or end of stream.
///
/// At most `MAX_IDENTITY_LEN + 1` bytes are pulled from `reader`, so a client
/// that never sends a terminator cannot make the buffer grow without bound.
/// The terminator itself is not part of the result. Reaching end of stream
/// without a terminator still yields whatever was read.
pub async fn read_raw_identity<R>(reader: R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let limit = (MAX_IDENTITY_LEN + 1) as u64;
    let mut reader = BufReader::new(reader.take(limit));
    let mut buffer = Vec::with_capacity(64);
    reader.read_until(IDENTITY_TERMINATOR, &mut buffer).await?;

    if buffer.last() == Some(&IDENTITY_TERMINATOR) {
        buffer.pop();
    } else if buffer.len() > MAX_IDENTITY_LEN {
        return Err(CertMintError::IdentityTooLong(MAX_IDENTITY_LEN));
    }
    Ok(buffer)
}

/// Reads and validates an identity from a connection.
pub async fn read_identity<R>(reader: R) -> Result<Identity>
where
    R: AsyncRead + Unpin,
{
    let raw = read_raw_identity(reader).await?;
    Identity::from_bytes(&raw)
}
