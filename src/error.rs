//! use certmint::error::CertMintError;

use thiserror::Error;

/// Represents errors that can occur while minting or serving key material.
///
/// The type is `Clone` because a single generation failure is delivered to
/// every connection waiting on the same identity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CertMintError {
    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// Error related to certificate operations.
    #[error("Certificate error: {0}")]
    CertificateError(String),

    /// Error from RSA operations.
    #[error("RSA error: {0}")]
    RsaError(String),

    /// Error from RSA PKCS1 operations.
    #[error("RSA PKCS1 error: {0}")]
    RsaPkcs1Error(String),

    /// Error from PKCS8 / SPKI operations.
    #[error("PKCS8 error: {0}")]
    Pkcs8Error(String),

    /// The requested identity contains a byte outside 7-bit ASCII.
    #[error("Identity contains non-ASCII byte 0x{0:02X}")]
    NonAsciiIdentity(u8),

    /// The requested identity is empty.
    #[error("Identity is empty")]
    EmptyIdentity,

    /// More than the allowed number of bytes arrived before a terminator.
    #[error("Identity exceeds {0} bytes")]
    IdentityTooLong(usize),

    /// The generation task was dropped before anyone resolved it.
    #[error("Generation for this identity was abandoned")]
    GenerationAbandoned,

    /// Invalid startup configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error from the underlying stream or file.
    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, CertMintError>;

impl From<der::Error> for CertMintError {
    /// Converts a `der::Error` into a `CertMintError`.
    fn from(err: der::Error) -> Self {
        CertMintError::DecodingError(err.to_string())
    }
}

impl From<rsa::Error> for CertMintError {
    fn from(err: rsa::Error) -> Self {
        CertMintError::RsaError(err.to_string())
    }
}

impl From<rsa::pkcs1::Error> for CertMintError {
    fn from(err: rsa::pkcs1::Error) -> Self {
        CertMintError::RsaPkcs1Error(err.to_string())
    }
}

impl From<pkcs8::Error> for CertMintError {
    fn from(err: pkcs8::Error) -> Self {
        CertMintError::Pkcs8Error(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for CertMintError {
    fn from(err: pkcs8::spki::Error) -> Self {
        CertMintError::Pkcs8Error(err.to_string())
    }
}

impl From<std::io::Error> for CertMintError {
    fn from(err: std::io::Error) -> Self {
        CertMintError::Io(err.to_string())
    }
}

impl CertMintError {
    /// Returns true for errors caused by what the client sent rather than by
    /// the service.
    pub fn is_malformed_request(&self) -> bool {
        matches!(
            self,
            CertMintError::NonAsciiIdentity(_)
                | CertMintError::EmptyIdentity
                | CertMintError::IdentityTooLong(_)
        )
    }
}
