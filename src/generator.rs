//! Key and certificate synthesis for one identity.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::cert::Certificate;
use crate::cert::params::{VALIDITY_DAYS, Validity, subject_for_identity};
use crate::error::Result;
use crate::identity::Identity;
use crate::issuer::{CaContext, Issuer};
use crate::key::KeyPair;

/// Modulus size used when none is configured.
pub const DEFAULT_RSA_BITS: usize = 8192;

/// A minted key pair and the CA-signed certificate binding it to an identity.
///
/// All three artifacts are kept DER-encoded; the value is immutable once
/// built and is shared between the cache and every waiting connection.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// PKCS#8 `PrivateKeyInfo`.
    pub private_key_der: Vec<u8>,
    /// X.509 `SubjectPublicKeyInfo`.
    pub public_key_der: Vec<u8>,
    /// X.509 certificate.
    pub certificate_der: Vec<u8>,
}

impl KeyMaterial {
    /// Decodes the certificate.
    pub fn certificate(&self) -> Result<Certificate> {
        Certificate::from_der(&self.certificate_der)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("private_key_der", &format_args!("<{} bytes>", self.private_key_der.len()))
            .field("public_key_der", &format_args!("<{} bytes>", self.public_key_der.len()))
            .field("certificate_der", &format_args!("<{} bytes>", self.certificate_der.len()))
            .finish()
    }
}

/// Produces key material for an identity.
///
/// Implementations are called from the blocking thread pool and may take a
/// long time; they must not touch the cache or the queue.
pub trait KeyGenerator: Send + Sync + 'static {
    fn generate(&self, identity: &Identity) -> Result<KeyMaterial>;
}

/// Generates RSA key pairs and signs their certificates with a shared CA.
pub struct RsaKeyGenerator {
    ca: Arc<CaContext>,
    bits: usize,
}

impl RsaKeyGenerator {
    pub fn new(ca: Arc<CaContext>, bits: usize) -> Self {
        RsaKeyGenerator { ca, bits }
    }
}

impl KeyGenerator for RsaKeyGenerator {
    fn generate(&self, identity: &Identity) -> Result<KeyMaterial> {
        debug!(identity = %identity, bits = self.bits, "Generating RSA key pair");
        let key_pair = KeyPair::generate_rsa(self.bits)?;

        let certificate = self.ca.issue(
            subject_for_identity(identity)?,
            key_pair.as_spki()?,
            Validity::for_days(VALIDITY_DAYS),
        )?;

        Ok(KeyMaterial {
            private_key_der: key_pair.private_key_pkcs8_der()?,
            public_key_der: key_pair.public_key_der()?,
            certificate_der: certificate.to_der()?,
        })
    }
}
