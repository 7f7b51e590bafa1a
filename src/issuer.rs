use std::path::Path;

use der::Encode;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::Certificate;
use crate::cert::SignatureAlgorithm;
use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, KeyUsage, SubjectKeyIdentifier, key_identifier,
};
use crate::cert::params::{ExtensionParam, Validity, parse_distinguished_name};
use crate::error::{CertMintError, Result};
use crate::key::KeyPair;
use crate::tbs_certificate::{TbsCertificate, random_serial_number};

/// Represents an entity capable of issuing certificates.
///
/// This trait provides methods to retrieve issuer details and issue certificates.
pub trait Issuer {
    /// Returns the distinguished name of the issuer.
    fn issuer_name(&self) -> &Name;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Returns the key identifier placed in issued certificates' AKI extension.
    fn authority_key_id(&self) -> &[u8];

    /// Issues an end-entity certificate for `subject` / `subject_public_key`.
    ///
    /// Every call draws a fresh random serial number. The TBS structure is
    /// signed with SHA-256 with RSA; nothing is returned unless signing and
    /// encoding both succeed.
    fn issue(
        &self,
        subject: Name,
        subject_public_key: SubjectPublicKeyInfoOwned,
        validity: Validity,
    ) -> Result<Certificate> {
        let signature_algo = SignatureAlgorithm::Sha256WithRSA;

        let extensions = vec![
            ExtensionParam::from_extension(BasicConstraints { is_ca: false }, true)?,
            ExtensionParam::from_extension(KeyUsage::end_entity(), true)?,
            ExtensionParam::from_extension(
                SubjectKeyIdentifier(key_identifier(&subject_public_key)),
                false,
            )?,
            ExtensionParam::from_extension(
                AuthorityKeyIdentifier {
                    key_identifier: self.authority_key_id().to_vec(),
                },
                false,
            )?,
        ];

        let tbs_cert = TbsCertificate {
            serial_number: random_serial_number().to_vec(),
            signature_algorithm: signature_algo,
            issuer: self.issuer_name().clone(),
            validity,
            subject,
            subject_public_key,
            extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;
        let tbs_der = tbs_cert_inner
            .to_der()
            .map_err(|e| CertMintError::EncodingError(e.to_string()))?;
        let signature = self.signing_key().sign_data(&tbs_der)?;

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algo.into(),
            signature: der::asn1::BitString::from_bytes(&signature)?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}

/// The certificate authority: issuer name and signing key.
///
/// Built once at startup and never mutated afterwards; workers share it
/// through an `Arc`.
#[derive(Debug)]
pub struct CaContext {
    issuer: Name,
    key: KeyPair,
    key_id: Vec<u8>,
}

impl CaContext {
    /// Creates a CA context from an RFC 4514 issuer name and a signing key.
    pub fn new(issuer: &str, key: KeyPair) -> Result<Self> {
        let issuer = parse_distinguished_name(issuer)?;
        let key_id = key_identifier(&key.as_spki()?);
        Ok(CaContext {
            issuer,
            key,
            key_id,
        })
    }

    /// Creates a CA context from an issuer name and a PEM-encoded private key.
    pub fn from_pem(issuer: &str, key_pem: &str) -> Result<Self> {
        let key = KeyPair::import_from_pem(key_pem)?;
        Self::new(issuer, key)
    }

    /// Loads the CA private key from a PEM file.
    pub fn load(issuer: &str, key_path: impl AsRef<Path>) -> Result<Self> {
        let key_path = key_path.as_ref();
        let key_pem = std::fs::read_to_string(key_path).map_err(|e| {
            CertMintError::Configuration(format!(
                "cannot read CA key {}: {e}",
                key_path.display()
            ))
        })?;
        Self::from_pem(issuer, &key_pem)
    }

    /// The CA public key, for verifying issued certificates.
    pub fn public_key(&self) -> &rsa::RsaPublicKey {
        self.key.public_key()
    }
}

impl Issuer for CaContext {
    fn issuer_name(&self) -> &Name {
        &self.issuer
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }

    fn authority_key_id(&self) -> &[u8] {
        &self.key_id
    }
}
