use std::time::SystemTime;

use der::asn1::OctetString;
use rand_core::{OsRng, RngCore};
use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::SignatureAlgorithm;
use crate::cert::params::{ExtensionParam, Validity};
use crate::error::{CertMintError, Result};

/// Number of random bytes in a serial number.
pub const SERIAL_NUMBER_LEN: usize = 16;

/// Draws a random, positive serial number.
///
/// The high bit of the first byte is cleared so the DER INTEGER stays
/// positive, and bit 6 is set so the encoding is minimal (no leading zero
/// octet). That leaves 126 bits of entropy.
pub fn random_serial_number() -> [u8; SERIAL_NUMBER_LEN] {
    let mut serial = [0u8; SERIAL_NUMBER_LEN];
    OsRng.fill_bytes(&mut serial);
    serial[0] = (serial[0] & 0x7F) | 0x40;
    serial
}

/// Represents the "To Be Signed" (TBS) portion of an X.509 certificate.
///
/// # Fields
/// * `serial_number` - The unique identifier for the certificate.
/// * `signature_algorithm` - The algorithm used to sign the certificate.
/// * `issuer` - The distinguished name of the certificate issuer.
/// * `validity` - The validity window of the certificate.
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `extensions` - Additional X.509 extensions for the certificate.
pub struct TbsCertificate {
    /// Certificate serial number
    pub serial_number: Vec<u8>,
    /// Certificate signature algorithm
    pub signature_algorithm: SignatureAlgorithm,
    /// Certificate issuer distinguished name
    pub issuer: Name,
    /// Validity window, whole seconds
    pub validity: Validity,
    /// Certificate subject distinguished name
    pub subject: Name,
    /// Subject's public key
    pub subject_public_key: SubjectPublicKeyInfoOwned,
    /// Certificate extensions
    pub extensions: Vec<ExtensionParam>,
}

impl TbsCertificate {
    /// Converts the `TbsCertificate` into a `TbsCertificateInner` for DER encoding.
    pub fn to_tbs_certificate_inner(&self) -> Result<TbsCertificateInner> {
        let algorithm_id: x509_cert::spki::AlgorithmIdentifierOwned =
            self.signature_algorithm.into();

        let extensions = self
            .extensions
            .iter()
            .map(|ext| {
                Ok(x509_cert::ext::Extension {
                    extn_id: ext.oid,
                    critical: ext.critical,
                    extn_value: OctetString::new(ext.value.clone())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let validity = x509_cert::time::Validity {
            not_before: to_x509_time(self.validity.not_before)?,
            not_after: to_x509_time(self.validity.not_after)?,
        };

        let serial_number = SerialNumber::new(self.serial_number.as_slice())?;

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number,
            signature: algorithm_id,
            issuer: self.issuer.clone(),
            validity,
            subject: self.subject.clone(),
            subject_public_key_info: self.subject_public_key.clone(),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(extensions),
        })
    }
}

/// UTCTime through 2049, GeneralizedTime from 2050 on (RFC 5280 §4.1.2.5).
fn to_x509_time(at: time::OffsetDateTime) -> Result<x509_cert::time::Time> {
    x509_cert::time::Time::try_from(SystemTime::from(at)).map_err(|e| {
        CertMintError::CertificateError(format!("cannot encode timestamp {at}: {e}"))
    })
}
