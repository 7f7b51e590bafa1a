use core::str::FromStr;

use const_oid::ObjectIdentifier;
use der::Tag;
use der::asn1::{Any, SetOfVec};
use time::{Duration, OffsetDateTime};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
use crate::error::{CertMintError, Result};
use crate::identity::Identity;

/// Length of every issued certificate's validity window.
pub const VALIDITY_DAYS: i64 = 365;

/// Parses an RFC 4514 string such as `CN=Example CA,O=Example` into an X.509 name.
pub fn parse_distinguished_name(rfc4514: &str) -> Result<Name> {
    let trimmed = rfc4514.trim();
    if trimmed.is_empty() {
        return Err(CertMintError::Configuration(
            "issuer distinguished name is empty".to_string(),
        ));
    }
    RdnSequence::from_str(trimmed).map_err(|e| {
        CertMintError::Configuration(format!("invalid issuer distinguished name {trimmed:?}: {e}"))
    })
}

/// Builds the subject name `CN=<identity>`.
///
/// The attribute is assembled directly instead of going through the RFC 4514
/// parser, so identities containing `,`, `=`, `+` or `\` are taken literally.
pub fn subject_for_identity(identity: &Identity) -> Result<Name> {
    let value = Any::new(Tag::Utf8String, identity.as_bytes())?;
    let attribute = AttributeTypeAndValue {
        oid: const_oid::db::rfc4519::CN,
        value,
    };
    let rdn = RelativeDistinguishedName(SetOfVec::try_from(vec![attribute])?);
    Ok(RdnSequence(vec![rdn]))
}

/// Certificate validity period.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity period starting now for the given number of days.
    ///
    /// The start is truncated to whole seconds because X.509 times carry no
    /// fractional part; this keeps the encoded window exactly `days` long.
    pub fn for_days(days: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        let not_before = now.replace_nanosecond(0).unwrap_or(now);
        Self {
            not_before,
            not_after: not_before + Duration::days(days),
        }
    }

    pub fn duration(&self) -> Duration {
        self.not_after - self.not_before
    }
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: E, critical: bool) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }
}
