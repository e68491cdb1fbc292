//! Decoding, serialization and fingerprinting of X.509 certificates.
use std::{fmt, time::SystemTime};

use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
use snafu::{ResultExt, Snafu};
use x509_cert::{
    Certificate,
    attr::AttributeTypeAndValue,
    der::{Decode, Encode, EncodePem, Tag, Tagged, oid::ObjectIdentifier},
    name::Name,
};

use crate::{
    PEM_LINE_ENDING,
    issuer::escape_dn_value,
    keys::{self, DecodeCertificateSnafu, UnsupportedObjectSnafu},
    oid,
};

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to encode certificate as DER"))]
    EncodeDer { source: x509_cert::der::Error },

    #[snafu(display("failed to encode certificate as PEM"))]
    EncodePem { source: x509_cert::der::Error },

    #[snafu(display("the certificate validity {time:?} is not representable"))]
    ConvertValidity { source: jiff::Error, time: SystemTime },
}

/// The SHA-256 digest of the DER encoding of a certificate.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of_der(der: &[u8]) -> Self {
        Self(Sha256::digest(der).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The unpadded base64 form, which is what gets stored in the registry.
    pub fn to_base64(&self) -> String {
        STANDARD_NO_PAD.encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", hex::encode(self.0))
    }
}

/// Decodes the first `CERTIFICATE` PEM block of the input.
pub fn decode_certificate(input: &str) -> keys::Result<Certificate> {
    let pem = keys::parse_pem(input)?;

    if pem.tag() != CERTIFICATE_LABEL {
        return UnsupportedObjectSnafu {
            label: pem.tag(),
            expected: "certificate",
        }
        .fail();
    }

    Certificate::from_der(pem.contents()).context(DecodeCertificateSnafu)
}

/// Serializes the certificate as PEM, with base64 lines wrapped at 64
/// columns.
pub fn to_pem(certificate: &Certificate) -> Result<String> {
    certificate
        .to_pem(PEM_LINE_ENDING)
        .context(EncodePemSnafu)
}

pub fn fingerprint(certificate: &Certificate) -> Result<Fingerprint> {
    let der = certificate.to_der().context(EncodeDerSnafu)?;
    Ok(Fingerprint::of_der(&der))
}

pub fn fingerprint_base64(certificate: &Certificate) -> Result<String> {
    fingerprint(certificate).map(|fingerprint| fingerprint.to_base64())
}

/// A certificate together with the derived values handed back to users.
#[derive(Clone, Debug)]
pub struct CertificateDetails {
    pub certificate: Certificate,
    pub der: Vec<u8>,
    pub pem: String,
    pub fingerprint: Fingerprint,
    pub subject_dn: String,
    pub not_before: jiff::Timestamp,
    pub not_after: jiff::Timestamp,
}

impl CertificateDetails {
    pub fn new(certificate: Certificate) -> Result<Self> {
        let der = certificate.to_der().context(EncodeDerSnafu)?;
        let pem = to_pem(&certificate)?;

        let validity = &certificate.tbs_certificate.validity;
        let not_before = to_timestamp(validity.not_before.to_system_time())?;
        let not_after = to_timestamp(validity.not_after.to_system_time())?;

        Ok(Self {
            fingerprint: Fingerprint::of_der(&der),
            subject_dn: format_name(&certificate.tbs_certificate.subject),
            certificate,
            der,
            pem,
            not_before,
            not_after,
        })
    }
}

/// Formats the name as RFC 4514 string, most specific RDN first, e.g.
/// `CN=Jane Doe,O=ACME,serialNumber=key-1`.
///
/// Attribute types are written with their RFC 4519 names. Unknown types and
/// values which aren't strings are written as dotted OID and hex-encoded DER.
pub fn format_name(name: &Name) -> String {
    name.0
        .iter()
        .rev()
        .map(|rdn| {
            rdn.0
                .iter()
                .map(format_attribute)
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn format_attribute(attribute: &AttributeTypeAndValue) -> String {
    let value = match attribute.value.tag() {
        Tag::PrintableString | Tag::Utf8String | Tag::Ia5String | Tag::TeletexString => {
            std::str::from_utf8(attribute.value.value()).ok()
        }
        _ => None,
    };

    match (attribute_type_name(&attribute.oid), value) {
        (Some(name), Some(value)) => format!("{name}={}", escape_dn_value(value)),
        _ => format!(
            "{}=#{}",
            attribute.oid,
            hex::encode(attribute.value.to_der().unwrap_or_default())
        ),
    }
}

fn attribute_type_name(attribute_type: &ObjectIdentifier) -> Option<&'static str> {
    let name = match *attribute_type {
        oid::AT_COMMON_NAME => "CN",
        oid::AT_SURNAME => "SN",
        oid::AT_SERIAL_NUMBER => "serialNumber",
        oid::AT_COUNTRY => "C",
        oid::AT_LOCALITY => "L",
        oid::AT_STATE_OR_PROVINCE => "ST",
        oid::AT_STREET => "STREET",
        oid::AT_ORGANIZATION => "O",
        oid::AT_ORGANIZATIONAL_UNIT => "OU",
        oid::AT_TITLE => "title",
        oid::AT_GIVEN_NAME => "givenName",
        oid::AT_USER_ID => "UID",
        oid::AT_DOMAIN_COMPONENT => "DC",
        oid::AT_EMAIL_ADDRESS => "emailAddress",
        _ => return None,
    };

    Some(name)
}

fn to_timestamp(time: SystemTime) -> Result<jiff::Timestamp> {
    jiff::Timestamp::try_from(time).context(ConvertValiditySnafu { time })
}
