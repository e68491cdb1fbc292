//! Contains the [`CertificateIssuer`], which signs client certificates with
//! the [`IssuerIdentity`] loaded at process start.
use std::time::SystemTime;

use jiff::Timestamp;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use sha2::Sha256;
use signature::Verifier;
use snafu::{ResultExt, Snafu};
use tracing::{debug, instrument};
use x509_cert::{
    Certificate,
    builder::{Builder, CertificateBuilder, Profile},
    der::{
        Encode,
        asn1::{GeneralizedTime, Ia5String, UtcTime},
    },
    ext::pkix::{
        BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages, SubjectAltName,
        name::GeneralName,
    },
    name::Name,
    serial_number::SerialNumber,
    spki::SubjectPublicKeyInfoOwned,
    time::{Time, Validity},
};

use crate::{cert::CertificateDetails, oid};

mod consts;
mod identity;
pub use consts::*;
pub use identity::*;

/// The output of [`CertificateIssuer::issue`].
pub type IssuedCertificate = CertificateDetails;

/// Defines all error variants which can occur when issuing a certificate.
///
/// All of them are server faults.
#[derive(Debug, Snafu)]
pub enum IssueError {
    #[snafu(display("failed to compute the validity window starting at {now}"))]
    ComputeValidity { source: jiff::Error, now: Timestamp },

    #[snafu(display("failed to parse validity"))]
    ParseValidity { source: x509_cert::der::Error },

    #[snafu(display("failed to parse {subject:?} as subject"))]
    ParseSubject {
        source: x509_cert::der::Error,
        subject: String,
    },

    #[snafu(display("failed to create serial number"))]
    CreateSerialNumber { source: x509_cert::der::Error },

    #[snafu(display("failed to encode {value:?} as subject alternative name"))]
    EncodeSubjectAlternativeName {
        source: x509_cert::der::Error,
        value: String,
    },

    #[snafu(display("failed to create certificate builder"))]
    CreateCertificateBuilder { source: x509_cert::builder::Error },

    #[snafu(display("failed to add certificate extension"))]
    AddCertificateExtension { source: x509_cert::builder::Error },

    #[snafu(display("failed to build certificate"))]
    BuildCertificate { source: x509_cert::builder::Error },

    #[snafu(display("failed to encode the to-be-signed certificate"))]
    EncodeTbsCertificate { source: x509_cert::der::Error },

    #[snafu(display("the issued certificate carries a malformed signature"))]
    DecodeSignature { source: signature::Error },

    #[snafu(display("the issued certificate signature does not verify against the issuer key"))]
    VerifySignature { source: signature::Error },

    #[snafu(display("failed to derive the issued certificate details"))]
    CertificateDetails { source: crate::cert::Error },
}

/// Signs client certificates for arbitrary public keys.
///
/// Every certificate carries exactly these extensions:
///
/// - BasicConstraints, critical, `CA = false`
/// - KeyUsage, critical, `digitalSignature` and `keyAgreement`
/// - SubjectAltName, non-critical, the principal's email as RFC 822 name and
///   a `urn:<YYYYMM>.<organization>` URI
/// - ExtendedKeyUsage, non-critical, `clientAuth` only
///
/// Certificates are signed with SHA-256 with RSA and verified against the
/// issuer certificate's public key before being handed out.
///
/// ```no_run
/// use devportal_certs::issuer::{CertificateIssuer, IssuerIdentity, IssuerResources};
///
/// # async fn run(public_key: x509_cert::spki::SubjectPublicKeyInfoOwned) {
/// let identity = IssuerIdentity::load(&IssuerResources::default())
///     .await
///     .expect("failed to load issuer identity");
/// let issuer = CertificateIssuer::new(identity);
///
/// let issued = issuer
///     .issue(
///         &public_key,
///         "CN=Jane Doe,O=ACME,serialNumber=key-1",
///         "jane@acme.example",
///         "ACME",
///     )
///     .expect("failed to issue certificate");
/// # }
/// ```
#[derive(Debug)]
pub struct CertificateIssuer {
    identity: IssuerIdentity,
    signing_key: SigningKey<Sha256>,
    verifying_key: VerifyingKey<Sha256>,
}

impl CertificateIssuer {
    pub fn new(identity: IssuerIdentity) -> Self {
        let signing_key = SigningKey::<Sha256>::new(identity.private_key().clone());
        let verifying_key = VerifyingKey::<Sha256>::new(identity.public_key().clone());

        Self {
            identity,
            signing_key,
            verifying_key,
        }
    }

    pub fn identity(&self) -> &IssuerIdentity {
        &self.identity
    }

    pub fn issuer_name(&self) -> &Name {
        self.identity.subject()
    }

    /// Issues a certificate which is valid from now on for
    /// [`CERTIFICATE_VALIDITY`].
    pub fn issue(
        &self,
        public_key: &SubjectPublicKeyInfoOwned,
        subject: &str,
        email: &str,
        organization: &str,
    ) -> Result<IssuedCertificate, IssueError> {
        self.issue_at(public_key, subject, email, organization, Timestamp::now())
    }

    /// Same as [`Self::issue`], but with an explicit issuance time.
    #[instrument(
        name = "issue_certificate",
        skip(self, public_key),
        fields(subject, email, organization)
    )]
    pub fn issue_at(
        &self,
        public_key: &SubjectPublicKeyInfoOwned,
        subject: &str,
        email: &str,
        organization: &str,
        now: Timestamp,
    ) -> Result<IssuedCertificate, IssueError> {
        let validity = validity_from(now)?;
        let subject_name: Name = subject.parse().context(ParseSubjectSnafu { subject })?;
        let serial_number = random_serial_number()?;

        let uri = subject_alternative_uri(now, organization);
        let subject_alternative_names = SubjectAltName(vec![
            GeneralName::Rfc822Name(
                Ia5String::new(email)
                    .context(EncodeSubjectAlternativeNameSnafu { value: email })?,
            ),
            GeneralName::UniformResourceIdentifier(
                Ia5String::new(&uri)
                    .context(EncodeSubjectAlternativeNameSnafu { value: &uri })?,
            ),
        ]);

        debug!(
            certificate.subject = %subject_name,
            certificate.not_after = %validity.not_after,
            certificate.not_before = %validity.not_before,
            certificate.serial = %serial_number,
            certificate.san.email = email,
            certificate.san.uri = %uri,
            certificate.signed_by.issuer = %self.issuer_name(),
            certificate.public_key.algorithm = %public_key.algorithm.oid,
            "creating and signing certificate"
        );

        // The manual profile adds no extensions on its own, the fixed set is
        // added below.
        let mut builder = CertificateBuilder::new(
            Profile::Manual {
                issuer: Some(self.issuer_name().clone()),
            },
            serial_number,
            validity,
            subject_name,
            public_key.clone(),
            &self.signing_key,
        )
        .context(CreateCertificateBuilderSnafu)?;

        builder
            .add_extension(&BasicConstraints {
                ca: false,
                path_len_constraint: None,
            })
            .context(AddCertificateExtensionSnafu)?;
        builder
            .add_extension(&KeyUsage(
                KeyUsages::DigitalSignature | KeyUsages::KeyAgreement,
            ))
            .context(AddCertificateExtensionSnafu)?;
        builder
            .add_extension(&subject_alternative_names)
            .context(AddCertificateExtensionSnafu)?;
        builder
            .add_extension(&ExtendedKeyUsage(vec![oid::KP_CLIENT_AUTH]))
            .context(AddCertificateExtensionSnafu)?;

        let certificate = builder
            .build::<Signature>()
            .context(BuildCertificateSnafu)?;
        self.verify(&certificate)?;

        CertificateDetails::new(certificate).context(CertificateDetailsSnafu)
    }

    /// Verifies the certificate signature against the issuer's public key.
    fn verify(&self, certificate: &Certificate) -> Result<(), IssueError> {
        let tbs_certificate = certificate
            .tbs_certificate
            .to_der()
            .context(EncodeTbsCertificateSnafu)?;
        let signature = Signature::try_from(certificate.signature.raw_bytes())
            .context(DecodeSignatureSnafu)?;

        self.verifying_key
            .verify(&tbs_certificate, &signature)
            .context(VerifySignatureSnafu)
    }
}

/// Builds the subject distinguished name of a client certificate:
/// `CN=<display name>,O=<organization>,serialNumber=<key id>`.
///
/// Every value is escaped, so user input can't smuggle in additional RDNs.
pub fn subject_dn(display_name: &str, organization: &str, key_id: &str) -> String {
    format!(
        "CN={},O={},serialNumber={}",
        escape_dn_value(display_name),
        escape_dn_value(organization),
        escape_dn_value(key_id)
    )
}

/// Escapes an attribute value as described in RFC 4514, section 2.4.
pub fn escape_dn_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);

    for (index, c) in value.chars().enumerate() {
        match c {
            '"' | '+' | ',' | ';' | '<' | '>' | '\\' | '=' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '#' | ' ' if index == 0 => {
                escaped.push('\\');
                escaped.push(c);
            }
            ' ' if index == last => escaped.push_str("\\ "),
            '\0' => escaped.push_str("\\00"),
            c => escaped.push(c),
        }
    }

    escaped
}

/// `urn:<YYYYMM>.<organization>` with spaces in the organization replaced by
/// hyphens. Bytes which may not appear in a URI are percent-encoded (RFC 3986,
/// section 2.1), so the result is always a valid IA5String.
fn subject_alternative_uri(now: Timestamp, organization: &str) -> String {
    let mut uri = format!("urn:{}.", now.strftime("%Y%m"));

    for byte in organization.replace(' ', "-").bytes() {
        if byte.is_ascii_alphanumeric() || URI_SAFE_SYMBOLS.contains(&byte) {
            uri.push(char::from(byte));
        } else {
            uri.push('%');
            uri.push_str(&hex::encode_upper([byte]));
        }
    }

    uri
}

// Unreserved characters, sub-delims, ':', '@' and '/' (RFC 3986, section 3.3)
const URI_SAFE_SYMBOLS: &[u8] = b"-._~!$&'()*+,;=:@/";

/// notBefore is `now` (whole seconds), notAfter is one
/// [`CERTIFICATE_VALIDITY`] later.
fn validity_from(now: Timestamp) -> Result<Validity, IssueError> {
    let not_before =
        Timestamp::from_second(now.as_second()).context(ComputeValiditySnafu { now })?;
    let not_after = not_before
        .checked_add(CERTIFICATE_VALIDITY)
        .context(ComputeValiditySnafu { now })?;

    Ok(Validity {
        not_before: to_x509_time(not_before).context(ParseValiditySnafu)?,
        not_after: to_x509_time(not_after).context(ParseValiditySnafu)?,
    })
}

// RFC 5280 mandates UTCTime for dates up to 2049
fn to_x509_time(timestamp: Timestamp) -> x509_cert::der::Result<Time> {
    let time = SystemTime::from(timestamp);
    match UtcTime::from_system_time(time) {
        Ok(utc_time) => Ok(Time::UtcTime(utc_time)),
        Err(_) => GeneralizedTime::from_system_time(time).map(Time::GeneralTime),
    }
}

/// 160 random bits with the sign bit cleared, so the DER encoding stays
/// within the 20 octets allowed by RFC 5280.
fn random_serial_number() -> Result<SerialNumber, IssueError> {
    let mut bytes = rand::random::<[u8; 20]>();
    bytes[0] &= 0x7f;

    SerialNumber::new(&bytes).context(CreateSerialNumberSnafu)
}
