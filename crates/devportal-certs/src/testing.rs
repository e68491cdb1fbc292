//! Fixtures for tests: a throwaway self-signed issuer, leaf keys and a
//! template to sign arbitrary (also non-compliant) client certificates.
//!
//! Keys are generated once per test binary. Nothing in here is suitable for
//! production use.
use std::{sync::LazyLock, time::Duration};

use jiff::Timestamp;
use rand_core::OsRng;
use rsa::{
    RsaPrivateKey,
    pkcs1v15::{Signature, SigningKey},
};
use sha2::Sha256;
use signature::{SignatureEncoding, Signer};
use x509_cert::{
    Certificate,
    builder::{Builder, CertificateBuilder, Profile},
    certificate::{TbsCertificate, Version},
    der::{
        Any, Decode, Encode,
        asn1::{BitString, OctetString, UtcTime},
    },
    ext::{
        AsExtension, Extension,
        pkix::{ExtendedKeyUsage, KeyUsage, KeyUsages},
    },
    name::Name,
    serial_number::SerialNumber,
    spki::{
        AlgorithmIdentifierOwned, EncodePublicKey, ObjectIdentifier, SubjectPublicKeyInfoOwned,
    },
    time::{Time, Validity},
};

use crate::{
    issuer::{CERTIFICATE_VALIDITY, CertificateIssuer, IssuerIdentity},
    keys::KeyPair,
    oid,
};

pub const ISSUER_SUBJECT: &str = "CN=Developer Portal Test Issuer,O=ACME Test";
pub const LEAF_SUBJECT: &str = "CN=Jane Doe,O=ACME Corp,serialNumber=key-1";

/// id-kp-serverAuth, which client certificates don't need.
pub const KP_SERVER_AUTH: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.1");

const KEY_SIZE: usize = 2048;

static ISSUER_RSA_KEY: LazyLock<RsaPrivateKey> =
    LazyLock::new(|| RsaPrivateKey::new(&mut OsRng, KEY_SIZE).expect("failed to create RSA key"));

static LEAF_RSA_KEY: LazyLock<RsaPrivateKey> =
    LazyLock::new(|| RsaPrivateKey::new(&mut OsRng, KEY_SIZE).expect("failed to create RSA key"));

static ISSUER_CERTIFICATE: LazyLock<Certificate> = LazyLock::new(|| {
    let signing_key = SigningKey::<Sha256>::new(ISSUER_RSA_KEY.clone());
    let subject: Name = ISSUER_SUBJECT.parse().expect("valid issuer subject");
    let validity = Validity::from_now(Duration::from_secs(10 * 365 * 24 * 60 * 60))
        .expect("valid issuer validity");

    CertificateBuilder::new(
        Profile::Root,
        SerialNumber::from(rand::random::<u64>()),
        validity,
        subject,
        public_key_info(&ISSUER_RSA_KEY.to_public_key()),
        &signing_key,
    )
    .expect("failed to create certificate builder")
    .build::<Signature>()
    .expect("failed to build issuer certificate")
});

static ISSUER: LazyLock<CertificateIssuer> =
    LazyLock::new(|| CertificateIssuer::new(issuer_identity()));

static LEAF_CERTIFICATE: LazyLock<Certificate> = LazyLock::new(|| {
    issuer()
        .issue(
            &leaf_public_key_info(),
            LEAF_SUBJECT,
            "jane@acme.example",
            "ACME Corp",
        )
        .expect("failed to issue leaf certificate")
        .certificate
});

/// The 2048-bit RSA key of the test issuer.
pub fn issuer_rsa_key() -> &'static RsaPrivateKey {
    &ISSUER_RSA_KEY
}

/// A 2048-bit RSA key, unrelated to the issuer.
pub fn leaf_rsa_key() -> &'static RsaPrivateKey {
    &LEAF_RSA_KEY
}

/// The self-signed certificate of the test issuer.
pub fn issuer_certificate() -> &'static Certificate {
    &ISSUER_CERTIFICATE
}

/// A fresh [`IssuerIdentity`] of the test issuer.
pub fn issuer_identity() -> IssuerIdentity {
    let private_key = issuer_rsa_key().clone();
    let key_pair = KeyPair::Rsa {
        public_key: private_key.to_public_key(),
        private_key,
    };

    IssuerIdentity::new(issuer_certificate().clone(), key_pair)
        .expect("the test issuer key belongs to its certificate")
}

pub fn issuer() -> &'static CertificateIssuer {
    &ISSUER
}

/// A client certificate for [`leaf_rsa_key`], issued by [`issuer`].
pub fn leaf_certificate() -> &'static Certificate {
    &LEAF_CERTIFICATE
}

pub fn leaf_public_key_info() -> SubjectPublicKeyInfoOwned {
    public_key_info(&leaf_rsa_key().to_public_key())
}

pub fn public_key_info(public_key: &impl EncodePublicKey) -> SubjectPublicKeyInfoOwned {
    let document = public_key
        .to_public_key_der()
        .expect("failed to encode public key");

    SubjectPublicKeyInfoOwned::from_der(document.as_bytes()).expect("failed to decode SPKI")
}

/// Signs arbitrary certificates with the test issuer key.
///
/// Unlike [`CertificateIssuer`], this allows any combination of extensions,
/// names, keys and validity.
#[derive(Clone, Debug)]
pub struct LeafTemplate {
    subject: Name,
    issuer: Name,
    public_key: SubjectPublicKeyInfoOwned,
    not_before: Timestamp,
    not_after: Timestamp,
    key_usage: Option<KeyUsage>,
    extended_key_usages: Option<Vec<ObjectIdentifier>>,
    extensions: Vec<Extension>,
}

impl LeafTemplate {
    /// A certificate for [`leaf_rsa_key`] without any extensions, valid from
    /// now on for [`CERTIFICATE_VALIDITY`].
    pub fn new() -> Self {
        let now = Timestamp::now();

        Self {
            subject: LEAF_SUBJECT.parse().expect("valid leaf subject"),
            issuer: issuer_certificate().tbs_certificate.subject.clone(),
            public_key: leaf_public_key_info(),
            not_before: now,
            not_after: now + CERTIFICATE_VALIDITY,
            key_usage: None,
            extended_key_usages: None,
            extensions: Vec::new(),
        }
    }

    /// A certificate satisfying the acceptance policy.
    pub fn client_auth() -> Self {
        Self::new()
            .key_usage(KeyUsage(
                KeyUsages::DigitalSignature | KeyUsages::KeyAgreement,
            ))
            .extended_key_usages(&[oid::KP_CLIENT_AUTH])
    }

    pub fn subject(mut self, subject: Name) -> Self {
        self.subject = subject;
        self
    }

    pub fn issuer(mut self, issuer: Name) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn public_key(mut self, public_key: SubjectPublicKeyInfoOwned) -> Self {
        self.public_key = public_key;
        self
    }

    pub fn validity(mut self, not_before: Timestamp, not_after: Timestamp) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    pub fn key_usage(mut self, key_usage: KeyUsage) -> Self {
        self.key_usage = Some(key_usage);
        self
    }

    pub fn extended_key_usages(mut self, usages: &[ObjectIdentifier]) -> Self {
        self.extended_key_usages = Some(usages.to_vec());
        self
    }

    pub fn extension(mut self, extension: impl AsExtension) -> Self {
        let extension = extension
            .to_extension(&self.subject, &self.extensions)
            .expect("failed to encode extension");
        self.extensions.push(extension);
        self
    }

    /// Adds an extension with arbitrary (possibly malformed) DER content.
    pub fn raw_extension(mut self, extn_id: ObjectIdentifier, der: Vec<u8>) -> Self {
        self.extensions.push(Extension {
            extn_id,
            critical: false,
            extn_value: OctetString::new(der).expect("valid octet string"),
        });
        self
    }

    /// Signs the certificate with SHA-256 with RSA and the test issuer key.
    pub fn sign(self) -> Certificate {
        let mut extensions = Vec::new();
        if let Some(key_usage) = self.key_usage {
            extensions.push(
                key_usage
                    .to_extension(&self.subject, &extensions)
                    .expect("failed to encode KeyUsage"),
            );
        }
        if let Some(usages) = self.extended_key_usages {
            extensions.push(
                ExtendedKeyUsage(usages)
                    .to_extension(&self.subject, &extensions)
                    .expect("failed to encode ExtendedKeyUsage"),
            );
        }
        extensions.extend(self.extensions);

        let algorithm = AlgorithmIdentifierOwned {
            oid: oid::SHA256_WITH_RSA,
            parameters: Some(Any::null()),
        };

        let tbs_certificate = TbsCertificate {
            version: Version::V3,
            serial_number: SerialNumber::from(rand::random::<u64>()),
            signature: algorithm.clone(),
            issuer: self.issuer,
            validity: Validity {
                not_before: to_time(self.not_before),
                not_after: to_time(self.not_after),
            },
            subject: self.subject,
            subject_public_key_info: self.public_key,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: (!extensions.is_empty()).then_some(extensions),
        };

        let tbs_der = tbs_certificate.to_der().expect("failed to encode TBS");
        let signing_key = SigningKey::<Sha256>::new(issuer_rsa_key().clone());
        let signature: Signature = signing_key.sign(&tbs_der);

        Certificate {
            tbs_certificate,
            signature_algorithm: algorithm,
            signature: BitString::from_bytes(&signature.to_vec()).expect("valid signature bits"),
        }
    }
}

impl Default for LeafTemplate {
    fn default() -> Self {
        Self::new()
    }
}

fn to_time(timestamp: Timestamp) -> Time {
    let timestamp = Timestamp::from_second(timestamp.as_second()).expect("valid timestamp");
    let time = UtcTime::from_system_time(std::time::SystemTime::from(timestamp))
        .expect("time is representable as UTCTime");
    Time::UtcTime(time)
}
