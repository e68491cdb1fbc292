//! Contains primitives to decode asymmetric key material from PEM text.
//!
//! A single PEM block containing a private key can carry one of four object
//! shapes, modelled by [`KeyMaterial`]:
//!
//! - an unencrypted PKCS#8 `PrivateKeyInfo` (`BEGIN PRIVATE KEY`), e.g.
//!   produced by `openssl genpkey -algorithm rsa`,
//! - a password protected PKCS#8 structure (`BEGIN ENCRYPTED PRIVATE KEY`),
//! - a classic OpenSSL key pair protected by a password, recognizable by the
//!   `Proc-Type: 4,ENCRYPTED` and `DEK-Info` headers,
//! - a classic unencrypted OpenSSL key pair (`BEGIN RSA PRIVATE KEY` or
//!   `BEGIN EC PRIVATE KEY`), e.g. produced by `openssl genrsa`.
//!
//! Regardless of the shape, decoding always yields a [`KeyPair`] holding
//! both halves of the key.
//!
//! ```no_run
//! use devportal_certs::keys;
//!
//! # let pem = "";
//! let key_pair = keys::decode_private_key(pem, Some("secret")).unwrap();
//! let spki = key_pair.public_key_info().unwrap();
//! ```
use std::fmt::Debug;

use pem::Pem;
use pkcs8::{EncryptedPrivateKeyInfo, PrivateKeyInfo};
use snafu::{ResultExt, Snafu};
use tracing::{debug, instrument};
use x509_cert::{
    der::{Decode, oid::ObjectIdentifier},
    spki::{EncodePublicKey, SubjectPublicKeyInfoOwned},
};
use zeroize::Zeroizing;

use crate::oid;

pub mod ecdsa;
mod legacy;
pub mod rsa;

#[cfg(any(test, feature = "testing"))]
pub use legacy::{LegacyCipher, encrypt_legacy_pem};

pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";
pub const ENCRYPTED_PRIVATE_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";
pub const RSA_PRIVATE_KEY_LABEL: &str = "RSA PRIVATE KEY";
pub const EC_PRIVATE_KEY_LABEL: &str = "EC PRIVATE KEY";
pub const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";
pub const RSA_PUBLIC_KEY_LABEL: &str = "RSA PUBLIC KEY";

pub type Result<T, E = KeyParseError> = std::result::Result<T, E>;

/// Error variants which can be encountered when decoding key material or
/// certificates supplied as PEM text.
///
/// All of these are caused by the input, not by the server.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum KeyParseError {
    #[snafu(display("unable to read anything PEM-encoded from the input"))]
    ParsePem { source: pem::PemError },

    #[snafu(display("unknown object type \"{label}\" when decoding {expected}"))]
    UnsupportedObject {
        label: String,
        expected: &'static str,
    },

    #[snafu(display("failed to decode PKCS8 private key info"))]
    DecodePrivateKeyInfo { source: x509_cert::der::Error },

    #[snafu(display("failed to decode PKCS8 encrypted private key info"))]
    DecodeEncryptedPrivateKeyInfo { source: x509_cert::der::Error },

    #[snafu(display("failed to decrypt PKCS8 private key, the password might be wrong"))]
    DecryptPrivateKeyInfo { source: pkcs8::Error },

    #[snafu(display("failed to decrypt legacy encrypted key pair"))]
    DecryptKeyPair { source: legacy::Error },

    #[snafu(display("unsupported private key algorithm {oid}"))]
    UnsupportedKeyAlgorithm { oid: ObjectIdentifier },

    #[snafu(display("failed to decode RSA key"))]
    Rsa { source: rsa::Error },

    #[snafu(display("failed to decode EC key"))]
    Ecdsa { source: ecdsa::Error },

    #[snafu(display("cannot instantiate public key"))]
    DecodePublicKey { source: x509_cert::der::Error },

    #[snafu(display("failed to encode public key as SubjectPublicKeyInfo"))]
    EncodePublicKey { source: x509_cert::spki::Error },

    #[snafu(display("cannot instantiate certificate"))]
    DecodeCertificate { source: x509_cert::der::Error },
}

/// The legacy (pre PKCS#8) key pair encodings understood by OpenSSL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum LegacyKeyAlgorithm {
    /// PKCS#1 `RSAPrivateKey`
    #[strum(serialize = "RSA")]
    Rsa,

    /// SEC1 `ECPrivateKey`
    #[strum(serialize = "EC")]
    Ec,
}

/// The object found inside a private key PEM block.
///
/// Produced by [`KeyMaterial::from_pem`] and only ever consumed by
/// [`KeyMaterial::into_key_pair`], it never outlives a single decode call.
pub enum KeyMaterial {
    RawPrivateKey(Zeroizing<Vec<u8>>),
    EncryptedPrivateKey(Vec<u8>),
    EncryptedKeyPair {
        algorithm: LegacyKeyAlgorithm,
        dek_info: String,
        der: Vec<u8>,
    },
    PlainKeyPair {
        algorithm: LegacyKeyAlgorithm,
        der: Zeroizing<Vec<u8>>,
    },
}

impl Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RawPrivateKey(_) => f.write_str("RawPrivateKey"),
            Self::EncryptedPrivateKey(_) => f.write_str("EncryptedPrivateKey"),
            Self::EncryptedKeyPair {
                algorithm,
                dek_info,
                ..
            } => f
                .debug_struct("EncryptedKeyPair")
                .field("algorithm", algorithm)
                .field("dek_info", dek_info)
                .finish_non_exhaustive(),
            Self::PlainKeyPair { algorithm, .. } => f
                .debug_struct("PlainKeyPair")
                .field("algorithm", algorithm)
                .finish_non_exhaustive(),
        }
    }
}

impl KeyMaterial {
    /// Classifies a parsed PEM block by its label and headers.
    pub fn from_pem(pem: Pem) -> Result<Self> {
        let label = pem.tag().to_owned();
        let algorithm = match label.as_str() {
            PRIVATE_KEY_LABEL => return Ok(Self::RawPrivateKey(pem.into_contents().into())),
            ENCRYPTED_PRIVATE_KEY_LABEL => {
                return Ok(Self::EncryptedPrivateKey(pem.into_contents()));
            }
            RSA_PRIVATE_KEY_LABEL => LegacyKeyAlgorithm::Rsa,
            EC_PRIVATE_KEY_LABEL => LegacyKeyAlgorithm::Ec,
            _ => {
                return UnsupportedObjectSnafu {
                    label,
                    expected: "private key",
                }
                .fail();
            }
        };

        let is_encrypted = pem
            .headers()
            .get("Proc-Type")
            .is_some_and(|proc_type| proc_type.split(',').any(|p| p.trim() == "ENCRYPTED"));

        if is_encrypted {
            let dek_info = pem
                .headers()
                .get("DEK-Info")
                .unwrap_or_default()
                .to_owned();

            Ok(Self::EncryptedKeyPair {
                algorithm,
                dek_info,
                der: pem.into_contents(),
            })
        } else {
            Ok(Self::PlainKeyPair {
                algorithm,
                der: pem.into_contents().into(),
            })
        }
    }

    /// Decrypts (if needed) and decodes the object into a [`KeyPair`].
    ///
    /// A missing password is treated like an empty one.
    pub fn into_key_pair(self, password: Option<&str>) -> Result<KeyPair> {
        let password = password.unwrap_or_default();

        match self {
            Self::RawPrivateKey(der) => KeyPair::from_pkcs8_der(&der),
            Self::EncryptedPrivateKey(der) => {
                let encrypted = EncryptedPrivateKeyInfo::from_der(&der)
                    .context(DecodeEncryptedPrivateKeyInfoSnafu)?;
                let document = encrypted
                    .decrypt(password)
                    .context(DecryptPrivateKeyInfoSnafu)?;

                KeyPair::from_pkcs8_der(document.as_bytes())
            }
            Self::EncryptedKeyPair {
                algorithm,
                dek_info,
                der,
            } => {
                let der = legacy::decrypt(&dek_info, password.as_bytes(), &der)
                    .context(DecryptKeyPairSnafu)?;
                KeyPair::from_legacy_der(algorithm, &der)
            }
            Self::PlainKeyPair { algorithm, der } => KeyPair::from_legacy_der(algorithm, &der),
        }
    }
}

/// A decoded private key together with its public half.
pub enum KeyPair {
    Rsa {
        private_key: ::rsa::RsaPrivateKey,
        public_key: ::rsa::RsaPublicKey,
    },
    EcP256 {
        secret_key: p256::SecretKey,
        public_key: p256::PublicKey,
    },
    EcP384 {
        secret_key: p384::SecretKey,
        public_key: p384::PublicKey,
    },
}

// Never print private key components.
impl Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm_name())
            .field("size", &self.key_size())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Decodes an unencrypted PKCS#8 `PrivateKeyInfo`.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info = PrivateKeyInfo::from_der(der).context(DecodePrivateKeyInfoSnafu)?;
        let algorithm = info.algorithm.oid;

        if algorithm == oid::RSA_ENCRYPTION {
            rsa::key_pair_from_pkcs8(info).context(RsaSnafu)
        } else if algorithm == oid::EC_PUBLIC_KEY {
            ecdsa::key_pair_from_pkcs8(info).context(EcdsaSnafu)
        } else {
            UnsupportedKeyAlgorithmSnafu { oid: algorithm }.fail()
        }
    }

    /// Decodes a (decrypted) classic OpenSSL key pair.
    pub fn from_legacy_der(algorithm: LegacyKeyAlgorithm, der: &[u8]) -> Result<Self> {
        match algorithm {
            LegacyKeyAlgorithm::Rsa => rsa::key_pair_from_pkcs1(der).context(RsaSnafu),
            LegacyKeyAlgorithm::Ec => ecdsa::key_pair_from_sec1(der).context(EcdsaSnafu),
        }
    }

    /// The name of the algorithm such as `RSA` or `EC`.
    pub fn algorithm_name(&self) -> &'static str {
        match self {
            Self::Rsa { .. } => "RSA",
            Self::EcP256 { .. } | Self::EcP384 { .. } => "EC",
        }
    }

    /// The key length in bits, which is the modulus size for RSA and the
    /// curve order size for EC keys.
    pub fn key_size(&self) -> usize {
        match self {
            Self::Rsa { public_key, .. } => rsa::modulus_bits(public_key),
            Self::EcP256 { .. } => 256,
            Self::EcP384 { .. } => 384,
        }
    }

    /// Returns the RSA private key, if this is an RSA key pair.
    pub fn rsa_private_key(&self) -> Option<&::rsa::RsaPrivateKey> {
        match self {
            Self::Rsa { private_key, .. } => Some(private_key),
            _ => None,
        }
    }

    /// Returns the RSA public key, if this is an RSA key pair.
    pub fn rsa_public_key(&self) -> Option<&::rsa::RsaPublicKey> {
        match self {
            Self::Rsa { public_key, .. } => Some(public_key),
            _ => None,
        }
    }

    /// Encodes the public half as a `SubjectPublicKeyInfo`.
    pub fn public_key_info(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let document = match self {
            Self::Rsa { public_key, .. } => public_key.to_public_key_der(),
            Self::EcP256 { public_key, .. } => public_key.to_public_key_der(),
            Self::EcP384 { public_key, .. } => public_key.to_public_key_der(),
        }
        .context(EncodePublicKeySnafu)?;

        SubjectPublicKeyInfoOwned::from_der(document.as_bytes()).context(DecodePublicKeySnafu)
    }
}

/// Decodes a PEM-encoded private key in any of the four supported shapes.
///
/// An empty password is treated as no password.
#[instrument(name = "decode_private_key", skip_all)]
pub fn decode_private_key(input: &str, password: Option<&str>) -> Result<KeyPair> {
    let password = password.filter(|password| !password.is_empty());
    let material = KeyMaterial::from_pem(parse_pem(input)?)?;
    debug!(key.material = ?material, "decoded private key PEM block");

    material.into_key_pair(password)
}

/// Decodes a PEM-encoded public key, either a `SubjectPublicKeyInfo` or a
/// PKCS#1 `RSAPublicKey`.
#[instrument(name = "decode_public_key", skip_all)]
pub fn decode_public_key(input: &str) -> Result<SubjectPublicKeyInfoOwned> {
    let pem = parse_pem(input)?;

    match pem.tag() {
        PUBLIC_KEY_LABEL => {
            SubjectPublicKeyInfoOwned::from_der(pem.contents()).context(DecodePublicKeySnafu)
        }
        RSA_PUBLIC_KEY_LABEL => {
            let public_key = rsa::public_key_from_pkcs1(pem.contents()).context(RsaSnafu)?;
            let document = public_key
                .to_public_key_der()
                .context(EncodePublicKeySnafu)?;

            SubjectPublicKeyInfoOwned::from_der(document.as_bytes()).context(DecodePublicKeySnafu)
        }
        label => UnsupportedObjectSnafu {
            label,
            expected: "public key",
        }
        .fail(),
    }
}

/// Parses the first PEM block of the (whitespace normalized) input.
pub(crate) fn parse_pem(input: &str) -> Result<Pem> {
    pem::parse(normalize_pem(input)).context(ParsePemSnafu)
}

/// Removes indentation and trailing whitespace from every line. PEM text
/// pasted into web forms or JSON payloads regularly picks these up.
pub fn normalize_pem(input: &str) -> String {
    input
        .trim()
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
}
