//! Abstraction layer around the [`p256`] and [`p384`] crates. This module
//! decodes EC private keys on the NIST P-256 and P-384 curves.
use snafu::{ResultExt, Snafu};
use x509_cert::der::oid::ObjectIdentifier;

use crate::{keys::KeyPair, oid};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the EC private key does not name its curve"))]
    MissingCurve { source: x509_cert::spki::Error },

    #[snafu(display("unsupported elliptic curve {curve}"))]
    UnsupportedCurve { curve: ObjectIdentifier },

    #[snafu(display("failed to decode PKCS8 encoded EC private key"))]
    DecodePkcs8PrivateKey { source: pkcs8::Error },

    #[snafu(display("failed to decode SEC1 encoded EC private key on any supported curve"))]
    DecodeSec1PrivateKey { source: p256::elliptic_curve::Error },
}

/// Builds a [`KeyPair`] from a PKCS#8 `PrivateKeyInfo` with the
/// `id-ecPublicKey` algorithm. The curve is taken from the algorithm
/// parameters.
pub fn key_pair_from_pkcs8(info: pkcs8::PrivateKeyInfo<'_>) -> Result<KeyPair> {
    let curve = info.algorithm.parameters_oid().context(MissingCurveSnafu)?;

    if curve == oid::SECP256R1 {
        let secret_key = p256::SecretKey::try_from(info).context(DecodePkcs8PrivateKeySnafu)?;
        Ok(KeyPair::EcP256 {
            public_key: secret_key.public_key(),
            secret_key,
        })
    } else if curve == oid::SECP384R1 {
        let secret_key = p384::SecretKey::try_from(info).context(DecodePkcs8PrivateKeySnafu)?;
        Ok(KeyPair::EcP384 {
            public_key: secret_key.public_key(),
            secret_key,
        })
    } else {
        UnsupportedCurveSnafu { curve }.fail()
    }
}

/// Builds a [`KeyPair`] from a DER-encoded SEC1 `ECPrivateKey`.
///
/// The curve parameters are optional in SEC1, so every supported curve is
/// tried in turn.
pub fn key_pair_from_sec1(der: &[u8]) -> Result<KeyPair> {
    if let Ok(secret_key) = p256::SecretKey::from_sec1_der(der) {
        return Ok(KeyPair::EcP256 {
            public_key: secret_key.public_key(),
            secret_key,
        });
    }

    let secret_key = p384::SecretKey::from_sec1_der(der).context(DecodeSec1PrivateKeySnafu)?;
    Ok(KeyPair::EcP384 {
        public_key: secret_key.public_key(),
        secret_key,
    })
}
