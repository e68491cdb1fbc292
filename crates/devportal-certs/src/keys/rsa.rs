//! Abstraction layer around the [`rsa`] crate. This module decodes RSA keys
//! from their PKCS#1 and PKCS#8 encodings.
//!
//! It should be noted, that the crate is currently vulnerable to the recently
//! discovered Marvin attack. Keys decoded here are only ever used for signing,
//! never for decryption. See:
//!
//! - <https://people.redhat.com/~hkario/marvin/>
//! - <https://rustsec.org/advisories/RUSTSEC-2023-0071.html>
use rsa::{
    BigUint, RsaPrivateKey, RsaPublicKey,
    pkcs1::{DecodeRsaPrivateKey, der::Decode},
    traits::PublicKeyParts,
};
use snafu::{ResultExt, Snafu};
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::keys::KeyPair;

/// The largest modulus accepted when decoding public keys. The [`rsa`] crate
/// refuses anything above 4096 bits by default, which is too strict for keys
/// found in uploaded certificates.
pub const MAX_MODULUS_BITS: usize = 16384;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to decode PKCS8 encoded RSA private key"))]
    DecodePkcs8PrivateKey { source: pkcs8::Error },

    #[snafu(display("failed to decode PKCS1 encoded RSA private key"))]
    DecodePkcs1PrivateKey { source: rsa::pkcs1::Error },

    #[snafu(display("failed to decode PKCS1 encoded RSA public key"))]
    DecodePkcs1PublicKey { source: rsa::pkcs1::der::Error },

    #[snafu(display("invalid RSA public key"))]
    InvalidPublicKey { source: rsa::Error },
}

/// Builds a [`KeyPair`] from a PKCS#8 `PrivateKeyInfo` with the
/// `rsaEncryption` algorithm.
pub fn key_pair_from_pkcs8(info: pkcs8::PrivateKeyInfo<'_>) -> Result<KeyPair> {
    let private_key = RsaPrivateKey::try_from(info).context(DecodePkcs8PrivateKeySnafu)?;
    Ok(key_pair(private_key))
}

/// Builds a [`KeyPair`] from a DER-encoded PKCS#1 `RSAPrivateKey`.
pub fn key_pair_from_pkcs1(der: &[u8]) -> Result<KeyPair> {
    let private_key = RsaPrivateKey::from_pkcs1_der(der).context(DecodePkcs1PrivateKeySnafu)?;
    Ok(key_pair(private_key))
}

/// Decodes a DER-encoded PKCS#1 `RSAPublicKey`.
pub fn public_key_from_pkcs1(der: &[u8]) -> Result<RsaPublicKey> {
    let public_key = rsa::pkcs1::RsaPublicKey::from_der(der).context(DecodePkcs1PublicKeySnafu)?;
    public_key_from_parts(
        public_key.modulus.as_bytes(),
        public_key.public_exponent.as_bytes(),
    )
}

/// Decodes the RSA public key carried inside a `SubjectPublicKeyInfo`.
pub fn public_key_from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<RsaPublicKey> {
    public_key_from_pkcs1(spki.subject_public_key.raw_bytes())
}

/// The size of the modulus in bits.
pub fn modulus_bits(public_key: &RsaPublicKey) -> usize {
    public_key.n().bits()
}

/// The modulus size in bits of the RSA key inside a `SubjectPublicKeyInfo`.
///
/// Unlike [`public_key_from_spki`] this applies no limits, so it also works
/// for keys the [`rsa`] crate refuses to instantiate.
pub fn modulus_bits_of_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<usize> {
    let public_key = rsa::pkcs1::RsaPublicKey::from_der(spki.subject_public_key.raw_bytes())
        .context(DecodePkcs1PublicKeySnafu)?;

    let modulus = public_key.modulus.as_bytes();
    Ok(match modulus.first() {
        Some(first) => modulus.len() * 8 - first.leading_zeros() as usize,
        None => 0,
    })
}

fn public_key_from_parts(modulus: &[u8], exponent: &[u8]) -> Result<RsaPublicKey> {
    RsaPublicKey::new_with_max_size(
        BigUint::from_bytes_be(modulus),
        BigUint::from_bytes_be(exponent),
        MAX_MODULUS_BITS,
    )
    .context(InvalidPublicKeySnafu)
}

fn key_pair(private_key: RsaPrivateKey) -> KeyPair {
    let public_key = private_key.to_public_key();
    KeyPair::Rsa {
        private_key,
        public_key,
    }
}

#[cfg(test)]
mod tests {
    use rsa::pkcs1::EncodeRsaPublicKey;

    use super::*;
    use crate::testing;

    #[test]
    fn public_key_round_trips_through_pkcs1() {
        let expected = testing::leaf_rsa_key().to_public_key();
        let der = expected.to_pkcs1_der().unwrap();

        let public_key = public_key_from_pkcs1(der.as_bytes()).unwrap();
        assert_eq!(public_key, expected);
        assert_eq!(modulus_bits(&public_key), 2048);
    }

    #[test]
    fn modulus_bits_without_limits() {
        let public_key = testing::leaf_rsa_key().to_public_key();
        let spki = testing::public_key_info(&public_key);

        assert_eq!(modulus_bits_of_spki(&spki).unwrap(), 2048);
    }

    #[test]
    fn garbage_is_not_a_public_key() {
        let err = public_key_from_pkcs1(&[0x30, 0x03, 0x02, 0x01, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            Error::DecodePkcs1PublicKey { .. } | Error::InvalidPublicKey { .. }
        ));
    }
}
