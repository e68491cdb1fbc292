//! OpenSSL "traditional" PEM encryption, as written by `openssl genrsa -aes256`
//! or `openssl rsa -des3`.
//!
//! The PEM block carries two headers:
//!
//! ```text
//! Proc-Type: 4,ENCRYPTED
//! DEK-Info: AES-256-CBC,6F0F1E3E5A2B0C6D7E8F9A0B1C2D3E4F
//! ```
//!
//! The key is derived with `EVP_BytesToKey` (MD5, a single iteration) from the
//! password and the first eight bytes of the IV, which double as the salt.
use std::str::FromStr;

use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use md5::{Digest, Md5};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use zeroize::Zeroizing;

const SALT_LEN: usize = 8;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the DEK-Info header is missing or malformed: {dek_info:?}"))]
    MalformedDekInfo { dek_info: String },

    #[snafu(display("unsupported legacy PEM cipher {cipher:?}"))]
    UnsupportedCipher { cipher: String },

    #[snafu(display("failed to decode the IV from the DEK-Info header"))]
    DecodeIv { source: hex::FromHexError },

    #[snafu(display("the {cipher} IV must be {expected} bytes long, got {actual}"))]
    InvalidIvLength {
        cipher: LegacyCipher,
        expected: usize,
        actual: usize,
    },

    #[snafu(display("failed to initialize {cipher} cipher"))]
    InitCipher {
        source: cbc::cipher::InvalidLength,
        cipher: LegacyCipher,
    },

    #[snafu(display("failed to decrypt key, the password might be wrong"))]
    Decrypt,
}

/// The block ciphers OpenSSL offers for traditional PEM encryption.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum LegacyCipher {
    #[strum(serialize = "AES-128-CBC")]
    Aes128Cbc,

    #[strum(serialize = "AES-192-CBC")]
    Aes192Cbc,

    #[strum(serialize = "AES-256-CBC")]
    Aes256Cbc,

    #[strum(serialize = "DES-EDE3-CBC")]
    DesEde3Cbc,
}

impl LegacyCipher {
    fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::Aes192Cbc | Self::DesEde3Cbc => 24,
            Self::Aes256Cbc => 32,
        }
    }

    fn iv_len(self) -> usize {
        match self {
            Self::Aes128Cbc | Self::Aes192Cbc | Self::Aes256Cbc => 16,
            Self::DesEde3Cbc => 8,
        }
    }
}

/// The parsed value of a `DEK-Info` header.
#[derive(Debug)]
struct DekInfo {
    cipher: LegacyCipher,
    iv: Vec<u8>,
}

impl FromStr for DekInfo {
    type Err = Error;

    fn from_str(dek_info: &str) -> Result<Self, Self::Err> {
        let (cipher, iv) = dek_info
            .split_once(',')
            .with_context(|| MalformedDekInfoSnafu { dek_info })?;

        let cipher = cipher.trim();
        let cipher = LegacyCipher::from_str(cipher)
            .ok()
            .with_context(|| UnsupportedCipherSnafu { cipher })?;

        let iv = hex::decode(iv.trim()).context(DecodeIvSnafu)?;
        ensure!(
            iv.len() == cipher.iv_len(),
            InvalidIvLengthSnafu {
                cipher,
                expected: cipher.iv_len(),
                actual: iv.len(),
            }
        );

        Ok(Self { cipher, iv })
    }
}

/// Derives the symmetric key like OpenSSL's `EVP_BytesToKey` with MD5 and a
/// single round.
fn derive_key(password: &[u8], salt: &[u8], key_len: usize) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(Vec::with_capacity(key_len + 16));
    let mut previous: Option<Zeroizing<Vec<u8>>> = None;

    while key.len() < key_len {
        let mut hasher = Md5::new();
        if let Some(previous) = &previous {
            hasher.update(previous.as_slice());
        }
        hasher.update(password);
        hasher.update(salt);

        let block = Zeroizing::new(hasher.finalize().to_vec());
        key.extend_from_slice(&block);
        previous = Some(block);
    }

    key.truncate(key_len);
    key
}

/// Decrypts the DER body of a traditional encrypted PEM block.
pub(super) fn decrypt(
    dek_info: &str,
    password: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let DekInfo { cipher, iv } = dek_info.parse()?;
    let key = derive_key(password, &iv[..SALT_LEN], cipher.key_len());

    let plaintext = match cipher {
        LegacyCipher::Aes128Cbc => cbc::Decryptor::<aes::Aes128>::new_from_slices(&key, &iv)
            .context(InitCipherSnafu { cipher })?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        LegacyCipher::Aes192Cbc => cbc::Decryptor::<aes::Aes192>::new_from_slices(&key, &iv)
            .context(InitCipherSnafu { cipher })?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        LegacyCipher::Aes256Cbc => cbc::Decryptor::<aes::Aes256>::new_from_slices(&key, &iv)
            .context(InitCipherSnafu { cipher })?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        LegacyCipher::DesEde3Cbc => cbc::Decryptor::<des::TdesEde3>::new_from_slices(&key, &iv)
            .context(InitCipherSnafu { cipher })?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
    }
    .map_err(|_| Error::Decrypt)?;

    Ok(Zeroizing::new(plaintext))
}

/// Produces a traditional encrypted PEM block, the way `openssl genrsa -aes256`
/// would. Only used to build test fixtures.
#[cfg(any(test, feature = "testing"))]
pub fn encrypt_legacy_pem(
    label: &str,
    der: &[u8],
    cipher: LegacyCipher,
    password: &[u8],
) -> String {
    use base64::Engine;
    use cbc::cipher::BlockEncryptMut;

    let iv: Vec<u8> = (0..cipher.iv_len()).map(|_| rand::random::<u8>()).collect();
    let key = derive_key(password, &iv[..SALT_LEN], cipher.key_len());

    let ciphertext = match cipher {
        LegacyCipher::Aes128Cbc => cbc::Encryptor::<aes::Aes128>::new_from_slices(&key, &iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(der)),
        LegacyCipher::Aes192Cbc => cbc::Encryptor::<aes::Aes192>::new_from_slices(&key, &iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(der)),
        LegacyCipher::Aes256Cbc => cbc::Encryptor::<aes::Aes256>::new_from_slices(&key, &iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(der)),
        LegacyCipher::DesEde3Cbc => cbc::Encryptor::<des::TdesEde3>::new_from_slices(&key, &iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(der)),
    }
    .expect("key and IV lengths are derived from the cipher");

    let body = base64::engine::general_purpose::STANDARD.encode(ciphertext);
    let mut pem = format!(
        "-----BEGIN {label}-----\nProc-Type: 4,ENCRYPTED\nDEK-Info: {cipher},{iv}\n\n",
        iv = hex::encode_upper(&iv)
    );
    for line in body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {label}-----\n"));
    pem
}
