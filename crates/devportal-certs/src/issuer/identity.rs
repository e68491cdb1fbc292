use std::path::{Path, PathBuf};

use regex::Regex;
use rsa::{RsaPrivateKey, RsaPublicKey};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::{debug, info, instrument};
use x509_cert::{Certificate, name::Name};

use crate::{
    cert,
    issuer::{
        DEFAULT_ISSUER_CERTIFICATE_PATTERN, DEFAULT_ISSUER_KEY_DIRECTORY,
        DEFAULT_ISSUER_PRIVATE_KEY_PATTERN,
    },
    keys::{self, KeyPair, KeyParseError},
};

/// Defines all error variants which can occur when loading the issuer
/// identity. Every one of them is fatal at process start.
#[derive(Debug, Snafu)]
pub enum IdentityError {
    #[snafu(display("invalid resource name pattern {pattern:?}"))]
    InvalidPattern {
        source: regex::Error,
        pattern: String,
    },

    #[snafu(display("failed to list the key directory {directory:?}"))]
    ReadDirectory {
        source: std::io::Error,
        directory: PathBuf,
    },

    #[snafu(display("no file in {directory:?} matches the pattern {pattern:?}"))]
    ResourceNotFound { directory: PathBuf, pattern: String },

    #[snafu(display("failed to read {path:?}"))]
    ReadResource {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to decode the issuer certificate"))]
    DecodeCertificate { source: KeyParseError },

    #[snafu(display("failed to decode the issuer private key"))]
    DecodePrivateKey { source: KeyParseError },

    #[snafu(display("the issuer private key must be an RSA key, got {algorithm}"))]
    UnsupportedKeyAlgorithm { algorithm: &'static str },

    #[snafu(display("failed to decode the issuer certificate public key"))]
    DecodeCertificatePublicKey { source: keys::rsa::Error },

    #[snafu(display(
        "the issuer private key does not belong to the issuer certificate {subject}"
    ))]
    KeyMismatch { subject: String },
}

/// Describes where the issuer certificate and private key are located.
///
/// Both are found by a glob-style file name pattern (`*` and `?` wildcards)
/// inside [`Self::directory`]. The pattern may include a sub directory, e.g.
/// `2025/issuer-cert*.pem`. When multiple files match, the last one in
/// lexicographic order is used, so date-stamped files roll forward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuerResources {
    pub directory: PathBuf,
    pub certificate_pattern: String,
    pub private_key_pattern: String,
    pub private_key_password: Option<String>,
}

impl Default for IssuerResources {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_ISSUER_KEY_DIRECTORY),
            certificate_pattern: DEFAULT_ISSUER_CERTIFICATE_PATTERN.to_owned(),
            private_key_pattern: DEFAULT_ISSUER_PRIVATE_KEY_PATTERN.to_owned(),
            private_key_password: None,
        }
    }
}

/// The certificate and RSA private key every issued certificate is signed
/// with.
///
/// It is loaded exactly once at process start and is read-only afterwards.
pub struct IssuerIdentity {
    certificate: Certificate,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl std::fmt::Debug for IssuerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerIdentity")
            .field("subject", &self.subject().to_string())
            .finish_non_exhaustive()
    }
}

impl IssuerIdentity {
    /// Pairs the issuer certificate with its private key. The key must be an
    /// RSA key whose public half is the certificate's subject public key.
    pub fn new(certificate: Certificate, key_pair: KeyPair) -> Result<Self, IdentityError> {
        let algorithm = key_pair.algorithm_name();
        let KeyPair::Rsa {
            private_key,
            public_key,
        } = key_pair
        else {
            return UnsupportedKeyAlgorithmSnafu { algorithm }.fail();
        };

        let certificate_key =
            keys::rsa::public_key_from_spki(&certificate.tbs_certificate.subject_public_key_info)
                .context(DecodeCertificatePublicKeySnafu)?;

        ensure!(
            certificate_key == public_key,
            KeyMismatchSnafu {
                subject: certificate.tbs_certificate.subject.to_string()
            }
        );

        Ok(Self {
            certificate,
            private_key,
            public_key,
        })
    }

    /// Decodes the issuer identity from PEM text.
    pub fn from_pem(
        certificate_pem: &str,
        private_key_pem: &str,
        password: Option<&str>,
    ) -> Result<Self, IdentityError> {
        let certificate =
            cert::decode_certificate(certificate_pem).context(DecodeCertificateSnafu)?;
        let key_pair =
            keys::decode_private_key(private_key_pem, password).context(DecodePrivateKeySnafu)?;

        Self::new(certificate, key_pair)
    }

    /// Locates, reads and decodes the issuer certificate and private key.
    #[instrument(name = "load_issuer_identity", skip(resources), fields(directory = ?resources.directory))]
    pub async fn load(resources: &IssuerResources) -> Result<Self, IdentityError> {
        let certificate_path =
            find_resource(&resources.directory, &resources.certificate_pattern).await?;
        let private_key_path =
            find_resource(&resources.directory, &resources.private_key_pattern).await?;

        debug!(
            issuer.certificate = ?certificate_path,
            issuer.private_key = ?private_key_path,
            "reading issuer resources"
        );
        let certificate_pem = read_resource(&certificate_path).await?;
        let private_key_pem = zeroize::Zeroizing::new(read_resource(&private_key_path).await?);

        let identity = Self::from_pem(
            &certificate_pem,
            &private_key_pem,
            resources.private_key_password.as_deref(),
        )?;

        info!(
            issuer.subject = %identity.subject(),
            issuer.certificate = ?certificate_path,
            "loaded issuer identity"
        );
        Ok(identity)
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// The issuer's own subject, which becomes the issuer name of every
    /// certificate it signs.
    pub fn subject(&self) -> &Name {
        &self.certificate.tbs_certificate.subject
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }
}

/// Finds the lexicographically last file inside `directory` matching the
/// glob-style `pattern`.
pub async fn find_resource(directory: &Path, pattern: &str) -> Result<PathBuf, IdentityError> {
    let pattern_path = Path::new(pattern);
    let search_directory = match pattern_path.parent() {
        Some(parent) => directory.join(parent),
        None => directory.to_path_buf(),
    };
    let file_pattern = pattern_path
        .file_name()
        .and_then(|file_name| file_name.to_str())
        .with_context(|| ResourceNotFoundSnafu {
            directory,
            pattern,
        })?;
    let regex = glob_to_regex(file_pattern)?;

    let mut entries = tokio::fs::read_dir(&search_directory)
        .await
        .with_context(|_| ReadDirectorySnafu {
            directory: &search_directory,
        })?;

    let mut candidates = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|_| ReadDirectorySnafu {
            directory: &search_directory,
        })?
    {
        let is_file = entry
            .file_type()
            .await
            .with_context(|_| ReadDirectorySnafu {
                directory: &search_directory,
            })?
            .is_file();

        if let Some(file_name) = entry.file_name().to_str()
            && is_file
            && regex.is_match(file_name)
        {
            candidates.push(file_name.to_owned());
        }
    }

    candidates.sort_unstable();
    debug!(?candidates, pattern, "found issuer resource candidates");

    let file_name = candidates.pop().with_context(|| ResourceNotFoundSnafu {
        directory: &search_directory,
        pattern,
    })?;

    Ok(search_directory.join(file_name))
}

async fn read_resource(path: &Path) -> Result<String, IdentityError> {
    tokio::fs::read_to_string(path)
        .await
        .context(ReadResourceSnafu { path })
}

fn glob_to_regex(pattern: &str) -> Result<Regex, IdentityError> {
    let mut expression = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            c => expression.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    expression.push('$');

    Regex::new(&expression).context(InvalidPatternSnafu { pattern })
}

#[cfg(test)]
mod tests {
    use rsa::pkcs8::EncodePrivateKey;
    use rstest::rstest;

    use super::*;
    use crate::{PEM_LINE_ENDING, testing};

    async fn write(directory: &Path, name: &str, contents: &str) {
        let path = directory.join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(path, contents).await.unwrap();
    }

    #[rstest]
    #[case("issuer-cert*.pem", "issuer-cert-2024.pem", true)]
    #[case("issuer-cert*.pem", "issuer-cert.pem", true)]
    #[case("issuer-cert*.pem", "issuer-cert.pem.bak", false)]
    #[case("issuer-cert?.pem", "issuer-cert1.pem", true)]
    #[case("issuer-cert?.pem", "issuer-cert12.pem", false)]
    #[case("issuer.cert", "issuerxcert", false)]
    fn glob_patterns(#[case] pattern: &str, #[case] file_name: &str, #[case] matches: bool) {
        assert_eq!(glob_to_regex(pattern).unwrap().is_match(file_name), matches);
    }

    #[tokio::test]
    async fn last_matching_resource_wins() {
        let directory = tempfile::tempdir().unwrap();
        write(directory.path(), "issuer-cert-2023.pem", "old").await;
        write(directory.path(), "issuer-cert-2025.pem", "new").await;
        write(directory.path(), "issuer-cert-2024.pem", "middle").await;
        write(directory.path(), "unrelated.pem", "other").await;

        let path = find_resource(directory.path(), "issuer-cert*.pem")
            .await
            .unwrap();
        assert_eq!(path, directory.path().join("issuer-cert-2025.pem"));
    }

    #[tokio::test]
    async fn resource_in_sub_directory() {
        let directory = tempfile::tempdir().unwrap();
        write(directory.path(), "prod/issuer-cert.pem", "prod").await;

        let path = find_resource(directory.path(), "prod/issuer-cert*.pem")
            .await
            .unwrap();
        assert_eq!(path, directory.path().join("prod").join("issuer-cert.pem"));
    }

    #[tokio::test]
    async fn missing_resource() {
        let directory = tempfile::tempdir().unwrap();
        write(directory.path(), "something-else.pem", "").await;

        let err = find_resource(directory.path(), "issuer-cert*.pem")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::ResourceNotFound { .. }));

        let err = find_resource(&directory.path().join("missing"), "issuer-cert*.pem")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::ReadDirectory { .. }));
    }

    #[tokio::test]
    async fn load_identity() {
        let directory = tempfile::tempdir().unwrap();
        let certificate_pem = cert::to_pem(testing::issuer_certificate()).unwrap();
        let private_key_pem = testing::issuer_rsa_key()
            .to_pkcs8_encrypted_pem(&mut rand_core::OsRng, "changeit", PEM_LINE_ENDING)
            .unwrap();

        write(directory.path(), "issuer-cert.pem", &certificate_pem).await;
        write(directory.path(), "issuer-rsa-privatekey.pem", &private_key_pem).await;

        let resources = IssuerResources {
            directory: directory.path().to_path_buf(),
            private_key_password: Some("changeit".to_owned()),
            ..Default::default()
        };

        let identity = IssuerIdentity::load(&resources).await.unwrap();
        assert_eq!(identity.certificate(), testing::issuer_certificate());
        assert_eq!(identity.public_key(), &testing::issuer_rsa_key().to_public_key());
    }

    #[test]
    fn key_must_belong_to_certificate() {
        let certificate_pem = cert::to_pem(testing::issuer_certificate()).unwrap();
        let private_key_pem = testing::leaf_rsa_key()
            .to_pkcs8_pem(PEM_LINE_ENDING)
            .unwrap();

        let err = IssuerIdentity::from_pem(&certificate_pem, &private_key_pem, None).unwrap_err();
        assert!(matches!(err, IdentityError::KeyMismatch { .. }));
    }

    #[test]
    fn key_must_be_rsa() {
        let certificate_pem = cert::to_pem(testing::issuer_certificate()).unwrap();
        let private_key_pem = p256::SecretKey::random(&mut rand_core::OsRng)
            .to_pkcs8_pem(PEM_LINE_ENDING)
            .unwrap();

        let err = IssuerIdentity::from_pem(&certificate_pem, &private_key_pem, None).unwrap_err();
        assert!(matches!(
            err,
            IdentityError::UnsupportedKeyAlgorithm { algorithm: "EC" }
        ));
    }
}
