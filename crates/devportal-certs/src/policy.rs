//! The acceptance policy for client certificates uploaded by users.
//!
//! A certificate is accepted when it passes all [`Rule`]s. The rules are
//! checked in their declaration order and the first violated rule is
//! reported. Every violation is caused by the uploaded certificate and
//! should be surfaced as a client error.
use jiff::Timestamp;
use snafu::{OptionExt, Snafu};
use strum::IntoEnumIterator;
use tracing::{debug, instrument};
use x509_cert::{
    Certificate,
    der::{Decode, Encode, oid::AssociatedOid, referenced::OwnedToRef},
    ext::pkix::{ExtendedKeyUsage, KeyUsage},
    spki::{AlgorithmIdentifierOwned, ObjectIdentifier},
};

use crate::{keys, oid};

/// The smallest accepted RSA modulus and EC group order, in bits.
pub const MIN_RSA_KEY_STRENGTH: usize = 2048;
pub const MIN_EC_KEY_STRENGTH: usize = 256;

/// Extended key usages which must not appear in client certificates.
pub const PROHIBITED_EXTENDED_KEY_USAGES: [ObjectIdentifier; 3] = [
    oid::KP_OCSP_SIGNING,
    oid::KP_CODE_SIGNING,
    oid::KP_TIME_STAMPING,
];

/// The individual checks of the policy, in evaluation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Rule {
    /// The KeyUsage extension, if present, must not allow keyCertSign.
    NotCertificateAuthority,

    /// notAfter must not be in the past. notBefore is not checked, so
    /// certificates for future use are accepted.
    NotExpired,

    /// The ExtendedKeyUsage extension must be present and include clientAuth.
    ClientAuthUsage,

    /// The ExtendedKeyUsage extension must not include codeSigning,
    /// timeStamping or OCSPSigning.
    NoProhibitedUsage,

    /// The public key must be an RSA or EC key.
    KeyAlgorithm,

    /// RSA keys need a modulus of at least 2048 bits, EC keys a group order
    /// of at least 256 bits.
    KeyStrength,

    /// The signature must use SHA-256, SHA-384 or SHA-512.
    SignatureDigest,

    /// Subject and issuer must differ.
    NotSelfSigned,
}

#[derive(Debug, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PolicyViolation {
    #[snafu(display("the certificate must not be usable for certificate signing"))]
    CertificateAuthority,

    #[snafu(display("the certificate is expired"))]
    Expired { not_after: Timestamp },

    #[snafu(display("the certificate is missing extended Key Usage (clientAuth)"))]
    MissingClientAuth,

    #[snafu(display("the certificate includes a prohibited OID for Extended Key Usage ({oid})"))]
    ProhibitedUsage { oid: ObjectIdentifier },

    #[snafu(display("the certificate uses an unsupported key type ({algorithm})"))]
    UnsupportedKeyType { algorithm: String },

    #[snafu(display(
        "the public key within the certificate uses an insufficient key strength ({strength})"
    ))]
    InsufficientKeyStrength { strength: usize },

    #[snafu(display("the certificate uses an unsupported signature algorithm name ({name})"))]
    UnsupportedSignatureAlgorithm { name: String },

    #[snafu(display("the certificate must not be self-signed"))]
    SelfSigned,

    #[snafu(display("the certificate cannot be parsed ({rule}: {reason})"))]
    Malformed { rule: Rule, reason: String },
}

impl PolicyViolation {
    /// The rule which was violated.
    pub fn rule(&self) -> Rule {
        match self {
            Self::CertificateAuthority => Rule::NotCertificateAuthority,
            Self::Expired { .. } => Rule::NotExpired,
            Self::MissingClientAuth => Rule::ClientAuthUsage,
            Self::ProhibitedUsage { .. } => Rule::NoProhibitedUsage,
            Self::UnsupportedKeyType { .. } => Rule::KeyAlgorithm,
            Self::InsufficientKeyStrength { .. } => Rule::KeyStrength,
            Self::UnsupportedSignatureAlgorithm { .. } => Rule::SignatureDigest,
            Self::SelfSigned => Rule::NotSelfSigned,
            Self::Malformed { rule, .. } => *rule,
        }
    }
}

/// Checks the certificate against every [`Rule`] and fails with the first
/// violation.
pub fn enforce_client_certificate_constraints(
    certificate: &Certificate,
) -> Result<(), PolicyViolation> {
    enforce_client_certificate_constraints_at(certificate, Timestamp::now())
}

/// Same as [`enforce_client_certificate_constraints`], with an explicit
/// point in time for the expiry check.
#[instrument(
    name = "enforce_client_certificate_constraints",
    skip(certificate),
    fields(certificate.subject = %certificate.tbs_certificate.subject)
)]
pub fn enforce_client_certificate_constraints_at(
    certificate: &Certificate,
    now: Timestamp,
) -> Result<(), PolicyViolation> {
    for rule in Rule::iter() {
        rule.check(certificate, now).inspect_err(|violation| {
            debug!(%rule, %violation, "certificate violates the acceptance policy");
        })?;
    }

    Ok(())
}

/// Checks the certificate against every [`Rule`] and returns all violations,
/// in rule order.
pub fn evaluate_all(certificate: &Certificate, now: Timestamp) -> Vec<PolicyViolation> {
    Rule::iter()
        .filter_map(|rule| rule.check(certificate, now).err())
        .collect()
}

impl Rule {
    pub fn check(self, certificate: &Certificate, now: Timestamp) -> Result<(), PolicyViolation> {
        match self {
            Self::NotCertificateAuthority => check_not_certificate_authority(certificate),
            Self::NotExpired => check_not_expired(certificate, now),
            Self::ClientAuthUsage => check_client_auth_usage(certificate),
            Self::NoProhibitedUsage => check_no_prohibited_usage(certificate),
            Self::KeyAlgorithm => check_key_algorithm(certificate),
            Self::KeyStrength => check_key_strength(certificate),
            Self::SignatureDigest => check_signature_digest(certificate),
            Self::NotSelfSigned => check_not_self_signed(certificate),
        }
    }
}

fn check_not_certificate_authority(certificate: &Certificate) -> Result<(), PolicyViolation> {
    let Some(key_usage) = find_extension::<KeyUsage>(certificate, Rule::NotCertificateAuthority)?
    else {
        return Ok(());
    };

    snafu::ensure!(!key_usage.key_cert_sign(), CertificateAuthoritySnafu);
    Ok(())
}

fn check_not_expired(certificate: &Certificate, now: Timestamp) -> Result<(), PolicyViolation> {
    let not_after = certificate.tbs_certificate.validity.not_after.to_system_time();
    let not_after = Timestamp::try_from(not_after).map_err(|err| malformed(Rule::NotExpired, err))?;

    snafu::ensure!(now <= not_after, ExpiredSnafu { not_after });
    Ok(())
}

fn check_client_auth_usage(certificate: &Certificate) -> Result<(), PolicyViolation> {
    let usages = find_extension::<ExtendedKeyUsage>(certificate, Rule::ClientAuthUsage)?
        .context(MissingClientAuthSnafu)?;

    snafu::ensure!(usages.0.contains(&oid::KP_CLIENT_AUTH), MissingClientAuthSnafu);
    Ok(())
}

fn check_no_prohibited_usage(certificate: &Certificate) -> Result<(), PolicyViolation> {
    let Some(usages) = find_extension::<ExtendedKeyUsage>(certificate, Rule::NoProhibitedUsage)?
    else {
        return Ok(());
    };

    match usages
        .0
        .into_iter()
        .find(|usage| PROHIBITED_EXTENDED_KEY_USAGES.contains(usage))
    {
        Some(oid) => ProhibitedUsageSnafu { oid }.fail(),
        None => Ok(()),
    }
}

fn check_key_algorithm(certificate: &Certificate) -> Result<(), PolicyViolation> {
    let algorithm = certificate
        .tbs_certificate
        .subject_public_key_info
        .algorithm
        .oid;

    if algorithm == oid::RSA_ENCRYPTION || algorithm == oid::EC_PUBLIC_KEY {
        Ok(())
    } else {
        UnsupportedKeyTypeSnafu {
            algorithm: key_algorithm_name(algorithm),
        }
        .fail()
    }
}

fn check_key_strength(certificate: &Certificate) -> Result<(), PolicyViolation> {
    let spki = &certificate.tbs_certificate.subject_public_key_info;

    let (strength, minimum) = if spki.algorithm.oid == oid::RSA_ENCRYPTION {
        let strength = keys::rsa::modulus_bits_of_spki(spki)
            .map_err(|err| malformed(Rule::KeyStrength, err))?;
        (strength, MIN_RSA_KEY_STRENGTH)
    } else if spki.algorithm.oid == oid::EC_PUBLIC_KEY {
        // Without (known) named curve parameters the strength is unknown
        let strength = spki
            .algorithm
            .owned_to_ref()
            .parameters_oid()
            .map_or(0, curve_order_bits);
        (strength, MIN_EC_KEY_STRENGTH)
    } else {
        return Ok(());
    };

    snafu::ensure!(strength >= minimum, InsufficientKeyStrengthSnafu { strength });
    Ok(())
}

fn check_signature_digest(certificate: &Certificate) -> Result<(), PolicyViolation> {
    let name = signature_algorithm_name(&certificate.signature_algorithm);

    if ["SHA256", "SHA384", "SHA512"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
    {
        Ok(())
    } else {
        UnsupportedSignatureAlgorithmSnafu { name }.fail()
    }
}

fn check_not_self_signed(certificate: &Certificate) -> Result<(), PolicyViolation> {
    let tbs = &certificate.tbs_certificate;
    let self_signed =
        tbs.subject == tbs.issuer || tbs.subject.to_string() == tbs.issuer.to_string();

    snafu::ensure!(!self_signed, SelfSignedSnafu);
    Ok(())
}

/// Finds and decodes the extension `E`. Returns `None` if the certificate
/// doesn't carry it.
fn find_extension<E>(certificate: &Certificate, rule: Rule) -> Result<Option<E>, PolicyViolation>
where
    E: AssociatedOid + for<'a> Decode<'a>,
{
    certificate
        .tbs_certificate
        .extensions
        .iter()
        .flatten()
        .find(|extension| extension.extn_id == E::OID)
        .map(|extension| E::from_der(extension.extn_value.as_bytes()))
        .transpose()
        .map_err(|err| malformed(rule, err))
}

fn malformed(rule: Rule, reason: impl ToString) -> PolicyViolation {
    PolicyViolation::Malformed {
        rule,
        reason: reason.to_string(),
    }
}

fn key_algorithm_name(algorithm: ObjectIdentifier) -> String {
    match algorithm {
        oid::RSA_ENCRYPTION => "RSA".to_owned(),
        oid::EC_PUBLIC_KEY => "EC".to_owned(),
        oid::ED25519 => "Ed25519".to_owned(),
        oid::DSA => "DSA".to_owned(),
        other => other.to_string(),
    }
}

fn curve_order_bits(curve: ObjectIdentifier) -> usize {
    match curve {
        oid::SECP192R1 => 192,
        oid::SECP224R1 => 224,
        oid::SECP256R1 | oid::SECP256K1 | oid::BRAINPOOL_P256R1 => 256,
        oid::SECP384R1 | oid::BRAINPOOL_P384R1 => 384,
        oid::BRAINPOOL_P512R1 => 512,
        oid::SECP521R1 => 521,
        _ => 0,
    }
}

/// The conventional name of a signature algorithm, e.g. `SHA256withRSA`.
/// Unknown algorithms are named by their OID.
pub fn signature_algorithm_name(algorithm: &AlgorithmIdentifierOwned) -> String {
    let name = match algorithm.oid {
        oid::MD5_WITH_RSA => "MD5withRSA",
        oid::SHA1_WITH_RSA => "SHA1withRSA",
        oid::SHA224_WITH_RSA => "SHA224withRSA",
        oid::SHA256_WITH_RSA => "SHA256withRSA",
        oid::SHA384_WITH_RSA => "SHA384withRSA",
        oid::SHA512_WITH_RSA => "SHA512withRSA",
        oid::ECDSA_WITH_SHA1 => "SHA1withECDSA",
        oid::ECDSA_WITH_SHA224 => "SHA224withECDSA",
        oid::ECDSA_WITH_SHA256 => "SHA256withECDSA",
        oid::ECDSA_WITH_SHA384 => "SHA384withECDSA",
        oid::ECDSA_WITH_SHA512 => "SHA512withECDSA",
        oid::DSA_WITH_SHA1 => "SHA1withDSA",
        oid::DSA_WITH_SHA256 => "SHA256withDSA",
        oid::ED25519 => "Ed25519",
        oid::RSASSA_PSS => return rsassa_pss_name(algorithm),
        other => return other.to_string(),
    };

    name.to_owned()
}

/// RSASSA-PSS carries its digest in the algorithm parameters, which default
/// to SHA-1 when absent.
fn rsassa_pss_name(algorithm: &AlgorithmIdentifierOwned) -> String {
    let digest = match &algorithm.parameters {
        None => Some(oid::SHA1),
        Some(parameters) => parameters.to_der().ok().and_then(|der| {
            rsa::pkcs1::RsaPssParams::from_der(&der)
                .ok()
                .map(|params| params.hash.oid)
        }),
    };

    let digest = match digest {
        Some(oid::SHA1) => "SHA1",
        Some(oid::SHA224) => "SHA224",
        Some(oid::SHA256) => "SHA256",
        Some(oid::SHA384) => "SHA384",
        Some(oid::SHA512) => "SHA512",
        _ => return "RSASSA-PSS".to_owned(),
    };

    format!("{digest}withRSAandMGF1")
}

#[cfg(test)]
mod tests {
    use jiff::SignedDuration;
    use rsa::{RsaPrivateKey, pkcs1::RsaPssParams};
    use rstest::rstest;
    use x509_cert::{
        der::{Any, asn1::BitString},
        ext::pkix::{BasicConstraints, KeyUsages},
        name::Name,
    };

    use super::*;
    use crate::testing::{self, LeafTemplate};

    fn now() -> Timestamp {
        Timestamp::now()
    }

    #[test]
    fn compliant_certificate() {
        let certificate = LeafTemplate::client_auth().sign();
        enforce_client_certificate_constraints(&certificate).unwrap();
        assert!(evaluate_all(&certificate, now()).is_empty());
    }

    #[test]
    fn certificate_authority() {
        let certificate = LeafTemplate::client_auth()
            .key_usage(KeyUsage(
                KeyUsages::DigitalSignature | KeyUsages::KeyCertSign,
            ))
            .sign();

        let violation = enforce_client_certificate_constraints(&certificate).unwrap_err();
        assert_eq!(violation, PolicyViolation::CertificateAuthority);
        assert_eq!(violation.rule(), Rule::NotCertificateAuthority);
    }

    #[test]
    fn basic_constraints_ca_alone_is_accepted() {
        // Only the keyCertSign bit counts
        let certificate = LeafTemplate::client_auth()
            .extension(BasicConstraints {
                ca: true,
                path_len_constraint: None,
            })
            .sign();

        enforce_client_certificate_constraints(&certificate).unwrap();
    }

    #[test]
    fn expired() {
        let certificate = LeafTemplate::client_auth()
            .validity(
                now() - SignedDuration::from_hours(48),
                now() - SignedDuration::from_hours(24),
            )
            .sign();

        let violation = enforce_client_certificate_constraints(&certificate).unwrap_err();
        assert_eq!(violation.rule(), Rule::NotExpired);
        assert_eq!(violation.to_string(), "the certificate is expired");
    }

    #[test]
    fn not_yet_valid_is_accepted() {
        let certificate = LeafTemplate::client_auth()
            .validity(
                now() + SignedDuration::from_hours(24),
                now() + SignedDuration::from_hours(48),
            )
            .sign();

        enforce_client_certificate_constraints(&certificate).unwrap();
    }

    #[test]
    fn expiry_is_checked_against_the_given_time() {
        let certificate = LeafTemplate::client_auth().sign();
        let later = now() + SignedDuration::from_hours(24 * 400);

        let violation = enforce_client_certificate_constraints_at(&certificate, later).unwrap_err();
        assert_eq!(violation.rule(), Rule::NotExpired);
    }

    #[test]
    fn missing_extended_key_usage() {
        let certificate = LeafTemplate::new().sign();

        let violation = enforce_client_certificate_constraints(&certificate).unwrap_err();
        assert_eq!(violation, PolicyViolation::MissingClientAuth);
    }

    #[test]
    fn extended_key_usage_without_client_auth() {
        let certificate = LeafTemplate::new()
            .extended_key_usages(&[testing::KP_SERVER_AUTH])
            .sign();

        let violation = enforce_client_certificate_constraints(&certificate).unwrap_err();
        assert_eq!(violation, PolicyViolation::MissingClientAuth);
    }

    #[rstest]
    #[case(oid::KP_CODE_SIGNING)]
    #[case(oid::KP_TIME_STAMPING)]
    #[case(oid::KP_OCSP_SIGNING)]
    fn prohibited_extended_key_usage(#[case] usage: ObjectIdentifier) {
        let certificate = LeafTemplate::new()
            .extended_key_usages(&[oid::KP_CLIENT_AUTH, usage])
            .sign();

        let violation = enforce_client_certificate_constraints(&certificate).unwrap_err();
        assert_eq!(violation, PolicyViolation::ProhibitedUsage { oid: usage });
        assert!(violation.to_string().contains(&usage.to_string()));
    }

    #[test]
    fn ec_keys_are_accepted() {
        let secret_key = p256::SecretKey::random(&mut rand_core::OsRng);
        let certificate = LeafTemplate::client_auth()
            .public_key(testing::public_key_info(&secret_key.public_key()))
            .sign();

        enforce_client_certificate_constraints(&certificate).unwrap();
    }

    #[test]
    fn unsupported_key_type() {
        let mut spki = testing::leaf_public_key_info();
        spki.algorithm = AlgorithmIdentifierOwned {
            oid: oid::ED25519,
            parameters: None,
        };
        spki.subject_public_key = BitString::from_bytes(&[0; 32]).unwrap();

        let certificate = LeafTemplate::client_auth().public_key(spki).sign();
        let violation = enforce_client_certificate_constraints(&certificate).unwrap_err();

        assert_eq!(
            violation,
            PolicyViolation::UnsupportedKeyType {
                algorithm: "Ed25519".to_owned()
            }
        );
    }

    #[test]
    fn weak_rsa_key() {
        let weak_key = RsaPrivateKey::new(&mut rand_core::OsRng, 1024).unwrap();
        let certificate = LeafTemplate::client_auth()
            .public_key(testing::public_key_info(&weak_key.to_public_key()))
            .sign();

        let violation = enforce_client_certificate_constraints(&certificate).unwrap_err();
        assert_eq!(
            violation,
            PolicyViolation::InsufficientKeyStrength { strength: 1024 }
        );
        assert!(violation.to_string().contains("insufficient key strength"));
    }

    #[rstest]
    #[case(oid::SECP224R1, Some(224))]
    #[case(oid::SECP256R1, None)]
    #[case(oid::SECP521R1, None)]
    #[case(ObjectIdentifier::new_unwrap("1.3.132.0.99"), Some(0))]
    fn ec_key_strength(#[case] curve: ObjectIdentifier, #[case] violation: Option<usize>) {
        let secret_key = p256::SecretKey::random(&mut rand_core::OsRng);
        let mut spki = testing::public_key_info(&secret_key.public_key());
        spki.algorithm.parameters = Some(Any::encode_from(&curve).unwrap());

        let certificate = LeafTemplate::client_auth().public_key(spki).sign();

        assert_eq!(
            Rule::KeyStrength.check(&certificate, now()).err(),
            violation.map(|strength| PolicyViolation::InsufficientKeyStrength { strength })
        );
    }

    #[rstest]
    #[case(oid::SHA1_WITH_RSA, "SHA1withRSA")]
    #[case(oid::MD5_WITH_RSA, "MD5withRSA")]
    #[case(oid::ECDSA_WITH_SHA1, "SHA1withECDSA")]
    #[case(oid::SHA224_WITH_RSA, "SHA224withRSA")]
    fn weak_signature_digest(#[case] algorithm: ObjectIdentifier, #[case] name: &str) {
        let mut certificate = LeafTemplate::client_auth().sign();
        certificate.signature_algorithm = AlgorithmIdentifierOwned {
            oid: algorithm,
            parameters: None,
        };

        let violation = enforce_client_certificate_constraints(&certificate).unwrap_err();
        assert_eq!(
            violation,
            PolicyViolation::UnsupportedSignatureAlgorithm {
                name: name.to_owned()
            }
        );
    }

    #[rstest]
    #[case(oid::SHA256_WITH_RSA, "SHA256withRSA")]
    #[case(oid::SHA512_WITH_RSA, "SHA512withRSA")]
    #[case(oid::ECDSA_WITH_SHA384, "SHA384withECDSA")]
    fn strong_signature_digest(#[case] algorithm: ObjectIdentifier, #[case] name: &str) {
        let identifier = AlgorithmIdentifierOwned {
            oid: algorithm,
            parameters: None,
        };
        assert_eq!(signature_algorithm_name(&identifier), name);
    }

    #[test]
    fn rsassa_pss_digest() {
        let absent = AlgorithmIdentifierOwned {
            oid: oid::RSASSA_PSS,
            parameters: None,
        };
        assert_eq!(signature_algorithm_name(&absent), "SHA1withRSAandMGF1");

        let default_params = AlgorithmIdentifierOwned {
            oid: oid::RSASSA_PSS,
            parameters: Some(Any::encode_from(&RsaPssParams::default()).unwrap()),
        };
        assert_eq!(signature_algorithm_name(&default_params), "SHA1withRSAandMGF1");
    }

    #[test]
    fn self_signed() {
        let subject: Name = "CN=Jane Doe,O=ACME".parse().unwrap();
        let certificate = LeafTemplate::client_auth()
            .subject(subject.clone())
            .issuer(subject)
            .sign();

        let violation = enforce_client_certificate_constraints(&certificate).unwrap_err();
        assert_eq!(violation, PolicyViolation::SelfSigned);
        assert_eq!(violation.rule(), Rule::NotSelfSigned);
    }

    #[test]
    fn first_violation_wins() {
        let certificate = LeafTemplate::new()
            .key_usage(KeyUsage(KeyUsages::KeyCertSign.into()))
            .validity(
                now() - SignedDuration::from_hours(48),
                now() - SignedDuration::from_hours(24),
            )
            .sign();

        let violation = enforce_client_certificate_constraints(&certificate).unwrap_err();
        assert_eq!(violation.rule(), Rule::NotCertificateAuthority);

        let rules = evaluate_all(&certificate, now())
            .iter()
            .map(PolicyViolation::rule)
            .collect::<Vec<_>>();
        assert_eq!(rules, [
            Rule::NotCertificateAuthority,
            Rule::NotExpired,
            Rule::ClientAuthUsage
        ]);
    }

    #[test]
    fn malformed_extension() {
        let certificate = LeafTemplate::new()
            .raw_extension(KeyUsage::OID, vec![0x05, 0x00])
            .sign();

        let violation = enforce_client_certificate_constraints(&certificate).unwrap_err();
        assert!(matches!(
            violation,
            PolicyViolation::Malformed {
                rule: Rule::NotCertificateAuthority,
                ..
            }
        ));
    }

    #[test]
    fn rule_names() {
        assert_eq!(Rule::KeyStrength.to_string(), "key-strength");
        assert_eq!(Rule::iter().count(), 8);
        assert_eq!(Rule::iter().next(), Some(Rule::NotCertificateAuthority));
        assert_eq!(Rule::iter().last(), Some(Rule::NotSelfSigned));
    }
}
