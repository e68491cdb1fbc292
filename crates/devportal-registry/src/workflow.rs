//! The two user-facing operations on client certificates: register (either
//! generate a certificate for an uploaded public key, or upload an existing
//! certificate) and deregister.
use std::sync::Arc;

use devportal_certs::{
    cert::{self, CertificateDetails},
    issuer::{self, CertificateIssuer, IssueError},
    keys::{self, KeyParseError},
    policy::{self, PolicyViolation},
};
use http::StatusCode;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};
use tracing::{info, instrument, warn};

use crate::{
    attribute::{CertificateId, CertificateListing},
    registry::{self, FingerprintRegistry, RegistryError},
    store::AttributeStore,
};

/// Returned to clients instead of the details of server-side failures.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error during certificate processing.";

pub type Result<T, E = WorkflowError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum WorkflowError {
    #[snafu(display("failed to parse the request payload"))]
    ParsePayload { source: serde_json::Error },

    #[snafu(display("Invalid JSON payload: missing or inconsistent properties."))]
    InvalidRequest,

    #[snafu(display("Email address '{email}' can't be used in a client certificate."))]
    InvalidEmail { email: String },

    #[snafu(display("failed to decode the submitted key material"))]
    Decode { source: KeyParseError },

    #[snafu(display("the uploaded certificate violates the acceptance policy"))]
    Policy { source: PolicyViolation },

    #[snafu(display("failed to update the certificate registry"))]
    Registry { source: RegistryError },

    #[snafu(display("failed to issue certificate"))]
    Signing { source: IssueError },

    #[snafu(display("failed to derive certificate details"))]
    CertificateDetails { source: cert::Error },

    #[snafu(display("certificate issuance task failed"))]
    Join { source: tokio::task::JoinError },
}

impl WorkflowError {
    /// The HTTP status code of the error response.
    ///
    /// Faults of the request map to `400 Bad Request`, everything else to
    /// `500 Internal Server Error`.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ParsePayload { .. }
            | Self::InvalidRequest
            | Self::InvalidEmail { .. }
            | Self::Decode { .. }
            | Self::Policy { .. } => StatusCode::BAD_REQUEST,
            Self::Registry { source } if source.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Registry { .. }
            | Self::Signing { .. }
            | Self::CertificateDetails { .. }
            | Self::Join { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message of the error response.
    ///
    /// Client errors name the specific problem, server errors don't leak any
    /// details.
    pub fn public_message(&self) -> String {
        match self {
            Self::ParsePayload { .. } | Self::InvalidRequest => Self::InvalidRequest.to_string(),
            Self::InvalidEmail { .. } => self.to_string(),
            Self::Decode { source } => source.to_string(),
            Self::Policy { source } => source.to_string(),
            Self::Registry { source } if source.is_client_error() => source.to_string(),
            _ => INTERNAL_ERROR_MESSAGE.to_owned(),
        }
    }
}

/// The authenticated user on whose behalf the workflow runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub email: String,
    pub display_name: String,
}

impl Principal {
    pub fn new(email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            display_name: display_name.into(),
        }
    }
}

/// The raw register request body, before its shape is validated.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub public_key: Option<String>,
    pub key_id: Option<String>,
    pub certificate: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisterRequest {
    /// Issue a new certificate for the PEM-encoded public key.
    Generate { public_key: String, key_id: String },

    /// Register an existing PEM-encoded certificate.
    Upload { certificate: String },
}

impl RegisterRequest {
    pub fn from_json(body: &str) -> Result<Self> {
        let payload: RegisterPayload = serde_json::from_str(body).context(ParsePayloadSnafu)?;
        Self::try_from(payload)
    }
}

impl TryFrom<RegisterPayload> for RegisterRequest {
    type Error = WorkflowError;

    /// `publicKey` and `certificate` are mutually exclusive, and `keyId` is
    /// required together with `publicKey`.
    fn try_from(payload: RegisterPayload) -> Result<Self> {
        match payload {
            RegisterPayload {
                public_key: Some(public_key),
                key_id: Some(key_id),
                certificate: None,
            } => Ok(Self::Generate { public_key, key_id }),
            RegisterPayload {
                public_key: None,
                certificate: Some(certificate),
                ..
            } => Ok(Self::Upload { certificate }),
            _ => InvalidRequestSnafu.fail(),
        }
    }
}

/// The response to a successful registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegistrationResponse {
    pub pem: String,
    pub fingerprint: String,

    #[serde(rename = "certificate-id")]
    pub certificate_id: CertificateId,

    #[serde(rename = "subjectDN")]
    pub subject_dn: String,

    #[serde(rename = "notBefore")]
    pub not_before: String,

    #[serde(rename = "notAfter")]
    pub not_after: String,
}

impl RegistrationResponse {
    pub fn new(certificate_id: CertificateId, details: &CertificateDetails) -> Self {
        Self {
            pem: details.pem.clone(),
            fingerprint: details.fingerprint.to_base64(),
            certificate_id,
            subject_dn: details.subject_dn.clone(),
            not_before: format_instant(details.not_before),
            not_after: format_instant(details.not_after),
        }
    }
}

/// Formats the timestamp as RFC 3339 UTC instant with second precision.
pub fn format_instant(timestamp: Timestamp) -> String {
    timestamp.strftime("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Orchestrates decoding, issuance or policy checks, and the registry.
pub struct RegistrationWorkflow<S> {
    issuer: Arc<CertificateIssuer>,
    registry: FingerprintRegistry<S>,
}

impl<S: AttributeStore> RegistrationWorkflow<S> {
    pub fn new(issuer: Arc<CertificateIssuer>, registry: FingerprintRegistry<S>) -> Self {
        Self { issuer, registry }
    }

    pub fn registry(&self) -> &FingerprintRegistry<S> {
        &self.registry
    }

    /// Registers a certificate for the principal.
    ///
    /// The capacity of the principal is checked before anything is decoded or
    /// signed. The registry is only written as the very last step, so any
    /// failure before leaves it untouched.
    pub async fn register(
        &self,
        principal: &Principal,
        request: RegisterRequest,
    ) -> Result<RegistrationResponse> {
        self.register_at(principal, request, Timestamp::now()).await
    }

    /// Same as [`Self::register`], but with an explicit registration time,
    /// which determines the certificate identifier and the start of the
    /// validity of generated certificates.
    #[instrument(skip(self, principal, request), fields(principal = %principal.email))]
    pub async fn register_at(
        &self,
        principal: &Principal,
        request: RegisterRequest,
        now: Timestamp,
    ) -> Result<RegistrationResponse> {
        // RFC 822 names in certificates are IA5Strings
        if matches!(request, RegisterRequest::Generate { .. }) {
            ensure!(principal.email.is_ascii(), InvalidEmailSnafu {
                email: &principal.email
            });
        }

        let attributes = self
            .registry
            .check_capacity_and_list(&principal.email)
            .await
            .context(RegistrySnafu)?;

        // Fail before signing if a certificate was registered within the same second
        registry::check_identifier(&attributes, &CertificateId::registered_at(now))
            .context(RegistrySnafu)?;

        let details = match request {
            RegisterRequest::Generate { public_key, key_id } => {
                let organization = attributes.partner_name().to_owned();
                info!(%organization, "issuing certificate for submitted public key");

                let public_key = keys::decode_public_key(&public_key).context(DecodeSnafu)?;
                let subject = issuer::subject_dn(&principal.display_name, &organization, &key_id);
                let email = principal.email.clone();
                let issuer = Arc::clone(&self.issuer);

                // RSA signing is CPU-bound
                tokio::task::spawn_blocking(move || {
                    issuer.issue_at(&public_key, &subject, &email, &organization, now)
                })
                .await
                .context(JoinSnafu)?
                .context(SigningSnafu)?
            }
            RegisterRequest::Upload { certificate } => {
                let certificate = cert::decode_certificate(&certificate).context(DecodeSnafu)?;

                if let Err(violation) = policy::enforce_client_certificate_constraints(&certificate)
                {
                    warn!(rule = %violation.rule(), %violation, "rejected uploaded certificate");
                    return Err(violation).context(PolicySnafu);
                }

                CertificateDetails::new(certificate).context(CertificateDetailsSnafu)?
            }
        };

        let fingerprint = details.fingerprint.to_base64();
        let (certificate_id, _) = self
            .registry
            .commit_registration(&principal.email, &fingerprint, now)
            .await
            .context(RegistrySnafu)?;

        info!(
            certificate.id = %certificate_id,
            certificate.fingerprint = %fingerprint,
            certificate.subject = %details.subject_dn,
            "registered certificate"
        );
        Ok(RegistrationResponse::new(certificate_id, &details))
    }

    /// Removes the certificate from the principal. Unknown identifiers are
    /// ignored.
    #[instrument(skip(self))]
    pub async fn deregister(&self, principal: &str, id: &CertificateId) -> Result<()> {
        self.registry
            .remove(principal, id)
            .await
            .context(RegistrySnafu)?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list(&self, principal: &str) -> Result<CertificateListing> {
        self.registry.list(principal).await.context(RegistrySnafu)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use devportal_certs::{
        oid,
        testing::{self, LeafTemplate},
    };
    use jiff::SignedDuration;
    use rsa::{
        RsaPrivateKey,
        pkcs8::{EncodePublicKey, LineEnding},
        rand_core::OsRng,
    };
    use rstest::rstest;

    use super::*;
    use crate::{
        attribute::{Attribute, AttributeList},
        store::{MemoryAttributeStore, StoreError},
    };

    const EMAIL: &str = "jane@acme.example";

    fn principal() -> Principal {
        Principal::new(EMAIL, "Jane Doe")
    }

    fn workflow(attributes: AttributeList) -> RegistrationWorkflow<MemoryAttributeStore> {
        let store = MemoryAttributeStore::with_principal(EMAIL, attributes);
        RegistrationWorkflow::new(
            Arc::new(CertificateIssuer::new(testing::issuer_identity())),
            FingerprintRegistry::new(store),
        )
    }

    fn partner_attributes() -> AttributeList {
        AttributeList::new(vec![Attribute::new("partner-name", "ACME Corp")])
    }

    fn generate_request() -> RegisterRequest {
        let public_key = testing::leaf_rsa_key()
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("failed to encode public key");

        RegisterRequest::Generate {
            public_key,
            key_id: "key-1".to_owned(),
        }
    }

    fn upload_request(certificate: &devportal_certs::Certificate) -> RegisterRequest {
        RegisterRequest::Upload {
            certificate: cert::to_pem(certificate).expect("failed to encode certificate"),
        }
    }

    struct UnavailableStore;

    #[async_trait]
    impl AttributeStore for UnavailableStore {
        async fn get(&self, _principal: &str) -> crate::store::Result<AttributeList> {
            Err(StoreError::Unavailable {
                message: "connection refused".to_owned(),
            })
        }

        async fn put(
            &self,
            _principal: &str,
            _attributes: AttributeList,
        ) -> crate::store::Result<AttributeList> {
            Err(StoreError::Unavailable {
                message: "connection refused".to_owned(),
            })
        }
    }

    #[rstest]
    #[case(r#"{"publicKey": "key", "keyId": "key-1"}"#, true)]
    #[case(r#"{"certificate": "cert"}"#, true)]
    #[case(r#"{"certificate": "cert", "keyId": "key-1"}"#, true)]
    #[case(r#"{"publicKey": "key"}"#, false)]
    #[case(r#"{"publicKey": "key", "keyId": "key-1", "certificate": "cert"}"#, false)]
    #[case(r#"{"publicKey": "key", "certificate": "cert"}"#, false)]
    #[case(r#"{"keyId": "key-1"}"#, false)]
    #[case(r#"{}"#, false)]
    fn request_shape(#[case] body: &str, #[case] valid: bool) {
        match RegisterRequest::from_json(body) {
            Ok(_) => assert!(valid, "{body} must be rejected"),
            Err(err) => {
                assert!(!valid, "{body} must be accepted");
                assert!(matches!(err, WorkflowError::InvalidRequest));
                assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
            }
        }
    }

    #[test]
    fn unparsable_request() {
        let err = RegisterRequest::from_json("not json").expect_err("must be rejected");

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.public_message(),
            "Invalid JSON payload: missing or inconsistent properties."
        );
    }

    #[tokio::test]
    async fn generate_for_new_principal() {
        let workflow = workflow(partner_attributes());

        let response = workflow
            .register(&principal(), generate_request())
            .await
            .expect("registration must succeed");

        let id_pattern = regex::Regex::new(r"^cert-\d{8}-\d{6}$").expect("valid regex");
        assert!(id_pattern.is_match(response.certificate_id.as_str()));
        assert_eq!(response.fingerprint.len(), 43);
        assert_eq!(
            response.subject_dn,
            "CN=Jane Doe,O=ACME Corp,serialNumber=key-1"
        );

        let not_before: Timestamp = response.not_before.parse().expect("valid notBefore");
        let not_after: Timestamp = response.not_after.parse().expect("valid notAfter");
        assert_eq!(
            not_after.duration_since(not_before),
            SignedDuration::from_hours(365 * 24)
        );

        let certificate = cert::decode_certificate(&response.pem).expect("valid PEM");
        assert_eq!(
            cert::fingerprint_base64(&certificate).expect("fingerprint"),
            response.fingerprint
        );
        policy::enforce_client_certificate_constraints(&certificate)
            .expect("issued certificates satisfy the acceptance policy");

        let stored = workflow.registry().store().get(EMAIL).await.expect("get");
        assert_eq!(stored.attributes, vec![
            Attribute::new("partner-name", "ACME Corp"),
            Attribute::new(response.certificate_id.as_str(), response.fingerprint.as_str()),
        ]);
    }

    #[tokio::test]
    async fn generate_without_partner_name() {
        let workflow = workflow(AttributeList::default());

        let response = workflow
            .register(&principal(), generate_request())
            .await
            .expect("registration must succeed");

        assert_eq!(
            response.subject_dn,
            "CN=Jane Doe,O=Unknown Partner Org,serialNumber=key-1"
        );
    }

    #[tokio::test]
    async fn generate_at_fixed_time() {
        let workflow = workflow(partner_attributes());
        let now: Timestamp = "2025-06-01T12:00:00.250Z".parse().expect("valid timestamp");

        let response = workflow
            .register_at(&principal(), generate_request(), now)
            .await
            .expect("registration must succeed");

        assert_eq!(response.certificate_id.as_str(), "cert-20250601-120000");
        assert_eq!(response.not_before, "2025-06-01T12:00:00Z");
        assert_eq!(response.not_after, "2026-06-01T12:00:00Z");
    }

    #[tokio::test]
    async fn generate_for_non_ascii_partner() {
        let workflow = workflow(AttributeList::new(vec![Attribute::new(
            "partner-name",
            "Müller GmbH",
        )]));

        let response = workflow
            .register(&Principal::new(EMAIL, "José Müller"), generate_request())
            .await
            .expect("registration must succeed");

        assert_eq!(
            response.subject_dn,
            "CN=José Müller,O=Müller GmbH,serialNumber=key-1"
        );
    }

    #[tokio::test]
    async fn generate_for_non_ascii_email() {
        let email = "jösé@acme.example";
        let workflow = RegistrationWorkflow::new(
            Arc::new(CertificateIssuer::new(testing::issuer_identity())),
            FingerprintRegistry::new(MemoryAttributeStore::with_principal(
                email,
                partner_attributes(),
            )),
        );

        let err = workflow
            .register(&Principal::new(email, "José"), generate_request())
            .await
            .expect_err("registration must fail");

        assert!(matches!(err, WorkflowError::InvalidEmail { .. }));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.public_message(),
            "Email address 'jösé@acme.example' can't be used in a client certificate."
        );
        assert_eq!(
            workflow.registry().store().get(email).await.expect("get"),
            partner_attributes()
        );
    }

    #[tokio::test]
    async fn identifier_collision_is_detected_before_signing() {
        let mut attributes = partner_attributes();
        attributes
            .attributes
            .push(Attribute::new("cert-20250601-120000", "fp-0"));
        let workflow = workflow(attributes.clone());
        let now: Timestamp = "2025-06-01T12:00:00.750Z".parse().expect("valid timestamp");

        let err = workflow
            .register_at(&principal(), generate_request(), now)
            .await
            .expect_err("registration must fail");

        assert!(matches!(err, WorkflowError::Registry {
            source: RegistryError::IdentifierCollision { .. }
        }));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            workflow.registry().store().get(EMAIL).await.expect("get"),
            attributes
        );
    }

    #[tokio::test]
    async fn generate_with_undecodable_key() {
        let workflow = workflow(partner_attributes());
        let request = RegisterRequest::Generate {
            public_key: "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n".to_owned(),
            key_id: "key-1".to_owned(),
        };

        let err = workflow
            .register(&principal(), request)
            .await
            .expect_err("registration must fail");
        assert!(matches!(err, WorkflowError::Decode { .. }));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            workflow.registry().store().get(EMAIL).await.expect("get"),
            partner_attributes()
        );
    }

    #[tokio::test]
    async fn upload_compliant_certificate() {
        let workflow = workflow(partner_attributes());
        let certificate = LeafTemplate::client_auth().sign();

        let response = workflow
            .register(&principal(), upload_request(&certificate))
            .await
            .expect("registration must succeed");

        assert_eq!(
            response.pem,
            cert::to_pem(&certificate).expect("failed to encode certificate")
        );
        assert_eq!(
            response.fingerprint,
            cert::fingerprint_base64(&certificate).expect("fingerprint")
        );
        assert_eq!(
            workflow.list(EMAIL).await.expect("list").certificates.len(),
            1
        );
    }

    #[tokio::test]
    async fn upload_weak_key_is_rejected() {
        let weak_key = RsaPrivateKey::new(&mut OsRng, 1024).expect("failed to create RSA key");
        let certificate = LeafTemplate::client_auth()
            .public_key(testing::public_key_info(&weak_key.to_public_key()))
            .sign();
        let workflow = workflow(partner_attributes());

        let err = workflow
            .register(&principal(), upload_request(&certificate))
            .await
            .expect_err("weak key must be rejected");

        assert!(matches!(err, WorkflowError::Policy {
            source: PolicyViolation::InsufficientKeyStrength { .. }
        }));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            workflow.registry().store().get(EMAIL).await.expect("get"),
            partner_attributes()
        );
    }

    #[tokio::test]
    async fn upload_without_client_auth_is_rejected() {
        let certificate = LeafTemplate::client_auth()
            .extended_key_usages(&[testing::KP_SERVER_AUTH, oid::KP_CODE_SIGNING])
            .sign();

        let err = workflow(partner_attributes())
            .register(&principal(), upload_request(&certificate))
            .await
            .expect_err("certificate must be rejected");

        assert!(matches!(err, WorkflowError::Policy {
            source: PolicyViolation::MissingClientAuth
        }));
    }

    #[tokio::test]
    async fn duplicate_upload_is_rejected() {
        let workflow = workflow(partner_attributes());
        let certificate = LeafTemplate::client_auth().sign();

        let first = workflow
            .register(&principal(), upload_request(&certificate))
            .await
            .expect("first registration must succeed");
        let err = workflow
            .register(&principal(), upload_request(&certificate))
            .await
            .expect_err("second registration must fail");

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.public_message(),
            format!(
                "Certificate with fingerprint '{}' already exists (attribute name: {}).",
                first.fingerprint, first.certificate_id
            )
        );

        let listing = workflow.list(EMAIL).await.expect("list");
        assert_eq!(listing.certificates.len(), 1);
        assert_eq!(listing.certificates[0].id, first.certificate_id);
    }

    #[tokio::test]
    async fn principal_at_capacity_is_rejected() {
        let attributes: AttributeList = (0..6)
            .map(|i| Attribute::new(format!("cert-20250101-00000{i}"), format!("fp-{i}")))
            .collect();
        let workflow = workflow(attributes.clone());

        let err = workflow
            .register(&principal(), generate_request())
            .await
            .expect_err("principal is at capacity");

        assert!(matches!(err, WorkflowError::Registry {
            source: RegistryError::CapacityExceeded { max: 6 }
        }));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.public_message(),
            "Maximum number of certificates (6) already registered."
        );
        assert_eq!(
            workflow.registry().store().get(EMAIL).await.expect("get"),
            attributes
        );
    }

    #[tokio::test]
    async fn unavailable_store_is_a_server_error() {
        let workflow = RegistrationWorkflow::new(
            Arc::new(CertificateIssuer::new(testing::issuer_identity())),
            FingerprintRegistry::new(UnavailableStore),
        );

        let err = workflow
            .register(&principal(), generate_request())
            .await
            .expect_err("registration must fail");

        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), INTERNAL_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn deregister_rejects_partner_name() {
        let workflow = workflow(partner_attributes());

        let err = workflow
            .deregister(EMAIL, &CertificateId::from("partner-name"))
            .await
            .expect_err("only certificates can be deregistered");

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            workflow.registry().store().get(EMAIL).await.expect("get"),
            partner_attributes()
        );
    }

    #[tokio::test]
    async fn deregister_is_idempotent() {
        let mut attributes = partner_attributes();
        attributes
            .attributes
            .push(Attribute::new("cert-20250101-000000", "fp-0"));
        let workflow = workflow(attributes);
        let id = CertificateId::from("cert-20250101-000000");

        workflow
            .deregister(EMAIL, &id)
            .await
            .expect("deregistration must succeed");
        workflow
            .deregister(EMAIL, &id)
            .await
            .expect("deregistration must be idempotent");

        assert_eq!(
            workflow.registry().store().get(EMAIL).await.expect("get"),
            partner_attributes()
        );
    }

    #[test]
    fn response_field_names() {
        let details = CertificateDetails::new(testing::leaf_certificate().clone())
            .expect("certificate details");
        let response =
            RegistrationResponse::new(CertificateId::from("cert-20250601-120000"), &details);

        let json = serde_json::to_value(&response).expect("serializable");
        let mut keys: Vec<_> = json
            .as_object()
            .expect("response is an object")
            .keys()
            .cloned()
            .collect();
        keys.sort();

        assert_eq!(keys, [
            "certificate-id",
            "fingerprint",
            "notAfter",
            "notBefore",
            "pem",
            "subjectDN"
        ]);
        assert_eq!(json["certificate-id"], "cert-20250601-120000");
    }

    #[rstest]
    #[case("2025-06-01T12:00:00Z", "2025-06-01T12:00:00Z")]
    #[case("2025-06-01T12:00:00.999Z", "2025-06-01T12:00:00Z")]
    #[case("2025-06-01T14:00:00+02:00", "2025-06-01T12:00:00Z")]
    fn instant_format(#[case] input: &str, #[case] expected: &str) {
        let timestamp: Timestamp = input.parse().expect("valid timestamp");
        assert_eq!(format_instant(timestamp), expected);
    }
}
