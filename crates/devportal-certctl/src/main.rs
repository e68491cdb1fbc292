//! Operator tool for developer portal client certificates.
//!
//! `issue`, `validate` and `fingerprint` work on local files only. `register`,
//! `deregister` and `list` operate on a JSON file attribute store, which has
//! the same shape as the attribute lists of the API management platform.
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Parser;
use devportal_certs::{
    cert,
    issuer::{CertificateIssuer, IdentityError, IssueError, IssuerIdentity},
    keys::{self, KeyParseError},
    policy::{self, PolicyViolation},
};
use devportal_registry::{
    attribute::CertificateId,
    registry::{FingerprintRegistry, RegistryError},
    store::FileAttributeStore,
    workflow::{
        self, Principal, RegisterPayload, RegisterRequest, RegistrationWorkflow, WorkflowError,
    },
};
use jiff::Timestamp;
use serde::Serialize;
use snafu::{ResultExt, Snafu, ensure};
use tracing::{error, info};

use crate::cli::{Cli, Command, IssuerOptions, RegisterArguments, RegistryOptions};

mod cli;
mod telemetry;

const APP_NAME: &str = "devportal-certctl";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize telemetry"))]
    InitTelemetry { source: telemetry::Error },

    #[snafu(display("failed to load the issuer identity"))]
    LoadIssuer { source: IdentityError },

    #[snafu(display("failed to read {path:?}"))]
    ReadInput {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to decode public key"))]
    DecodePublicKey { source: KeyParseError },

    #[snafu(display("failed to decode certificate"))]
    DecodeCertificate { source: KeyParseError },

    #[snafu(display("failed to issue certificate"))]
    IssueCertificate { source: IssueError },

    #[snafu(display("certificate rejected by the acceptance policy"))]
    Policy { source: PolicyViolation },

    #[snafu(display("certificate violates {count} rule(s) of the acceptance policy"))]
    PolicyViolations { count: usize },

    #[snafu(display("failed to compute certificate fingerprint"))]
    Fingerprint { source: cert::Error },

    #[snafu(display("failed to register certificate ({status})"))]
    Register {
        source: WorkflowError,
        status: http::StatusCode,
    },

    #[snafu(display("failed to access the certificate registry"))]
    Registry { source: RegistryError },

    #[snafu(display("failed to serialize output"))]
    SerializeOutput { source: serde_json::Error },
}

/// Output of the `issue` command.
#[derive(Serialize)]
struct IssuedCertificateOutput {
    pem: String,
    fingerprint: String,

    #[serde(rename = "subjectDN")]
    subject_dn: String,

    #[serde(rename = "notBefore")]
    not_before: String,

    #[serde(rename = "notAfter")]
    not_after: String,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    // Hold the guard until the end of main, dropping it flushes file logs
    let _tracing_guard = telemetry::init(APP_NAME, &cli.telemetry).context(InitTelemetrySnafu)?;

    run(cli).await.inspect_err(|err| {
        error!(error = err as &dyn std::error::Error, "command failed");
    })
}

async fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Command::Issue {
            public_key,
            key_id,
            email,
            name,
            organization,
        } => {
            let issuer = load_issuer(&cli.issuer).await?;
            let public_key = read_input(&public_key).await?;
            let public_key = keys::decode_public_key(&public_key).context(DecodePublicKeySnafu)?;

            let subject = devportal_certs::issuer::subject_dn(&name, &organization, &key_id);
            let issued = issuer
                .issue(&public_key, &subject, &email, &organization)
                .context(IssueCertificateSnafu)?;

            print_json(&IssuedCertificateOutput {
                fingerprint: issued.fingerprint.to_base64(),
                subject_dn: issued.subject_dn,
                not_before: workflow::format_instant(issued.not_before),
                not_after: workflow::format_instant(issued.not_after),
                pem: issued.pem,
            })
        }
        Command::Validate { certificate, all } => {
            let certificate = read_certificate(&certificate).await?;

            if all {
                let violations = policy::evaluate_all(&certificate, Timestamp::now());
                for violation in &violations {
                    println!("{}: {violation}", violation.rule());
                }
                ensure!(violations.is_empty(), PolicyViolationsSnafu {
                    count: violations.len()
                });
            } else {
                policy::enforce_client_certificate_constraints(&certificate)
                    .context(PolicySnafu)?;
            }

            println!("certificate satisfies the acceptance policy");
            Ok(())
        }
        Command::Fingerprint { certificate } => {
            let certificate = read_certificate(&certificate).await?;
            println!(
                "{}",
                cert::fingerprint_base64(&certificate).context(FingerprintSnafu)?
            );
            Ok(())
        }
        Command::Register(arguments) => {
            let registry = file_registry(&cli.registry);
            let issuer = load_issuer(&cli.issuer).await?;
            let workflow = RegistrationWorkflow::new(Arc::new(issuer), registry);

            let RegisterArguments {
                email,
                name,
                public_key,
                key_id,
                certificate,
            } = arguments;
            let payload = RegisterPayload {
                public_key: read_optional_input(public_key.as_deref()).await?,
                key_id,
                certificate: read_optional_input(certificate.as_deref()).await?,
            };

            let request = RegisterRequest::try_from(payload).map_err(register_error)?;
            let principal = Principal::new(email, name);

            let response = workflow
                .register(&principal, request)
                .await
                .map_err(register_error)?;

            print_json(&response)
        }
        Command::Deregister {
            email,
            certificate_id,
        } => {
            let registry = file_registry(&cli.registry);
            let id = CertificateId::from(certificate_id);

            registry.remove(&email, &id).await.context(RegistrySnafu)?;
            info!(certificate.id = %id, "certificate is no longer registered");
            Ok(())
        }
        Command::List { email } => {
            let registry = file_registry(&cli.registry);
            let listing = registry.list(&email).await.context(RegistrySnafu)?;

            print_json(&listing)
        }
    }
}

async fn load_issuer(options: &IssuerOptions) -> Result<CertificateIssuer, Error> {
    let identity = IssuerIdentity::load(&options.resources())
        .await
        .context(LoadIssuerSnafu)?;

    Ok(CertificateIssuer::new(identity))
}

fn register_error(source: WorkflowError) -> Error {
    Error::Register {
        status: source.status_code(),
        source,
    }
}

fn file_registry(options: &RegistryOptions) -> FingerprintRegistry<FileAttributeStore> {
    FingerprintRegistry::with_max_certificates(
        FileAttributeStore::new(&options.attribute_store),
        options.max_certificates,
    )
}

async fn read_input(path: &Path) -> Result<String, Error> {
    tokio::fs::read_to_string(path)
        .await
        .context(ReadInputSnafu { path })
}

async fn read_optional_input(path: Option<&Path>) -> Result<Option<String>, Error> {
    match path {
        Some(path) => read_input(path).await.map(Some),
        None => Ok(None),
    }
}

async fn read_certificate(path: &Path) -> Result<devportal_certs::Certificate, Error> {
    let pem = read_input(path).await?;
    cert::decode_certificate(&pem).context(DecodeCertificateSnafu)
}

fn print_json(value: &impl Serialize) -> Result<(), Error> {
    let output = serde_json::to_string_pretty(value).context(SerializeOutputSnafu)?;
    println!("{output}");

    Ok(())
}
