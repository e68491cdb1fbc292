use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};
use devportal_certs::issuer::{
    DEFAULT_ISSUER_CERTIFICATE_PATTERN, DEFAULT_ISSUER_KEY_DIRECTORY,
    DEFAULT_ISSUER_PRIVATE_KEY_PATTERN, IssuerResources,
};
use devportal_registry::{attribute::DEFAULT_PARTNER_NAME, registry::DEFAULT_MAX_CERTIFICATES};

use crate::telemetry::TelemetryOptions;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    // IMPORTANT: All (flattened) sub structs should be placed at the end to ensure the help
    // headings are correct.
    #[command(flatten)]
    pub issuer: IssuerOptions,

    #[command(flatten)]
    pub registry: RegistryOptions,

    #[command(flatten)]
    pub telemetry: TelemetryOptions,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Issue a client certificate for a public key, without registering it.
    Issue {
        /// PEM-encoded public key (SubjectPublicKeyInfo or PKCS#1).
        #[arg(long, value_name = "FILE")]
        public_key: PathBuf,

        /// Identifier of the key, used as subject serial number.
        #[arg(long)]
        key_id: String,

        /// Email address of the certificate owner.
        #[arg(long)]
        email: String,

        /// Display name of the certificate owner.
        #[arg(long)]
        name: String,

        #[arg(long, default_value = DEFAULT_PARTNER_NAME)]
        organization: String,
    },

    /// Check a certificate against the acceptance policy for uploaded certificates.
    Validate {
        #[arg(long, value_name = "FILE")]
        certificate: PathBuf,

        /// Report every violated rule instead of only the first one.
        #[arg(long)]
        all: bool,
    },

    /// Print the base64 SHA-256 fingerprint of a certificate.
    Fingerprint {
        #[arg(long, value_name = "FILE")]
        certificate: PathBuf,
    },

    /// Register a certificate for a principal, either by issuing one for a
    /// public key or by uploading an existing one.
    Register(RegisterArguments),

    /// Remove a registered certificate from a principal.
    Deregister {
        #[arg(long)]
        email: String,

        #[arg(long)]
        certificate_id: String,
    },

    /// List the registered certificates of a principal.
    List {
        #[arg(long)]
        email: String,
    },
}

#[derive(Debug, PartialEq, Eq, Args)]
#[command(group(ArgGroup::new("input").required(true).args(["public_key", "certificate"])))]
pub struct RegisterArguments {
    /// Email address of the principal.
    #[arg(long)]
    pub email: String,

    /// Display name of the principal.
    #[arg(long)]
    pub name: String,

    /// PEM-encoded public key to issue a certificate for.
    #[arg(long, value_name = "FILE", requires = "key_id")]
    pub public_key: Option<PathBuf>,

    /// Identifier of the public key.
    #[arg(long)]
    pub key_id: Option<String>,

    /// PEM-encoded certificate to upload.
    #[arg(long, value_name = "FILE")]
    pub certificate: Option<PathBuf>,
}

/// Where the issuer certificate and private key are loaded from.
#[derive(Clone, Debug, PartialEq, Eq, Args)]
pub struct IssuerOptions {
    /// Directory containing the issuer certificate and private key.
    #[arg(long, env, value_name = "DIRECTORY", default_value = DEFAULT_ISSUER_KEY_DIRECTORY)]
    pub issuer_key_directory: PathBuf,

    /// File name PATTERN of the issuer certificate (`*` and `?` wildcards).
    #[arg(long, env, value_name = "PATTERN", default_value = DEFAULT_ISSUER_CERTIFICATE_PATTERN)]
    pub issuer_certificate_pattern: String,

    /// File name PATTERN of the issuer private key (`*` and `?` wildcards).
    #[arg(long, env, value_name = "PATTERN", default_value = DEFAULT_ISSUER_PRIVATE_KEY_PATTERN)]
    pub issuer_private_key_pattern: String,

    /// Password of the issuer private key.
    #[arg(long, env, hide_env_values = true)]
    pub issuer_private_key_password: Option<String>,
}

impl IssuerOptions {
    pub fn resources(&self) -> IssuerResources {
        IssuerResources {
            directory: self.issuer_key_directory.clone(),
            certificate_pattern: self.issuer_certificate_pattern.clone(),
            private_key_pattern: self.issuer_private_key_pattern.clone(),
            private_key_password: self.issuer_private_key_password.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Args)]
pub struct RegistryOptions {
    /// Maximum number of certificates per principal.
    #[arg(long, env, default_value_t = DEFAULT_MAX_CERTIFICATES)]
    pub max_certificates: usize,

    /// JSON FILE holding the attribute lists of all principals.
    #[arg(long, env, value_name = "FILE", default_value = "attributes.json")]
    pub attribute_store: PathBuf,
}
