//! This crate provides the types and functions needed to hand out X.509
//! client certificates to developer portal users. It covers four concerns:
//!
//! - [`keys`]: decoding of PEM-encoded public keys and private keys. Private
//!   keys can be PKCS#8 (plain or password protected) or classic OpenSSL key
//!   pairs (plain or password protected).
//! - [`cert`]: decoding of PEM-encoded certificates, PEM serialization and
//!   SHA-256 fingerprints.
//! - [`issuer`]: a [`CertificateIssuer`](issuer::CertificateIssuer) which
//!   signs short-lived leaf certificates for client authentication with a
//!   fixed issuer key pair, loaded once at process start.
//! - [`policy`]: the acceptance policy which certificates uploaded by users
//!   must satisfy before they are registered.
//!
//! ## Feature Flags
//!
//! - `testing`: Exposes the [`testing`] module, which contains fixture
//!   builders for downstream test suites.
//!
//! ## References
//!
//! - <https://datatracker.ietf.org/doc/html/rfc5280>
//! - <https://datatracker.ietf.org/doc/html/rfc4514>
//! - <https://datatracker.ietf.org/doc/html/rfc1421>
use x509_cert::der::pem::LineEnding;

pub mod cert;
pub mod issuer;
pub mod keys;
pub mod oid;
pub mod policy;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use x509_cert::Certificate;

/// The line ending used for every PEM document produced by this crate.
pub const PEM_LINE_ENDING: LineEnding = LineEnding::LF;
