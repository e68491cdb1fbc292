//! The registry side of client certificate management for the developer
//! portal.
//!
//! Registered certificates are not stored locally. Each principal has an
//! ordered list of name/value attributes in an external store (the API
//! management platform), and every registered certificate is one attribute in
//! that list: the name is a `cert-<timestamp>` identifier, the value the
//! base64 SHA-256 fingerprint of the certificate.
//!
//! - [`attribute`]: the attribute list and certificate identifiers.
//! - [`store`]: the [`AttributeStore`](store::AttributeStore) seam to the
//!   external store, plus in-memory and JSON file implementations.
//! - [`registry`]: the [`FingerprintRegistry`](registry::FingerprintRegistry),
//!   which enforces capacity and fingerprint uniqueness.
//! - [`workflow`]: the [`RegistrationWorkflow`](workflow::RegistrationWorkflow)
//!   which ties issuance, the acceptance policy and the registry together.
pub mod attribute;
pub mod registry;
pub mod store;
pub mod workflow;
