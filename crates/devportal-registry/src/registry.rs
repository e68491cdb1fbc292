//! Capacity- and uniqueness-constrained registry of a principal's
//! certificates on top of an [`AttributeStore`].
//!
//! The pure functions [`register`] and [`deregister`] compute the updated
//! attribute list. [`FingerprintRegistry`] wraps them in read-modify-write
//! cycles against the store. These cycles are not transactional: two
//! concurrent registrations for the same principal can both pass the checks.
//! The registry re-reads the list right before writing, which narrows the
//! window but doesn't close it.
use jiff::Timestamp;
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, info, instrument, warn};

use crate::{
    attribute::{Attribute, AttributeList, CertificateId, CertificateListing},
    store::{AttributeStore, StoreError},
};

/// The maximum number of certificates a principal can register.
pub const DEFAULT_MAX_CERTIFICATES: usize = 6;

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum RegistryError {
    #[snafu(display("Maximum number of certificates ({max}) already registered."))]
    CapacityExceeded { max: usize },

    #[snafu(display(
        "Certificate with fingerprint '{fingerprint}' already exists (attribute name: {attribute})."
    ))]
    DuplicateFingerprint {
        fingerprint: String,
        attribute: String,
    },

    #[snafu(display(
        "A certificate with identifier '{id}' was registered within the same second, retry later."
    ))]
    IdentifierCollision { id: CertificateId },

    #[snafu(display("'{id}' does not identify a certificate."))]
    NotACertificate { id: CertificateId },

    #[snafu(display("failed to access the attribute store"))]
    Store { source: StoreError },
}

impl RegistryError {
    /// Whether the error is caused by the request (as opposed to the store).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store { .. })
    }
}

/// Fails if the principal can't register any more certificates.
pub fn check_capacity(attributes: &AttributeList, max_certificates: usize) -> Result<()> {
    let count = attributes.certificate_count();
    ensure!(count < max_certificates, CapacityExceededSnafu {
        max: max_certificates
    });

    Ok(())
}

/// Fails if a registered certificate already has the fingerprint.
pub fn check_uniqueness(attributes: &AttributeList, fingerprint: &str) -> Result<()> {
    match attributes.certificates().find(|a| a.value == fingerprint) {
        Some(conflicting) => DuplicateFingerprintSnafu {
            fingerprint,
            attribute: &conflicting.name,
        }
        .fail(),
        None => Ok(()),
    }
}

/// Fails if an attribute is already named `id`.
pub fn check_identifier(attributes: &AttributeList, id: &CertificateId) -> Result<()> {
    ensure!(
        attributes.get(id.as_str()).is_none(),
        IdentifierCollisionSnafu { id: id.clone() }
    );

    Ok(())
}

/// Returns the attribute list with a new certificate attribute appended.
///
/// Unrelated attributes are kept in place. Fails if the principal is at
/// capacity, the fingerprint is already registered, or an attribute named `id`
/// already exists.
pub fn register(
    attributes: &AttributeList,
    fingerprint: &str,
    id: &CertificateId,
    max_certificates: usize,
) -> Result<AttributeList> {
    check_capacity(attributes, max_certificates)?;
    check_uniqueness(attributes, fingerprint)?;
    check_identifier(attributes, id)?;

    let mut updated = attributes.clone();
    updated
        .attributes
        .push(Attribute::new(id.as_str(), fingerprint));

    Ok(updated)
}

/// Returns the attribute list without the attribute named `id`.
///
/// An unknown identifier leaves the list unchanged. Identifiers without the
/// `cert-` prefix are rejected, so unrelated attributes can't be removed.
pub fn deregister(attributes: &AttributeList, id: &CertificateId) -> Result<AttributeList> {
    ensure!(id.is_certificate(), NotACertificateSnafu { id: id.clone() });

    Ok(attributes
        .attributes
        .iter()
        .filter(|attribute| attribute.name != id.as_str())
        .cloned()
        .collect())
}

/// The certificate registry of all principals in an [`AttributeStore`].
#[derive(Debug)]
pub struct FingerprintRegistry<S> {
    store: S,
    max_certificates: usize,
}

impl<S: AttributeStore> FingerprintRegistry<S> {
    /// Creates a registry allowing [`DEFAULT_MAX_CERTIFICATES`] per principal.
    pub fn new(store: S) -> Self {
        Self::with_max_certificates(store, DEFAULT_MAX_CERTIFICATES)
    }

    pub fn with_max_certificates(store: S, max_certificates: usize) -> Self {
        Self {
            store,
            max_certificates,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn max_certificates(&self) -> usize {
        self.max_certificates
    }

    /// Reads the attribute list of the principal and fails if no further
    /// certificate can be registered.
    ///
    /// This runs before any certificate is issued, so requests of principals
    /// at capacity don't cost any signing work.
    #[instrument(skip(self))]
    pub async fn check_capacity_and_list(&self, principal: &str) -> Result<AttributeList> {
        let attributes = self.store.get(principal).await.context(StoreSnafu)?;

        if let Err(err) = check_capacity(&attributes, self.max_certificates) {
            warn!(
                count = attributes.certificate_count(),
                max = self.max_certificates,
                "principal is at certificate capacity"
            );
            return Err(err);
        }

        debug!(
            count = attributes.certificate_count(),
            "principal can register another certificate"
        );
        Ok(attributes)
    }

    /// Registers the fingerprint for the principal under an identifier
    /// derived from `registered_at`.
    ///
    /// The attribute list is read again and all checks are repeated before
    /// the updated list is written.
    #[instrument(skip(self, registered_at))]
    pub async fn commit_registration(
        &self,
        principal: &str,
        fingerprint: &str,
        registered_at: Timestamp,
    ) -> Result<(CertificateId, AttributeList)> {
        let current = self.store.get(principal).await.context(StoreSnafu)?;
        let id = CertificateId::registered_at(registered_at);

        let updated = register(&current, fingerprint, &id, self.max_certificates)?;
        let stored = self
            .store
            .put(principal, updated)
            .await
            .context(StoreSnafu)?;

        info!(certificate.id = %id, "registered certificate");
        Ok((id, stored))
    }

    /// Removes the certificate with the identifier from the principal.
    ///
    /// Removing an unknown identifier succeeds without writing to the store.
    #[instrument(skip(self))]
    pub async fn remove(&self, principal: &str, id: &CertificateId) -> Result<AttributeList> {
        let current = self.store.get(principal).await.context(StoreSnafu)?;
        let updated = deregister(&current, id)?;

        if updated.len() == current.len() {
            debug!("no such certificate, nothing to remove");
            return Ok(current);
        }

        let stored = self
            .store
            .put(principal, updated)
            .await
            .context(StoreSnafu)?;

        info!("deregistered certificate");
        Ok(stored)
    }

    #[instrument(skip(self))]
    pub async fn list(&self, principal: &str) -> Result<CertificateListing> {
        let attributes = self.store.get(principal).await.context(StoreSnafu)?;
        Ok(CertificateListing::from(&attributes))
    }
}
