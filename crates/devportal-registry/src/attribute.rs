//! The attribute list of a principal, as stored by the API management
//! platform, and the view of registered certificates on top of it.
use std::fmt::Display;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Attributes whose name starts with this prefix represent registered
/// certificates.
pub const CERTIFICATE_ATTRIBUTE_PREFIX: &str = "cert-";

/// The attribute holding the name of the principal's partner organization.
pub const PARTNER_NAME_ATTRIBUTE: &str = "partner-name";

/// Used as organization when the principal has no [`PARTNER_NAME_ATTRIBUTE`].
pub const DEFAULT_PARTNER_NAME: &str = "Unknown Partner Org";

/// A single name/value pair.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is_certificate(&self) -> bool {
        self.name.starts_with(CERTIFICATE_ATTRIBUTE_PREFIX)
    }
}

/// The ordered attribute list of a principal.
///
/// (De)serializes to the wire shape of the management platform:
///
/// ```json
/// { "attribute": [ { "name": "partner-name", "value": "ACME Corp" } ] }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AttributeList {
    #[serde(rename = "attribute", default)]
    pub attributes: Vec<Attribute>,
}

impl AttributeList {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self { attributes }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| attribute.value.as_str())
    }

    /// All attributes which represent registered certificates, in stored order.
    pub fn certificates(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| a.is_certificate())
    }

    pub fn certificate_count(&self) -> usize {
        self.certificates().count()
    }

    /// The organization used when issuing certificates for this principal.
    pub fn partner_name(&self) -> &str {
        self.get(PARTNER_NAME_ATTRIBUTE).unwrap_or(DEFAULT_PARTNER_NAME)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl FromIterator<Attribute> for AttributeList {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// The identifier of a registered certificate: `cert-<yyyyMMdd-HHmmss>` of
/// the registration time in UTC.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CertificateId(String);

impl CertificateId {
    pub fn registered_at(timestamp: Timestamp) -> Self {
        Self(format!(
            "{CERTIFICATE_ATTRIBUTE_PREFIX}{}",
            timestamp.strftime("%Y%m%d-%H%M%S")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier names a certificate attribute at all, as
    /// opposed to e.g. the partner name.
    pub fn is_certificate(&self) -> bool {
        self.0.starts_with(CERTIFICATE_ATTRIBUTE_PREFIX)
    }
}

impl From<String> for CertificateId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CertificateId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl AsRef<str> for CertificateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for CertificateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegisteredCertificate {
    pub id: CertificateId,
    pub fingerprint: String,
}

/// The attribute list of a principal, split into registered certificates and
/// everything else.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CertificateListing {
    pub certificates: Vec<RegisteredCertificate>,
    pub other_attributes: Vec<Attribute>,
}

impl From<&AttributeList> for CertificateListing {
    fn from(list: &AttributeList) -> Self {
        let (certificates, other_attributes): (Vec<_>, Vec<_>) = list
            .attributes
            .iter()
            .cloned()
            .partition(Attribute::is_certificate);

        Self {
            certificates: certificates
                .into_iter()
                .map(|attribute| RegisteredCertificate {
                    id: attribute.name.into(),
                    fingerprint: attribute.value,
                })
                .collect(),
            other_attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn attributes() -> AttributeList {
        AttributeList::new(vec![
            Attribute::new(PARTNER_NAME_ATTRIBUTE, "ACME Corp"),
            Attribute::new("cert-20250101-000000", "first"),
            Attribute::new("certificate-note", "not a certificate"),
            Attribute::new("cert-20250102-000000", "second"),
        ])
    }

    #[test]
    fn wire_shape() {
        let json = r#"{"attribute":[{"name":"partner-name","value":"ACME Corp"}]}"#;
        let list: AttributeList = serde_json::from_str(json).expect("valid attribute list");

        assert_eq!(list.partner_name(), "ACME Corp");
        assert_eq!(serde_json::to_string(&list).expect("serializable"), json);
    }

    #[test]
    fn missing_attribute_member_is_empty() {
        let list: AttributeList = serde_json::from_str("{}").expect("valid attribute list");
        assert!(list.is_empty());
    }

    #[test]
    fn counts_certificate_attributes_only() {
        // "certificate-note" doesn't start with "cert-"
        assert_eq!(attributes().certificate_count(), 2);
    }

    #[test]
    fn partner_name_defaults() {
        assert_eq!(AttributeList::default().partner_name(), DEFAULT_PARTNER_NAME);
        assert_eq!(attributes().partner_name(), "ACME Corp");
    }

    #[rstest]
    #[case("2025-06-01T12:34:56.789Z", "cert-20250601-123456")]
    #[case("2025-12-31T23:59:59Z", "cert-20251231-235959")]
    #[case("2026-01-02T03:04:05+02:00", "cert-20260102-010405")]
    fn certificate_id(#[case] timestamp: &str, #[case] expected: &str) {
        let timestamp: Timestamp = timestamp.parse().expect("valid timestamp");
        assert_eq!(CertificateId::registered_at(timestamp).as_str(), expected);
    }

    #[test]
    fn listing_partitions_in_order() {
        let listing = CertificateListing::from(&attributes());

        assert_eq!(listing.certificates, vec![
            RegisteredCertificate {
                id: "cert-20250101-000000".into(),
                fingerprint: "first".to_owned(),
            },
            RegisteredCertificate {
                id: "cert-20250102-000000".into(),
                fingerprint: "second".to_owned(),
            },
        ]);
        assert_eq!(listing.other_attributes, vec![
            Attribute::new(PARTNER_NAME_ATTRIBUTE, "ACME Corp"),
            Attribute::new("certificate-note", "not a certificate"),
        ]);
    }
}
