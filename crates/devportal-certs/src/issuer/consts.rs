use jiff::SignedDuration;

/// Issued client certificates are valid for one year (365 days).
pub const CERTIFICATE_VALIDITY: SignedDuration = SignedDuration::from_hours(365 * 24);

/// The directory containing the issuer certificate and private key.
pub const DEFAULT_ISSUER_KEY_DIRECTORY: &str = "keys";

/// The default file name pattern of the issuer certificate.
pub const DEFAULT_ISSUER_CERTIFICATE_PATTERN: &str = "issuer-cert*.pem";

/// The default file name pattern of the issuer private key.
pub const DEFAULT_ISSUER_PRIVATE_KEY_PATTERN: &str = "issuer-rsa-privatekey*.pem";
