//! Error types for the IPAM core

use thiserror::Error;
use uuid::Uuid;

/// Result type for IPAM operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classification for callers that map errors onto a
/// transport-level response (HTTP status, CLI exit code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed CIDR text, host bits set, or a family mismatch
    InvalidAddress,
    /// Duplicate resource or a delete blocked by dependent data
    Conflict,
    /// Attribute schema violation or an invalid query filter
    Validation,
    /// The actor lacks the required capability on the Site
    Forbidden,
    /// Referenced Site/Network/Attribute/User absent
    NotFound,
    /// Unexpected internal failure
    Internal,
}

/// IPAM core errors
#[derive(Debug, Clone, Error)]
pub enum Error {
    // Address errors
    #[error("Invalid address {0:?}: {1}")]
    InvalidAddress(String, String),

    #[error("Address {0:?} has host bits set beyond its prefix length")]
    HostBitsSet(String),

    // Not found
    #[error("Site not found: {0}")]
    SiteNotFound(Uuid),

    #[error("Network not found: {0}")]
    NetworkNotFound(Uuid),

    #[error("Network attribute not found: {0}")]
    AttributeNotFound(Uuid),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("No permissions for user {user_id} on site {site_id}")]
    PermissionNotFound { user_id: Uuid, site_id: Uuid },

    #[error("Change not found: {0}")]
    ChangeNotFound(Uuid),

    // Conflicts
    #[error("Network {0} already exists in this site")]
    DuplicateNetwork(String),

    #[error("Attribute {0:?} already exists in this site")]
    DuplicateAttribute(String),

    #[error("Site name {0:?} is already taken")]
    DuplicateSite(String),

    #[error("User {0:?} already exists")]
    DuplicateUser(String),

    #[error("Attribute {name:?} is still set on {count} network(s)")]
    AttributeInUse { name: String, count: usize },

    #[error("Site still owns {networks} network(s) and {attributes} attribute(s)")]
    SiteNotEmpty { networks: usize, attributes: usize },

    // Attribute validation
    #[error("Attribute {0:?} is not defined in this site")]
    UnknownAttribute(String),

    #[error("Required attribute {0:?} is missing or empty")]
    MissingAttribute(String),

    #[error("Attribute {0:?} does not allow multiple values")]
    SingleValued(String),

    #[error("Attribute {0:?} has an empty value")]
    EmptyAttributeValue(String),

    #[error("Invalid attribute name {0:?}")]
    InvalidAttributeName(String),

    // Query validation
    #[error("resource_id filter requires resource_type to be set")]
    FilterRequiresResourceType,

    // Authorization
    #[error("User {user_id} lacks {capability:?} on site {site_id}")]
    Forbidden {
        user_id: Uuid,
        site_id: Uuid,
        capability: String,
    },

    // General
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error into the coarse taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidAddress(..) | Error::HostBitsSet(_) => ErrorKind::InvalidAddress,

            Error::SiteNotFound(_)
            | Error::NetworkNotFound(_)
            | Error::AttributeNotFound(_)
            | Error::UserNotFound(_)
            | Error::PermissionNotFound { .. }
            | Error::ChangeNotFound(_) => ErrorKind::NotFound,

            Error::DuplicateNetwork(_)
            | Error::DuplicateAttribute(_)
            | Error::DuplicateSite(_)
            | Error::DuplicateUser(_)
            | Error::AttributeInUse { .. }
            | Error::SiteNotEmpty { .. } => ErrorKind::Conflict,

            Error::UnknownAttribute(_)
            | Error::MissingAttribute(_)
            | Error::SingleValued(_)
            | Error::EmptyAttributeValue(_)
            | Error::InvalidAttributeName(_)
            | Error::FilterRequiresResourceType => ErrorKind::Validation,

            Error::Forbidden { .. } => ErrorKind::Forbidden,

            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = Error::DuplicateNetwork("10.0.0.0/8".to_string());
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = Error::SiteNotFound(Uuid::new_v4());
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = Error::MissingAttribute("owner".to_string());
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = Error::HostBitsSet("10.0.0.1/8".to_string());
        assert_eq!(err.kind(), ErrorKind::InvalidAddress);
    }
}
