//! Users and per-site capability grants

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named capability grantable to a user for one Site
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Subsumes every resource-scoped capability on the same site
    Admin,
    /// Create, update and delete networks
    Networks,
    /// Create, update and delete attribute definitions
    NetworkAttrs,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Admin => write!(f, "admin"),
            Capability::Networks => write!(f, "networks"),
            Capability::NetworkAttrs => write!(f, "network_attrs"),
        }
    }
}

/// Capability set held by one user on one Site.
///
/// Created on first grant and updated in place thereafter; history lives in
/// the Change entries each grant produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    /// Unique grant identifier
    pub id: Uuid,
    /// Grantee
    pub user_id: Uuid,
    /// Site the capabilities apply to
    pub site_id: Uuid,
    /// Granted capabilities
    pub permissions: BTreeSet<Capability>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    /// Create a new grant
    pub fn new(user_id: Uuid, site_id: Uuid, permissions: BTreeSet<Capability>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            site_id,
            permissions,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when this grant satisfies `capability`. `admin` satisfies
    /// everything scoped to the same site.
    pub fn allows(&self, capability: Capability) -> bool {
        self.permissions.contains(&capability) || self.permissions.contains(&Capability::Admin)
    }
}

/// A known actor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier
    pub id: Uuid,
    /// Email address, unique across the deployment
    pub email: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_subsumes() {
        let grant = Permission::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            BTreeSet::from([Capability::Admin]),
        );
        assert!(grant.allows(Capability::Networks));
        assert!(grant.allows(Capability::NetworkAttrs));
        assert!(grant.allows(Capability::Admin));
    }

    #[test]
    fn test_scoped_capability_does_not_escalate() {
        let grant = Permission::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            BTreeSet::from([Capability::Networks]),
        );
        assert!(grant.allows(Capability::Networks));
        assert!(!grant.allows(Capability::NetworkAttrs));
        assert!(!grant.allows(Capability::Admin));
    }

    #[test]
    fn test_capability_serde_names() {
        assert_eq!(
            serde_json::to_string(&Capability::NetworkAttrs).unwrap(),
            "\"network_attrs\""
        );
        assert_eq!(Capability::Admin.to_string(), "admin");
    }
}
