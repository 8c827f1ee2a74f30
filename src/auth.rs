//! Authorization gate
//!
//! Every structural mutation consults [`Authorizer::has_capability`] before
//! doing anything else; a denial aborts with no Change entry. The trait is
//! the seam: the bundled [`PermissionStore`] satisfies it for in-process use,
//! and an external permission service can be injected in its place.

use std::collections::BTreeSet;

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::{Capability, Permission};

/// Capability check contract consulted by every mutating operation
pub trait Authorizer: Send + Sync {
    /// True when `user_id` holds `capability` on `site_id`. The `admin`
    /// capability subsumes resource-scoped capabilities for that site only.
    fn has_capability(&self, user_id: Uuid, site_id: Uuid, capability: Capability) -> bool;
}

/// In-memory permission store keyed by `(user, site)`
#[derive(Debug, Default)]
pub struct PermissionStore {
    grants: DashMap<(Uuid, Uuid), Permission>,
}

impl PermissionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the capability set for `(user, site)`. Returns the
    /// resulting grant and whether it already existed.
    pub fn grant(
        &self,
        user_id: Uuid,
        site_id: Uuid,
        capabilities: BTreeSet<Capability>,
    ) -> (Permission, bool) {
        let mut existed = false;
        let grant = self
            .grants
            .entry((user_id, site_id))
            .and_modify(|p| {
                existed = true;
                p.permissions = capabilities.clone();
                p.updated_at = Utc::now();
            })
            .or_insert_with(|| Permission::new(user_id, site_id, capabilities))
            .clone();
        (grant, existed)
    }

    /// Look up the grant for `(user, site)`
    pub fn get(&self, user_id: Uuid, site_id: Uuid) -> Option<Permission> {
        self.grants.get(&(user_id, site_id)).map(|p| p.clone())
    }

    /// All grants held by one user
    pub fn list_for_user(&self, user_id: Uuid) -> Vec<Permission> {
        let mut grants: Vec<Permission> = self
            .grants
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.clone())
            .collect();
        grants.sort_by_key(|p| p.site_id);
        grants
    }

    /// Drop every grant scoped to `site_id`. Used when a site is deleted.
    pub fn remove_site(&self, site_id: Uuid) {
        self.grants.retain(|(_, sid), _| *sid != site_id);
    }
}

impl Authorizer for PermissionStore {
    fn has_capability(&self, user_id: Uuid, site_id: Uuid, capability: Capability) -> bool {
        self.grants
            .get(&(user_id, site_id))
            .map(|grant| grant.allows(capability))
            .unwrap_or(false)
    }
}
