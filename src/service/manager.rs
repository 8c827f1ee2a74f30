//! IPAM manager service
//!
//! Core orchestration over the per-site state, providing:
//! - Site, user and permission management
//! - Network CRUD with forest maintenance
//! - Attribute schema CRUD and validation
//! - Audit log recording and retrieval
//!
//! Every mutation runs gate -> validation -> structural update -> change
//! append under the owning site's write lock, so a failure at any step
//! leaves no partial state and no audit entry. Sites are independent
//! concurrency domains; there is no cross-site locking.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::attributes::AttributeSchema;
use crate::auth::{Authorizer, PermissionStore};
use crate::changelog::{ChangeFilter, ChangeLog};
use crate::cidr::Cidr;
use crate::forest::{NetworkForest, NetworkFilter};
use crate::models::{
    AttributeValue, Capability, Change, ChangeEvent, Network, NetworkAttribute, Permission,
    ResourceType, Site, User,
};
use crate::{Error, Result};

/// Everything one site owns, guarded as a unit
struct SiteState {
    site: Site,
    forest: NetworkForest,
    schema: AttributeSchema,
}

/// IPAM manager - the source-of-truth service
pub struct IpamManager {
    /// Per-site state; the RwLock is the site's exclusive section
    sites: DashMap<Uuid, Arc<RwLock<SiteState>>>,
    /// Site name uniqueness index
    site_names: DashMap<String, Uuid>,
    /// Network id to owning site
    network_sites: DashMap<Uuid, Uuid>,
    /// Users by id
    users: DashMap<Uuid, User>,
    /// Email uniqueness index
    user_emails: DashMap<String, Uuid>,
    /// Capability grants
    permissions: Arc<PermissionStore>,
    /// Gate consulted before every mutation
    authorizer: Arc<dyn Authorizer>,
    /// Audit log
    changelog: ChangeLog,
}

impl IpamManager {
    /// Create a manager using the bundled permission store as its gate
    pub fn new() -> Self {
        let permissions = Arc::new(PermissionStore::new());
        Self {
            sites: DashMap::new(),
            site_names: DashMap::new(),
            network_sites: DashMap::new(),
            users: DashMap::new(),
            user_emails: DashMap::new(),
            permissions: permissions.clone(),
            authorizer: permissions,
            changelog: ChangeLog::new(),
        }
    }

    /// Create a manager consulting an external authorizer. Grants made via
    /// [`set_permissions`](Self::set_permissions) still land in the bundled
    /// store; only the gate decision is delegated.
    pub fn with_authorizer(authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            authorizer,
            ..Self::new()
        }
    }

    // ==================== Users ====================

    /// Register a user. Emails are unique.
    pub fn create_user(&self, email: &str) -> Result<User> {
        match self.user_emails.entry(email.to_string()) {
            Entry::Occupied(_) => Err(Error::DuplicateUser(email.to_string())),
            Entry::Vacant(slot) => {
                let user = User::new(email);
                slot.insert(user.id);
                self.users.insert(user.id, user.clone());
                tracing::info!(user_id = %user.id, email = %email, "Created user");
                Ok(user)
            }
        }
    }

    /// Look up a user by id
    pub fn get_user(&self, user_id: Uuid) -> Result<User> {
        self.users
            .get(&user_id)
            .map(|u| u.clone())
            .ok_or(Error::UserNotFound(user_id))
    }

    /// All users, ordered by email
    pub fn list_users(&self, offset: usize, limit: Option<usize>) -> (Vec<User>, usize) {
        let mut users: Vec<User> = self.users.iter().map(|u| u.clone()).collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        paginate(users, offset, limit)
    }

    // ==================== Sites ====================

    /// Create a site. The creator receives the `admin` capability on it.
    pub fn create_site(&self, actor: Uuid, name: &str, description: &str) -> Result<Site> {
        self.require_user(actor)?;

        let site = Site::new(name, description);
        let change = Change::new(
            actor,
            Some(site.id),
            ChangeEvent::Create,
            ResourceType::Site,
            site.id,
            &site,
        )?;

        match self.site_names.entry(name.to_string()) {
            Entry::Occupied(_) => return Err(Error::DuplicateSite(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(site.id);
            }
        }

        self.sites.insert(
            site.id,
            Arc::new(RwLock::new(SiteState {
                site: site.clone(),
                forest: NetworkForest::new(),
                schema: AttributeSchema::new(),
            })),
        );
        self.changelog.record(change);

        let (grant, _) = self
            .permissions
            .grant(actor, site.id, BTreeSet::from([Capability::Admin]));
        let grant_change = Change::new(
            actor,
            Some(site.id),
            ChangeEvent::Create,
            ResourceType::Permission,
            grant.id,
            &grant,
        )?;
        self.changelog.record(grant_change);

        tracing::info!(site_id = %site.id, name = %name, "Created site");
        Ok(site)
    }

    /// Look up a site by id
    pub fn get_site(&self, site_id: Uuid) -> Result<Site> {
        let state = self.site_state(site_id)?;
        let site = state.read().site.clone();
        Ok(site)
    }

    /// All sites, ordered by name
    pub fn list_sites(&self, offset: usize, limit: Option<usize>) -> (Vec<Site>, usize) {
        // Collect the handles first: taking a site lock while still inside
        // the map iteration would invert the lock order against delete_site.
        let states: Vec<Arc<RwLock<SiteState>>> = self
            .sites
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut sites: Vec<Site> = states.iter().map(|state| state.read().site.clone()).collect();
        sites.sort_by(|a, b| a.name.cmp(&b.name));
        paginate(sites, offset, limit)
    }

    /// Rename a site or update its description. Requires `admin`.
    pub fn update_site(
        &self,
        actor: Uuid,
        site_id: Uuid,
        name: &str,
        description: &str,
    ) -> Result<Site> {
        self.require_user(actor)?;
        self.authorize(actor, site_id, Capability::Admin)?;

        let state = self.site_state(site_id)?;
        let mut state = state.write();

        let mut updated = state.site.clone();
        updated.name = name.to_string();
        updated.description = description.to_string();
        updated.updated_at = Utc::now();

        let change = Change::new(
            actor,
            Some(site_id),
            ChangeEvent::Update,
            ResourceType::Site,
            site_id,
            &updated,
        )?;

        let old_name = state.site.name.clone();
        if name != old_name {
            match self.site_names.entry(name.to_string()) {
                Entry::Occupied(_) => return Err(Error::DuplicateSite(name.to_string())),
                Entry::Vacant(slot) => {
                    slot.insert(site_id);
                }
            }
            self.site_names.remove(&old_name);
        }

        state.site = updated.clone();
        self.changelog.record(change);

        tracing::info!(site_id = %site_id, name = %name, "Updated site");
        Ok(updated)
    }

    /// Delete a site. Requires `admin`; fails while the site still owns
    /// networks or attribute definitions. The site's permission grants are
    /// dropped with it.
    pub fn delete_site(&self, actor: Uuid, site_id: Uuid) -> Result<()> {
        self.require_user(actor)?;
        self.authorize(actor, site_id, Capability::Admin)?;

        let state = self.site_state(site_id)?;
        let state = state.write();

        if !state.forest.is_empty() || !state.schema.is_empty() {
            return Err(Error::SiteNotEmpty {
                networks: state.forest.len(),
                attributes: state.schema.len(),
            });
        }

        let change = Change::new(
            actor,
            Some(site_id),
            ChangeEvent::Delete,
            ResourceType::Site,
            site_id,
            &state.site,
        )?;

        self.site_names.remove(&state.site.name);
        self.sites.remove(&site_id);
        self.permissions.remove_site(site_id);
        self.changelog.record(change);

        tracing::info!(site_id = %site_id, "Deleted site");
        Ok(())
    }

    // ==================== Permissions ====================

    /// Create or replace the capability set a user holds on a site.
    /// Requires `admin` on that site.
    pub fn set_permissions(
        &self,
        actor: Uuid,
        user_id: Uuid,
        site_id: Uuid,
        capabilities: BTreeSet<Capability>,
    ) -> Result<Permission> {
        self.require_user(actor)?;
        self.authorize(actor, site_id, Capability::Admin)?;
        self.require_user(user_id)?;
        self.site_state(site_id)?;

        let (grant, existed) = self.permissions.grant(user_id, site_id, capabilities);
        let event = if existed {
            ChangeEvent::Update
        } else {
            ChangeEvent::Create
        };
        let change = Change::new(
            actor,
            Some(site_id),
            event,
            ResourceType::Permission,
            grant.id,
            &grant,
        )?;
        self.changelog.record(change);

        tracing::info!(
            user_id = %user_id,
            site_id = %site_id,
            permissions = ?grant.permissions,
            "Set permissions"
        );
        Ok(grant)
    }

    /// The grant one user holds on one site
    pub fn get_permission(&self, user_id: Uuid, site_id: Uuid) -> Result<Permission> {
        self.permissions
            .get(user_id, site_id)
            .ok_or(Error::PermissionNotFound { user_id, site_id })
    }

    /// All grants held by one user, ordered by site
    pub fn list_permissions(&self, user_id: Uuid) -> Result<Vec<Permission>> {
        self.require_user(user_id)?;
        Ok(self.permissions.list_for_user(user_id))
    }

    // ==================== Network Attributes ====================

    /// Define an attribute on a site. Requires `admin` or `network_attrs`.
    pub fn define_attribute(
        &self,
        actor: Uuid,
        site_id: Uuid,
        name: &str,
        description: &str,
        required: bool,
        multi: bool,
    ) -> Result<NetworkAttribute> {
        self.require_user(actor)?;
        self.authorize(actor, site_id, Capability::NetworkAttrs)?;

        let state = self.site_state(site_id)?;
        let mut state = state.write();

        let attr = state
            .schema
            .define(site_id, name, description, required, multi)?
            .clone();
        let change = Change::new(
            actor,
            Some(site_id),
            ChangeEvent::Create,
            ResourceType::NetworkAttribute,
            attr.id,
            &attr,
        )?;
        self.changelog.record(change);

        tracing::info!(site_id = %site_id, name = %name, required, multi, "Defined attribute");
        Ok(attr)
    }

    /// Update an attribute's description and flags. The name is immutable.
    /// Requires `admin` or `network_attrs`.
    pub fn update_attribute(
        &self,
        actor: Uuid,
        site_id: Uuid,
        attribute_id: Uuid,
        description: &str,
        required: bool,
        multi: bool,
    ) -> Result<NetworkAttribute> {
        self.require_user(actor)?;
        self.authorize(actor, site_id, Capability::NetworkAttrs)?;

        let state = self.site_state(site_id)?;
        let mut state = state.write();

        let attr = state
            .schema
            .update(attribute_id, description, required, multi)?
            .clone();
        let change = Change::new(
            actor,
            Some(site_id),
            ChangeEvent::Update,
            ResourceType::NetworkAttribute,
            attr.id,
            &attr,
        )?;
        self.changelog.record(change);

        tracing::info!(site_id = %site_id, attribute_id = %attribute_id, "Updated attribute");
        Ok(attr)
    }

    /// Delete an attribute definition. Rejected while any network in the
    /// site still carries a value under its name (no silent orphaning).
    /// Requires `admin` or `network_attrs`.
    pub fn delete_attribute(&self, actor: Uuid, site_id: Uuid, attribute_id: Uuid) -> Result<()> {
        self.require_user(actor)?;
        self.authorize(actor, site_id, Capability::NetworkAttrs)?;

        let state = self.site_state(site_id)?;
        let mut state = state.write();

        let name = state
            .schema
            .get(attribute_id)
            .ok_or(Error::AttributeNotFound(attribute_id))?
            .name
            .clone();

        let count = state.forest.attribute_use_count(&name);
        if count > 0 {
            return Err(Error::AttributeInUse { name, count });
        }

        let attr = state.schema.remove(attribute_id)?;
        let change = Change::new(
            actor,
            Some(site_id),
            ChangeEvent::Delete,
            ResourceType::NetworkAttribute,
            attr.id,
            &attr,
        )?;
        self.changelog.record(change);

        tracing::info!(site_id = %site_id, name = %attr.name, "Deleted attribute");
        Ok(())
    }

    /// Look up an attribute definition
    pub fn get_attribute(&self, site_id: Uuid, attribute_id: Uuid) -> Result<NetworkAttribute> {
        let state = self.site_state(site_id)?;
        let state = state.read();
        state
            .schema
            .get(attribute_id)
            .cloned()
            .ok_or(Error::AttributeNotFound(attribute_id))
    }

    /// A site's attribute definitions, ordered by name
    pub fn list_attributes(
        &self,
        site_id: Uuid,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<(Vec<NetworkAttribute>, usize)> {
        let state = self.site_state(site_id)?;
        let state = state.read();
        let attrs: Vec<NetworkAttribute> = state.schema.list().into_iter().cloned().collect();
        Ok(paginate(attrs, offset, limit))
    }

    // ==================== Networks ====================

    /// Create a network from CIDR text. Requires `admin` or `networks`.
    ///
    /// The new node is linked under its most specific containing network and
    /// adopts any existing networks it encloses; attribute values are
    /// validated against the site schema before anything is written.
    pub fn create_network(
        &self,
        actor: Uuid,
        site_id: Uuid,
        cidr: &str,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Result<Network> {
        self.require_user(actor)?;
        self.authorize(actor, site_id, Capability::Networks)?;

        let state = self.site_state(site_id)?;
        let mut state = state.write();

        let cidr: Cidr = cidr.parse()?;
        if state.forest.contains_cidr(&cidr) {
            return Err(Error::DuplicateNetwork(cidr.to_string()));
        }
        state.schema.validate(&attributes)?;

        let mut network = Network::new(site_id, cidr);
        network.attributes = attributes;
        network.parent_id = state.forest.parent_of(&cidr);

        // Snapshot before the structural write so a failure leaves nothing
        let change = Change::new(
            actor,
            Some(site_id),
            ChangeEvent::Create,
            ResourceType::Network,
            network.id,
            &network,
        )?;

        let id = state.forest.insert(network.clone())?;
        self.network_sites.insert(id, site_id);
        self.changelog.record(change);

        tracing::info!(
            site_id = %site_id,
            network_id = %id,
            cidr = %cidr,
            parent_id = ?network.parent_id,
            "Created network"
        );
        Ok(network)
    }

    /// Replace a network's attribute values. Structure never changes on an
    /// attribute-only update. Requires `admin` or `networks`.
    pub fn update_network(
        &self,
        actor: Uuid,
        network_id: Uuid,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Result<Network> {
        self.require_user(actor)?;
        let site_id = self.network_site(network_id)?;
        self.authorize(actor, site_id, Capability::Networks)?;

        let state = self.site_state(site_id)?;
        let mut state = state.write();

        state.schema.validate(&attributes)?;
        let updated = state.forest.set_attributes(network_id, attributes)?.clone();

        let change = Change::new(
            actor,
            Some(site_id),
            ChangeEvent::Update,
            ResourceType::Network,
            network_id,
            &updated,
        )?;
        self.changelog.record(change);

        tracing::info!(site_id = %site_id, network_id = %network_id, "Updated network");
        Ok(updated)
    }

    /// Delete a network. Its children are promoted to its former parent.
    /// Requires `admin` or `networks`.
    pub fn delete_network(&self, actor: Uuid, network_id: Uuid) -> Result<()> {
        self.require_user(actor)?;
        let site_id = self.network_site(network_id)?;
        self.authorize(actor, site_id, Capability::Networks)?;

        let state = self.site_state(site_id)?;
        let mut state = state.write();

        let snapshot = state
            .forest
            .get(network_id)
            .cloned()
            .ok_or(Error::NetworkNotFound(network_id))?;
        let change = Change::new(
            actor,
            Some(site_id),
            ChangeEvent::Delete,
            ResourceType::Network,
            network_id,
            &snapshot,
        )?;

        state.forest.remove(network_id)?;
        self.network_sites.remove(&network_id);
        self.changelog.record(change);

        tracing::info!(site_id = %site_id, network_id = %network_id, cidr = %snapshot.cidr, "Deleted network");
        Ok(())
    }

    /// Look up a network by id
    pub fn get_network(&self, network_id: Uuid) -> Result<Network> {
        let site_id = self.network_site(network_id)?;
        let state = self.site_state(site_id)?;
        let state = state.read();
        state
            .forest
            .get(network_id)
            .cloned()
            .ok_or(Error::NetworkNotFound(network_id))
    }

    /// A site's networks, ordered ascending by address then prefix
    pub fn list_networks(
        &self,
        site_id: Uuid,
        root_only: bool,
        filter: NetworkFilter,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<(Vec<Network>, usize)> {
        let state = self.site_state(site_id)?;
        let state = state.read();
        let networks: Vec<Network> = state
            .forest
            .list(root_only, filter)
            .into_iter()
            .cloned()
            .collect();
        Ok(paginate(networks, offset, limit))
    }

    /// Subnets of a network: immediate children when `direct`, otherwise all
    /// descendants
    pub fn subnets(
        &self,
        network_id: Uuid,
        direct: bool,
        filter: NetworkFilter,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<(Vec<Network>, usize)> {
        let site_id = self.network_site(network_id)?;
        let state = self.site_state(site_id)?;
        let state = state.read();
        let networks: Vec<Network> = state
            .forest
            .subnets(network_id, direct, filter)?
            .into_iter()
            .cloned()
            .collect();
        Ok(paginate(networks, offset, limit))
    }

    /// Supernets of a network: the immediate parent when `direct`, otherwise
    /// the ancestor chain ordered most specific first
    pub fn supernets(
        &self,
        network_id: Uuid,
        direct: bool,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<(Vec<Network>, usize)> {
        let site_id = self.network_site(network_id)?;
        let state = self.site_state(site_id)?;
        let state = state.read();
        let networks: Vec<Network> = state
            .forest
            .supernets(network_id, direct)?
            .into_iter()
            .cloned()
            .collect();
        Ok(paginate(networks, offset, limit))
    }

    // ==================== Changes ====================

    /// Audit entries matching `filter`, newest first.
    ///
    /// A `resource_id` filter requires `resource_type`; a site filter
    /// requires the site to exist.
    pub fn query_changes(
        &self,
        filter: ChangeFilter,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<(Vec<Change>, usize)> {
        if filter.resource_id.is_some() && filter.resource_type.is_none() {
            return Err(Error::FilterRequiresResourceType);
        }
        if let Some(site_id) = filter.site_id {
            self.site_state(site_id)?;
        }
        Ok(self.changelog.query(&filter, offset, limit))
    }

    /// Look up one audit entry
    pub fn get_change(&self, change_id: Uuid) -> Result<Change> {
        self.changelog
            .get(change_id)
            .ok_or(Error::ChangeNotFound(change_id))
    }

    // ==================== Internals ====================

    fn require_user(&self, user_id: Uuid) -> Result<()> {
        if self.users.contains_key(&user_id) {
            Ok(())
        } else {
            Err(Error::UserNotFound(user_id))
        }
    }

    fn authorize(&self, actor: Uuid, site_id: Uuid, capability: Capability) -> Result<()> {
        if self.authorizer.has_capability(actor, site_id, capability) {
            Ok(())
        } else {
            Err(Error::Forbidden {
                user_id: actor,
                site_id,
                capability: capability.to_string(),
            })
        }
    }

    fn site_state(&self, site_id: Uuid) -> Result<Arc<RwLock<SiteState>>> {
        self.sites
            .get(&site_id)
            .map(|entry| entry.clone())
            .ok_or(Error::SiteNotFound(site_id))
    }

    fn network_site(&self, network_id: Uuid) -> Result<Uuid> {
        self.network_sites
            .get(&network_id)
            .map(|entry| *entry)
            .ok_or(Error::NetworkNotFound(network_id))
    }
}

impl Default for IpamManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Slice a full result set by offset/limit, keeping the pre-slice total
fn paginate<T>(items: Vec<T>, offset: usize, limit: Option<usize>) -> (Vec<T>, usize) {
    let total = items.len();
    let page = items
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    (page, total)
}
