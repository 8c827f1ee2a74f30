//! Immutable audit records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// The mutation a change records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeEvent {
    /// Resource was created
    Create,
    /// Resource was updated
    Update,
    /// Resource was deleted
    Delete,
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEvent::Create => write!(f, "Create"),
            ChangeEvent::Update => write!(f, "Update"),
            ChangeEvent::Delete => write!(f, "Delete"),
        }
    }
}

/// The resource kinds tracked in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    /// A site
    Site,
    /// A network or host address
    Network,
    /// An attribute definition
    NetworkAttribute,
    /// A per-user, per-site capability grant
    Permission,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Site => write!(f, "Site"),
            ResourceType::Network => write!(f, "Network"),
            ResourceType::NetworkAttribute => write!(f, "NetworkAttribute"),
            ResourceType::Permission => write!(f, "Permission"),
        }
    }
}

/// One immutable audit record.
///
/// Written exactly once per successful mutation; never updated or deleted.
/// `resource` holds the full serialized snapshot after the event, or the
/// last-known snapshot for a delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    /// Unique change identifier
    pub id: Uuid,
    /// Owning site; `None` for cross-site resources
    pub site_id: Option<Uuid>,
    /// Actor that performed the mutation
    pub user_id: Uuid,
    /// When the mutation happened
    pub change_at: DateTime<Utc>,
    /// What happened
    pub event: ChangeEvent,
    /// Kind of the mutated resource
    pub resource_type: ResourceType,
    /// Identifier of the mutated resource
    pub resource_id: Uuid,
    /// Serialized snapshot of the resource
    pub resource: serde_json::Value,
}

impl Change {
    /// Build a change record with a snapshot of `resource`.
    ///
    /// Serialization happens here, before any state is touched, so a failing
    /// snapshot aborts the enclosing mutation cleanly.
    pub fn new<T: Serialize>(
        user_id: Uuid,
        site_id: Option<Uuid>,
        event: ChangeEvent,
        resource_type: ResourceType,
        resource_id: Uuid,
        resource: &T,
    ) -> Result<Self> {
        let snapshot = serde_json::to_value(resource)
            .map_err(|e| Error::Internal(format!("snapshot serialization failed: {e}")))?;

        Ok(Self {
            id: Uuid::new_v4(),
            site_id,
            user_id,
            change_at: Utc::now(),
            event,
            resource_type,
            resource_id,
            resource: snapshot,
        })
    }
}
