//! IPAM Core
//!
//! An IP address management source of truth. Tracks Sites, the Networks and
//! host addresses that belong to them, free-form attributes on those
//! networks, per-user/per-site permissions, and an immutable history of
//! every mutation.
//!
//! The heart of the crate is the per-site network forest: CIDR blocks and
//! host addresses ordered by address containment, where every node's parent
//! is its most specific containing network. Insertion and removal
//! incrementally re-link the affected nodes so subnet/supernet queries are
//! always answered from a consistent hierarchy.
//!
//! Features:
//! - IPv4/IPv6 containment algebra over canonical CIDR blocks
//! - Forest maintenance: insert interposes, delete promotes children
//! - Schema-validated attribute values on networks
//! - Append-only audit log with filtered retrieval
//! - Capability-gated mutations (`admin`, `networks`, `network_attrs`)
//!
//! The HTTP surface, authentication, and response envelopes live in
//! external collaborators; [`IpamManager`] is the boundary they call.

pub mod attributes;
pub mod auth;
pub mod changelog;
pub mod cidr;
pub mod error;
pub mod forest;
pub mod models;
pub mod service;

// Re-export core types
pub use attributes::AttributeSchema;
pub use auth::{Authorizer, PermissionStore};
pub use changelog::{ChangeFilter, ChangeLog};
pub use cidr::{Cidr, CidrKey, IpVersion};
pub use error::{Error, ErrorKind, Result};
pub use forest::{NetworkFilter, NetworkForest};
pub use models::{
    AttributeValue, Capability, Change, ChangeEvent, Network, NetworkAttribute, Permission,
    ResourceType, Site, User,
};
pub use service::IpamManager;
