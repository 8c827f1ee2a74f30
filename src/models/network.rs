//! Network model

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cidr::{Cidr, IpVersion};
use crate::models::AttributeValue;

/// A node in a Site's containment forest: a CIDR block or host address.
///
/// `parent_id` always points at the most specific network in the same Site
/// that contains this one, or is `None` for roots. It is a derived relation
/// maintained by the forest, never set by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    /// Unique network identifier
    pub id: Uuid,
    /// Owning site
    pub site_id: Uuid,
    /// Address block, canonical
    pub cidr: Cidr,
    /// Most specific containing network within the same site
    pub parent_id: Option<Uuid>,
    /// Attribute values, validated against the site's schema
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Network {
    /// Create a new root network with no attributes. The forest assigns
    /// `parent_id` on insertion.
    pub fn new(site_id: Uuid, cidr: Cidr) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            site_id,
            cidr,
            parent_id: None,
            attributes: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Address family
    pub fn ip_version(&self) -> IpVersion {
        self.cidr.version()
    }

    /// True when this entry is a host address (full-width prefix)
    pub fn is_ip(&self) -> bool {
        self.cidr.is_host()
    }

    /// Network address
    pub fn network_address(&self) -> IpAddr {
        self.cidr.network_address()
    }

    /// Prefix length in bits
    pub fn prefix_length(&self) -> u8 {
        self.cidr.prefix_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_detection() {
        let site_id = Uuid::new_v4();

        let net = Network::new(site_id, "10.0.0.0/24".parse().unwrap());
        assert!(!net.is_ip());
        assert_eq!(net.ip_version(), IpVersion::V4);
        assert_eq!(net.prefix_length(), 24);

        let ip = Network::new(site_id, "10.0.0.1/32".parse().unwrap());
        assert!(ip.is_ip());
    }
}
