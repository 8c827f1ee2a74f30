//! Per-site network containment forest
//!
//! Maintains the "parent = most specific containing network" invariant under
//! insertion and removal, and answers subnet/supernet queries. The forest is
//! an arena keyed by network id with a separately maintained adjacency map;
//! `parent_id` on each node is derived data, recomputed incrementally.
//!
//! The ordered index (`BTreeMap<CidrKey, Uuid>`) does double duty: it
//! enforces per-site uniqueness of `(address, prefix, family)` and makes both
//! longest-prefix ancestor lookups and descendant range scans O(log n).

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use uuid::Uuid;

use crate::cidr::{Cidr, CidrKey};
use crate::models::{AttributeValue, Network};
use crate::{Error, Result};

/// Visibility filter for network listings
#[derive(Debug, Clone, Copy)]
pub struct NetworkFilter {
    /// Include CIDR blocks (non-host entries)
    pub include_networks: bool,
    /// Include host addresses
    pub include_ips: bool,
}

impl Default for NetworkFilter {
    fn default() -> Self {
        Self {
            include_networks: true,
            include_ips: false,
        }
    }
}

impl NetworkFilter {
    /// Include both blocks and host addresses
    pub fn all() -> Self {
        Self {
            include_networks: true,
            include_ips: true,
        }
    }

    fn matches(&self, network: &Network) -> bool {
        if network.is_ip() {
            self.include_ips
        } else {
            self.include_networks
        }
    }
}

/// One Site's containment forest
#[derive(Debug, Default)]
pub struct NetworkForest {
    /// Node arena
    nodes: HashMap<Uuid, Network>,
    /// Ordered uniqueness index
    by_key: BTreeMap<CidrKey, Uuid>,
    /// Adjacency: node id to immediate children
    children: HashMap<Uuid, Vec<Uuid>>,
    /// Nodes with no containing network
    roots: Vec<Uuid>,
}

impl NetworkForest {
    /// Create an empty forest
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of networks in the forest
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the forest holds no networks
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a network by id
    pub fn get(&self, id: Uuid) -> Option<&Network> {
        self.nodes.get(&id)
    }

    /// True when an identical `(address, prefix, family)` already exists
    pub fn contains_cidr(&self, cidr: &Cidr) -> bool {
        self.by_key.contains_key(&cidr.key())
    }

    /// Insert a network, linking it under its most specific containing
    /// network and capturing any existing networks it encloses.
    ///
    /// Only immediate children of the new node's parent slot can be
    /// captured: for any existing node X contained by the new block N, X's
    /// previous parent is necessarily N's parent, so a single pass over that
    /// slot restores the invariant for the whole site.
    pub fn insert(&mut self, mut network: Network) -> Result<Uuid> {
        let key = network.cidr.key();
        if self.by_key.contains_key(&key) {
            return Err(Error::DuplicateNetwork(network.cidr.to_string()));
        }

        let parent_id = self.parent_of(&network.cidr);
        network.parent_id = parent_id;
        let id = network.id;

        let siblings: Vec<Uuid> = match parent_id {
            Some(parent) => self.children.get(&parent).cloned().unwrap_or_default(),
            None => self.roots.clone(),
        };

        let (captured, mut kept): (Vec<Uuid>, Vec<Uuid>) = siblings.into_iter().partition(|sid| {
            self.nodes
                .get(sid)
                .is_some_and(|sibling| network.cidr.contains(&sibling.cidr))
        });

        for sid in &captured {
            if let Some(node) = self.nodes.get_mut(sid) {
                node.parent_id = Some(id);
            }
        }

        kept.push(id);
        match parent_id {
            Some(parent) => {
                self.children.insert(parent, kept);
            }
            None => {
                self.roots = kept;
            }
        }

        self.children.insert(id, captured);
        self.by_key.insert(key, id);
        self.nodes.insert(id, network);

        Ok(id)
    }

    /// Remove a network. Its children are promoted to its former parent, or
    /// become roots when the removed node was one; no other node changes.
    pub fn remove(&mut self, id: Uuid) -> Result<Network> {
        let network = self.nodes.remove(&id).ok_or(Error::NetworkNotFound(id))?;
        self.by_key.remove(&network.cidr.key());

        let promoted = self.children.remove(&id).unwrap_or_default();
        for child_id in &promoted {
            if let Some(child) = self.nodes.get_mut(child_id) {
                child.parent_id = network.parent_id;
            }
        }

        match network.parent_id {
            Some(parent) => {
                if let Some(slot) = self.children.get_mut(&parent) {
                    slot.retain(|entry| *entry != id);
                    slot.extend(promoted);
                }
            }
            None => {
                self.roots.retain(|entry| *entry != id);
                self.roots.extend(promoted);
            }
        }

        Ok(network)
    }

    /// Replace a network's attribute values. Structural position never
    /// changes on an attribute-only update.
    pub fn set_attributes(
        &mut self,
        id: Uuid,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Result<&Network> {
        let network = self.nodes.get_mut(&id).ok_or(Error::NetworkNotFound(id))?;
        network.attributes = attributes;
        network.updated_at = Utc::now();
        Ok(network)
    }

    /// Subnets of a network: immediate children when `direct`, otherwise the
    /// full descendant set. Ordered ascending by address, broader first.
    pub fn subnets(&self, id: Uuid, direct: bool, filter: NetworkFilter) -> Result<Vec<&Network>> {
        let network = self.nodes.get(&id).ok_or(Error::NetworkNotFound(id))?;

        let matches = if direct {
            let mut kids: Vec<&Network> = self
                .children
                .get(&id)
                .into_iter()
                .flatten()
                .filter_map(|child_id| self.nodes.get(child_id))
                .collect();
            kids.sort_by_key(|n| n.cidr.key());
            kids
        } else {
            self.by_key
                .range(network.cidr.descendant_range())
                .filter_map(|(_, nid)| self.nodes.get(nid))
                .collect()
        };

        Ok(matches.into_iter().filter(|n| filter.matches(n)).collect())
    }

    /// Supernets of a network: the immediate parent when `direct`, otherwise
    /// the whole ancestor chain ordered most specific first.
    pub fn supernets(&self, id: Uuid, direct: bool) -> Result<Vec<&Network>> {
        let network = self.nodes.get(&id).ok_or(Error::NetworkNotFound(id))?;

        let mut chain = Vec::new();
        let mut cursor = network.parent_id;
        while let Some(parent_id) = cursor {
            let parent = self
                .nodes
                .get(&parent_id)
                .ok_or_else(|| Error::Internal(format!("dangling parent {parent_id}")))?;
            chain.push(parent);
            if direct {
                break;
            }
            cursor = parent.parent_id;
        }

        Ok(chain)
    }

    /// All networks in the forest, ordered ascending by address then prefix.
    pub fn list(&self, root_only: bool, filter: NetworkFilter) -> Vec<&Network> {
        self.by_key
            .values()
            .filter_map(|id| self.nodes.get(id))
            .filter(|n| !root_only || n.parent_id.is_none())
            .filter(|n| filter.matches(n))
            .collect()
    }

    /// Number of networks carrying a value under `name`
    pub fn attribute_use_count(&self, name: &str) -> usize {
        self.nodes
            .values()
            .filter(|n| n.attributes.contains_key(name))
            .count()
    }

    /// Most specific existing network containing `cidr`, via longest-prefix
    /// lookups against the ordered index. This is the parent a node at
    /// `cidr` would be linked under.
    pub fn parent_of(&self, cidr: &Cidr) -> Option<Uuid> {
        for prefix_len in (0..cidr.prefix_len()).rev() {
            if let Some(id) = self.by_key.get(&cidr.ancestor_key(prefix_len)) {
                return Some(*id);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(site_id: Uuid, s: &str) -> Network {
        Network::new(site_id, s.parse().unwrap())
    }

    fn forest_with(site_id: Uuid, cidrs: &[&str]) -> (NetworkForest, Vec<Uuid>) {
        let mut forest = NetworkForest::new();
        let ids = cidrs
            .iter()
            .map(|s| forest.insert(network(site_id, s)).unwrap())
            .collect();
        (forest, ids)
    }

    #[test]
    fn test_insert_links_most_specific_parent() {
        let site_id = Uuid::new_v4();
        let (forest, ids) = forest_with(site_id, &["10.0.0.0/8", "10.0.0.0/16", "10.0.0.0/24"]);

        assert_eq!(forest.get(ids[0]).unwrap().parent_id, None);
        assert_eq!(forest.get(ids[1]).unwrap().parent_id, Some(ids[0]));
        // Parent is the /16, not the looser /8
        assert_eq!(forest.get(ids[2]).unwrap().parent_id, Some(ids[1]));
    }

    #[test]
    fn test_insert_interposes_between_parent_and_child() {
        let site_id = Uuid::new_v4();
        let (mut forest, ids) = forest_with(site_id, &["10.0.0.0/8", "10.0.0.0/24"]);
        assert_eq!(forest.get(ids[1]).unwrap().parent_id, Some(ids[0]));

        // The /16 slots in between: /24 re-points to it, /8 stays its parent
        let middle = forest.insert(network(site_id, "10.0.0.0/16")).unwrap();
        assert_eq!(forest.get(middle).unwrap().parent_id, Some(ids[0]));
        assert_eq!(forest.get(ids[1]).unwrap().parent_id, Some(middle));
    }

    #[test]
    fn test_insert_captures_only_contained_siblings() {
        let site_id = Uuid::new_v4();
        let (mut forest, ids) = forest_with(
            site_id,
            &["10.0.0.0/8", "10.1.0.0/16", "10.2.0.0/16", "10.128.0.0/16"],
        );

        // 10.0.0.0/9 covers 10.0-10.127: captures the first two /16s only
        let nine = forest.insert(network(site_id, "10.0.0.0/9")).unwrap();
        assert_eq!(forest.get(ids[1]).unwrap().parent_id, Some(nine));
        assert_eq!(forest.get(ids[2]).unwrap().parent_id, Some(nine));
        assert_eq!(forest.get(ids[3]).unwrap().parent_id, Some(ids[0]));
        assert_eq!(forest.get(nine).unwrap().parent_id, Some(ids[0]));
    }

    #[test]
    fn test_insert_new_root_captures_existing_roots() {
        let site_id = Uuid::new_v4();
        let (mut forest, ids) = forest_with(site_id, &["10.1.0.0/16", "192.168.0.0/16"]);

        let eight = forest.insert(network(site_id, "10.0.0.0/8")).unwrap();
        assert_eq!(forest.get(eight).unwrap().parent_id, None);
        assert_eq!(forest.get(ids[0]).unwrap().parent_id, Some(eight));
        assert_eq!(forest.get(ids[1]).unwrap().parent_id, None);
    }

    #[test]
    fn test_duplicate_rejected() {
        let site_id = Uuid::new_v4();
        let (mut forest, _) = forest_with(site_id, &["10.0.0.0/8"]);

        let result = forest.insert(network(site_id, "10.0.0.0/8"));
        assert!(matches!(result, Err(Error::DuplicateNetwork(_))));
        assert_eq!(forest.len(), 1);
    }

    #[test]
    fn test_remove_promotes_children() {
        let site_id = Uuid::new_v4();
        let (mut forest, ids) =
            forest_with(site_id, &["10.0.0.0/8", "10.0.0.0/16", "10.0.0.0/24", "10.0.1.0/24"]);

        forest.remove(ids[1]).unwrap();
        assert_eq!(forest.get(ids[2]).unwrap().parent_id, Some(ids[0]));
        assert_eq!(forest.get(ids[3]).unwrap().parent_id, Some(ids[0]));
    }

    #[test]
    fn test_remove_root_promotes_children_to_roots() {
        let site_id = Uuid::new_v4();
        let (mut forest, ids) = forest_with(site_id, &["10.0.0.0/8", "10.0.0.0/16", "10.1.0.0/16"]);

        forest.remove(ids[0]).unwrap();
        assert_eq!(forest.get(ids[1]).unwrap().parent_id, None);
        assert_eq!(forest.get(ids[2]).unwrap().parent_id, None);

        let roots = forest.list(true, NetworkFilter::all());
        assert_eq!(roots.len(), 2);
    }

    #[test]
    fn test_remove_missing() {
        let mut forest = NetworkForest::new();
        assert!(matches!(
            forest.remove(Uuid::new_v4()),
            Err(Error::NetworkNotFound(_))
        ));
    }

    #[test]
    fn test_subnets_direct_and_transitive() {
        let site_id = Uuid::new_v4();
        let (forest, ids) = forest_with(
            site_id,
            &["10.0.0.0/8", "10.0.0.0/16", "10.0.0.0/24", "10.0.0.1/32"],
        );

        let direct = forest.subnets(ids[0], true, NetworkFilter::all()).unwrap();
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].id, ids[1]);

        let all = forest.subnets(ids[0], false, NetworkFilter::all()).unwrap();
        let cidrs: Vec<String> = all.iter().map(|n| n.cidr.to_string()).collect();
        assert_eq!(cidrs, vec!["10.0.0.0/16", "10.0.0.0/24", "10.0.0.1/32"]);

        // Host filtering
        let no_ips = forest
            .subnets(ids[0], false, NetworkFilter::default())
            .unwrap();
        assert_eq!(no_ips.len(), 2);

        let only_ips = forest
            .subnets(
                ids[0],
                false,
                NetworkFilter {
                    include_networks: false,
                    include_ips: true,
                },
            )
            .unwrap();
        assert_eq!(only_ips.len(), 1);
        assert!(only_ips[0].is_ip());
    }

    #[test]
    fn test_subnets_exclude_unrelated_siblings() {
        let site_id = Uuid::new_v4();
        let (forest, ids) = forest_with(
            site_id,
            &["10.0.0.0/16", "10.0.1.0/24", "10.1.0.0/16", "192.168.0.0/16"],
        );

        let subs = forest.subnets(ids[0], false, NetworkFilter::all()).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id, ids[1]);
    }

    #[test]
    fn test_supernets_walk_up() {
        let site_id = Uuid::new_v4();
        let (forest, ids) = forest_with(site_id, &["10.0.0.0/8", "10.0.0.0/16", "10.0.0.0/24"]);

        let direct = forest.supernets(ids[2], true).unwrap();
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].id, ids[1]);

        // Most specific first, up to the root
        let chain = forest.supernets(ids[2], false).unwrap();
        let cidrs: Vec<String> = chain.iter().map(|n| n.cidr.to_string()).collect();
        assert_eq!(cidrs, vec!["10.0.0.0/16", "10.0.0.0/8"]);

        assert!(forest.supernets(ids[0], false).unwrap().is_empty());
    }

    #[test]
    fn test_list_ordering_and_root_filter() {
        let site_id = Uuid::new_v4();
        let (forest, _) = forest_with(
            site_id,
            &["192.168.0.0/16", "10.0.0.0/16", "10.0.0.0/8", "10.0.0.1/32"],
        );

        let all = forest.list(false, NetworkFilter::all());
        let cidrs: Vec<String> = all.iter().map(|n| n.cidr.to_string()).collect();
        assert_eq!(
            cidrs,
            vec!["10.0.0.0/8", "10.0.0.0/16", "10.0.0.1/32", "192.168.0.0/16"]
        );

        let roots = forest.list(true, NetworkFilter::all());
        let cidrs: Vec<String> = roots.iter().map(|n| n.cidr.to_string()).collect();
        assert_eq!(cidrs, vec!["10.0.0.0/8", "192.168.0.0/16"]);
    }

    #[test]
    fn test_families_do_not_mix() {
        let site_id = Uuid::new_v4();
        let (forest, ids) = forest_with(site_id, &["0.0.0.0/0", "2001:db8::/32", "2001:db8::/48"]);

        // The v4 default route contains no v6 network
        assert_eq!(forest.get(ids[1]).unwrap().parent_id, None);
        assert_eq!(forest.get(ids[2]).unwrap().parent_id, Some(ids[1]));
        assert!(forest
            .subnets(ids[0], false, NetworkFilter::all())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_hosts_are_leaves() {
        let site_id = Uuid::new_v4();
        let (forest, ids) = forest_with(site_id, &["10.0.0.1/32", "10.0.0.0/24"]);

        // The later, broader block becomes the host's parent
        assert_eq!(forest.get(ids[0]).unwrap().parent_id, Some(ids[1]));
        assert!(forest
            .subnets(ids[0], false, NetworkFilter::all())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_attribute_use_count() {
        let site_id = Uuid::new_v4();
        let mut forest = NetworkForest::new();
        let mut net = network(site_id, "10.0.0.0/8");
        net.attributes
            .insert("owner".to_string(), AttributeValue::from("ops"));
        forest.insert(net).unwrap();
        forest.insert(network(site_id, "10.1.0.0/16")).unwrap();

        assert_eq!(forest.attribute_use_count("owner"), 1);
        assert_eq!(forest.attribute_use_count("vlan"), 0);
    }
}
