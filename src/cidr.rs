//! CIDR parsing and containment algebra
//!
//! Networks and host addresses are both represented as a [`Cidr`]: an address
//! plus prefix length, canonical (no host bits set) and family-tagged. All
//! hierarchy decisions reduce to fixed-width unsigned integer comparisons on
//! the [`CidrKey`] ordering: ascending address, then broader prefixes first.

use std::fmt;
use std::net::IpAddr;
use std::ops::Bound;
use std::str::FromStr;

use ipnet::IpNet;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// IP address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IpVersion {
    /// IPv4 (32-bit addresses)
    #[serde(rename = "4")]
    V4,
    /// IPv6 (128-bit addresses)
    #[serde(rename = "6")]
    V6,
}

impl IpVersion {
    /// Address width in bits for this family
    pub fn bit_width(&self) -> u8 {
        match self {
            IpVersion::V4 => 32,
            IpVersion::V6 => 128,
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => write!(f, "4"),
            IpVersion::V6 => write!(f, "6"),
        }
    }
}

/// Total order over networks of both families.
///
/// Sorts by family, then network address, then prefix length, so a supernet
/// always sorts immediately before its subnets and a `BTreeMap` range scan
/// over an address span yields a hierarchy-respecting sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CidrKey {
    /// Address family
    pub version: IpVersion,
    /// Network address as a fixed-width unsigned integer (low 32 bits for v4)
    pub addr: u128,
    /// Prefix length in bits
    pub prefix_len: u8,
}

/// A canonical CIDR block or host address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    net: IpNet,
}

impl Cidr {
    /// Address family of this block
    pub fn version(&self) -> IpVersion {
        match self.net {
            IpNet::V4(_) => IpVersion::V4,
            IpNet::V6(_) => IpVersion::V6,
        }
    }

    /// Prefix length in bits
    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }

    /// Network address
    pub fn network_address(&self) -> IpAddr {
        self.net.network()
    }

    /// True when the prefix covers the full address width (a host address)
    pub fn is_host(&self) -> bool {
        self.net.prefix_len() == self.net.max_prefix_len()
    }

    /// True when `other`'s range is a (non-strict) subset of this block's.
    /// Always false across families.
    pub fn contains(&self, other: &Cidr) -> bool {
        self.net.contains(&other.net)
    }

    /// Network address as a fixed-width unsigned integer
    fn bits(&self) -> u128 {
        match self.net.network() {
            IpAddr::V4(a) => u128::from(u32::from(a)),
            IpAddr::V6(a) => u128::from(a),
        }
    }

    /// Last address of the block as a fixed-width unsigned integer
    fn last_bits(&self) -> u128 {
        match self.net.broadcast() {
            IpAddr::V4(a) => u128::from(u32::from(a)),
            IpAddr::V6(a) => u128::from(a),
        }
    }

    /// Ordering key for this block
    pub fn key(&self) -> CidrKey {
        CidrKey {
            version: self.version(),
            addr: self.bits(),
            prefix_len: self.prefix_len(),
        }
    }

    /// Key of the enclosing block at a shorter prefix length.
    ///
    /// Masks the network address down to `prefix_len` bits. Used for
    /// longest-prefix ancestor lookups: a stored network contains this one
    /// iff its key equals `ancestor_key` at its own prefix length.
    pub fn ancestor_key(&self, prefix_len: u8) -> CidrKey {
        debug_assert!(prefix_len < self.prefix_len());
        let width = self.version().bit_width();
        let addr = if prefix_len == 0 {
            0
        } else {
            self.bits() & !((1u128 << (width - prefix_len)) - 1)
        };
        CidrKey {
            version: self.version(),
            addr,
            prefix_len,
        }
    }

    /// Key interval covering exactly the strict descendants of this block.
    ///
    /// Prefix alignment guarantees every key in the interval belongs to a
    /// contained network: a stored block whose network address falls inside
    /// this range with a longer prefix cannot extend past the range end.
    pub fn descendant_range(&self) -> (Bound<CidrKey>, Bound<CidrKey>) {
        let end = CidrKey {
            version: self.version(),
            addr: self.last_bits(),
            prefix_len: u8::MAX,
        };
        (Bound::Excluded(self.key()), Bound::Included(end))
    }
}

impl FromStr for Cidr {
    type Err = Error;

    /// Parse CIDR text. Bare addresses become full-width hosts; any other
    /// prefix must have its host bits zero.
    fn from_str(s: &str) -> Result<Self> {
        let net = if s.contains('/') {
            IpNet::from_str(s).map_err(|e| Error::InvalidAddress(s.to_string(), e.to_string()))?
        } else {
            let addr = IpAddr::from_str(s)
                .map_err(|e| Error::InvalidAddress(s.to_string(), e.to_string()))?;
            let width = match addr {
                IpAddr::V4(_) => 32,
                IpAddr::V6(_) => 128,
            };
            IpNet::new(addr, width).map_err(|e| Error::InvalidAddress(s.to_string(), e.to_string()))?
        };

        if net.addr() != net.network() {
            return Err(Error::HostBitsSet(s.to_string()));
        }

        Ok(Self { net })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.net)
    }
}

impl Serialize for Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
