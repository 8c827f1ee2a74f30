//! Data models for the IPAM core

mod attribute;
mod change;
mod network;
mod permission;
mod site;

pub use attribute::{AttributeValue, NetworkAttribute};
pub use change::{Change, ChangeEvent, ResourceType};
pub use network::Network;
pub use permission::{Capability, Permission, User};
pub use site::Site;
