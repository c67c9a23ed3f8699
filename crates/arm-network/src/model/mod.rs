//! Remote object shapes, serialized the way the Network resource provider
//! does (camelCase fields).

mod security_group;
mod security_rule;

pub use security_group::NetworkSecurityGroup;
pub use security_rule::{Access, Direction, Protocol, SecurityRule};
