//! # Security Rules
//!
//! A rule declared on its own, outside its group's declaration. Its identity
//! is synthetic:
//!
//! ```text
//! /subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Network/networkSecurityGroups/{nsg}/securityRules/{rule}
//! ```
//!
//! Every write replaces the group's whole rule list under the group's lock.

use super::security_group::RULES_MARKER;
use crate::model::{Access, Direction, NetworkSecurityGroup, Protocol, SecurityRule};
use arm_reconcile::{CollectionEntry, IdentityCodec, ReconcileResult, ResourceId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRuleConfig {
    /// Identity of the group the rule belongs to.
    pub network_security_group_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub priority: u32,
    pub direction: Direction,
    pub access: Access,
    pub protocol: Protocol,
    pub source_port_range: String,
    pub destination_port_range: String,
    pub source_address_prefix: String,
    pub destination_address_prefix: String,
}

impl SecurityRuleConfig {
    /// An inbound TCP allow rule matching everything; narrow it with the
    /// `with_*` methods.
    pub fn new(network_security_group_id: impl Into<String>, name: impl Into<String>, priority: u32) -> Self {
        Self {
            network_security_group_id: network_security_group_id.into(),
            name: name.into(),
            description: None,
            priority,
            direction: Direction::Inbound,
            access: Access::Allow,
            protocol: Protocol::Tcp,
            source_port_range: "*".to_string(),
            destination_port_range: "*".to_string(),
            source_address_prefix: "*".to_string(),
            destination_address_prefix: "*".to_string(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_destination_port_range(mut self, range: impl Into<String>) -> Self {
        self.destination_port_range = range.into();
        self
    }

    pub fn with_source_address_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.source_address_prefix = prefix.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityRuleState {
    pub id: String,
    pub network_security_group_name: String,
    pub resource_group: String,
    pub rule: SecurityRule,
}

pub struct SecurityRules;

impl CollectionEntry for SecurityRules {
    type Desired = SecurityRuleConfig;
    type Parent = NetworkSecurityGroup;
    type Entry = SecurityRule;
    type State = SecurityRuleState;

    const KIND: &'static str = "Security Rule";
    const MARKER: &'static str = RULES_MARKER;

    fn parent_identity(codec: &IdentityCodec, desired: &SecurityRuleConfig) -> ReconcileResult<ResourceId> {
        codec.parse(&desired.network_security_group_id)
    }

    fn expand(desired: &SecurityRuleConfig) -> SecurityRule {
        SecurityRule {
            name: desired.name.clone(),
            description: desired.description.clone(),
            priority: desired.priority,
            direction: desired.direction,
            access: desired.access,
            protocol: desired.protocol,
            source_port_range: desired.source_port_range.clone(),
            destination_port_range: desired.destination_port_range.clone(),
            source_address_prefix: desired.source_address_prefix.clone(),
            destination_address_prefix: desired.destination_address_prefix.clone(),
        }
    }

    fn entries(parent: &NetworkSecurityGroup) -> Vec<SecurityRule> {
        parent.security_rules.clone()
    }

    fn set_entries(parent: &mut NetworkSecurityGroup, entries: Vec<SecurityRule>) {
        parent.security_rules = entries;
    }

    fn flatten(id: &ResourceId, _parent: &NetworkSecurityGroup, entry: &SecurityRule) -> SecurityRuleState {
        SecurityRuleState {
            id: id.to_string(),
            network_security_group_name: id.name().to_string(),
            resource_group: id.resource_group().to_string(),
            rule: entry.clone(),
        }
    }
}
