//! # Network Security Groups
//!
//! A natively addressed object kind. Its `securityRules` list may be owned by
//! the group's own declaration (inline rules) or by separately declared
//! [`SecurityRules`](super::SecurityRules); a declaration without inline
//! rules leaves the remote list untouched.

use crate::model::{NetworkSecurityGroup, SecurityRule};
use arm_reconcile::{IdentityCodec, ProvisioningState, ReconcileResult, Resource, ResourceId, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PROVIDER: &str = "Microsoft.Network";
pub const KIND: &str = "networkSecurityGroups";
/// Synthetic marker for rules inside a group.
pub const RULES_MARKER: &str = "securityRules";

/// Codec for every identity this crate handles.
pub fn codec() -> IdentityCodec {
    IdentityCodec::new().register(ResourceKind::new(PROVIDER, KIND).with_synthetic(RULES_MARKER))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupConfig {
    pub subscription_id: String,
    pub resource_group: String,
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// `None` leaves the remote rule list as it is.
    #[serde(default)]
    pub security_rules: Option<Vec<SecurityRule>>,
}

impl SecurityGroupConfig {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            name: name.into(),
            location: location.into(),
            tags: BTreeMap::new(),
            security_rules: None,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Makes the declaration authoritative for the whole rule list.
    pub fn with_rules(mut self, rules: Vec<SecurityRule>) -> Self {
        self.security_rules = Some(rules);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupState {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub tags: BTreeMap<String, String>,
    pub security_rules: Vec<SecurityRule>,
    pub provisioning_state: Option<ProvisioningState>,
}

pub struct SecurityGroups;

impl Resource for SecurityGroups {
    type Desired = SecurityGroupConfig;
    type Remote = NetworkSecurityGroup;
    type State = SecurityGroupState;

    const KIND: &'static str = "Network Security Group";

    fn identity(_codec: &IdentityCodec, desired: &SecurityGroupConfig) -> ReconcileResult<ResourceId> {
        ResourceId::new(
            desired.subscription_id.as_str(),
            desired.resource_group.as_str(),
            PROVIDER,
            KIND,
            desired.name.as_str(),
        )
    }

    fn expand(desired: &SecurityGroupConfig, existing: Option<NetworkSecurityGroup>) -> NetworkSecurityGroup {
        let mut group = existing.unwrap_or_else(|| NetworkSecurityGroup::new(desired.location.as_str()));
        group.location = desired.location.clone();
        group.tags = desired.tags.clone();
        if let Some(rules) = &desired.security_rules {
            group.security_rules = rules.clone();
        }
        group.provisioning_state = None;
        group
    }

    fn flatten(id: &ResourceId, remote: &NetworkSecurityGroup) -> SecurityGroupState {
        SecurityGroupState {
            id: id.to_string(),
            name: id.name().to_string(),
            resource_group: id.resource_group().to_string(),
            location: remote.location.clone(),
            tags: remote.tags.clone(),
            security_rules: remote.security_rules.clone(),
            provisioning_state: remote.provisioning_state,
        }
    }
}
