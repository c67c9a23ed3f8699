use super::SecurityRule;
use arm_reconcile::ProvisioningState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A Network Security Group as exchanged with the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSecurityGroup {
    pub location: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Shared between the group's own declaration and any separately
    /// declared rules.
    #[serde(default)]
    pub security_rules: Vec<SecurityRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<ProvisioningState>,
}

impl NetworkSecurityGroup {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            tags: BTreeMap::new(),
            security_rules: Vec::new(),
            provisioning_state: None,
        }
    }
}
