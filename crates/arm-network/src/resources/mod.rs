//! Object kind mappings for the Network resource provider.

mod security_group;
mod security_rule;

pub use security_group::{codec, SecurityGroupConfig, SecurityGroupState, SecurityGroups, KIND, PROVIDER, RULES_MARKER};
pub use security_rule::{SecurityRuleConfig, SecurityRuleState, SecurityRules};
