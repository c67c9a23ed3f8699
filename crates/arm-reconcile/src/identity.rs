//! # Identity Codec
//!
//! Parses and synthesizes the slash-delimited identities used to address
//! remote objects:
//!
//! ```text
//! /subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}[/{childType}/{childName}]...
//! ```
//!
//! Objects the remote API does not address on their own (a named entry inside
//! a parent's list field) get a *synthetic* identity: the parent's native path
//! followed by one or more `{marker}/{discriminator}` pairs. The suffix is a
//! purely local convention and is never sent to the remote API; use
//! [`ResourceId::native`] to strip it.
//!
//! `/` is the reserved separator. No component of an identity may contain it,
//! which keeps [`IdentityCodec::parse`] of a synthesized identity unambiguous.
//!
//! ```rust
//! use arm_reconcile::identity::{IdentityCodec, ResourceKind};
//!
//! let codec = IdentityCodec::new().register(
//!     ResourceKind::new("Microsoft.Network", "networkSecurityGroups").with_synthetic("securityRules"),
//! );
//! let nsg = codec
//!     .parse("/subscriptions/00000000/resourceGroups/rg1/providers/Microsoft.Network/networkSecurityGroups/nsg1")
//!     .unwrap();
//! let rule = codec.synthesize(&nsg, "securityRules", "allow-ssh").unwrap();
//!
//! let parsed = codec.parse(&rule.to_string()).unwrap();
//! let (parent, discriminator) = parsed.split_synthetic().unwrap();
//! assert_eq!(parent, nsg);
//! assert_eq!(discriminator, "allow-ssh");
//! ```

use crate::error::{ReconcileError, ReconcileResult};
use std::fmt;
use std::hash::{Hash, Hasher};

/// The reserved separator between identity segments.
pub const SEPARATOR: char = '/';

const SUBSCRIPTIONS: &str = "subscriptions";
const RESOURCE_GROUPS: &str = "resourceGroups";
const PROVIDERS: &str = "providers";

/// One `{kind}/{name}` pair of an identity path.
///
/// Kinds compare case-insensitively; names compare exactly.
#[derive(Debug, Clone)]
pub struct Segment {
    pub kind: String,
    pub name: String,
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.kind.eq_ignore_ascii_case(&other.kind) && self.name == other.name
    }
}

impl Eq for Segment {}

impl Hash for Segment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_ignoring_case(&self.kind, state);
        self.name.hash(state);
    }
}

fn hash_ignoring_case<H: Hasher>(value: &str, state: &mut H) {
    for byte in value.bytes() {
        state.write_u8(byte.to_ascii_lowercase());
    }
    state.write_u8(0xff);
}

/// A structured identity addressing one remote object.
///
/// Equality is structural. The provider namespace and kind names compare
/// case-insensitively, as the remote API treats them; subscription, resource
/// group and object names compare exactly. Identities produced by
/// [`IdentityCodec`] always carry the registered casing, so equal identities
/// from the codec format to the same string.
#[derive(Debug, Clone)]
pub struct ResourceId {
    subscription_id: String,
    resource_group: String,
    provider: String,
    native: Vec<Segment>,
    synthetic: Vec<Segment>,
}

impl PartialEq for ResourceId {
    fn eq(&self, other: &Self) -> bool {
        self.subscription_id == other.subscription_id
            && self.resource_group == other.resource_group
            && self.provider.eq_ignore_ascii_case(&other.provider)
            && self.native == other.native
            && self.synthetic == other.synthetic
    }
}

impl Eq for ResourceId {}

impl Hash for ResourceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.subscription_id.hash(state);
        self.resource_group.hash(state);
        hash_ignoring_case(&self.provider, state);
        self.native.hash(state);
        self.synthetic.hash(state);
    }
}

impl ResourceId {
    /// Builds the native identity of a top-level object.
    ///
    /// The provider and kind are kept as given; [`IdentityCodec::synthesize`]
    /// and [`IdentityCodec::parse`] re-emit them in the registered casing.
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        provider: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> ReconcileResult<Self> {
        let id = Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            provider: provider.into(),
            native: vec![Segment {
                kind: kind.into(),
                name: name.into(),
            }],
            synthetic: Vec::new(),
        };
        for component in id.components() {
            check_component(component).map_err(|reason| ReconcileError::MalformedIdentity {
                input: component.to_string(),
                reason: reason.to_string(),
            })?;
        }
        Ok(id)
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Name of the deepest native object (the object the remote API addresses).
    pub fn name(&self) -> &str {
        self.native.last().map(|s| s.name.as_str()).unwrap_or_default()
    }

    /// Native type path, e.g. `["virtualNetworks", "subnets"]`.
    pub fn kind_path(&self) -> Vec<&str> {
        self.native.iter().map(|s| s.kind.as_str()).collect()
    }

    pub fn native_segments(&self) -> &[Segment] {
        &self.native
    }

    pub fn synthetic_segments(&self) -> &[Segment] {
        &self.synthetic
    }

    pub fn is_synthetic(&self) -> bool {
        !self.synthetic.is_empty()
    }

    /// The identity with any synthetic suffix removed.
    pub fn native(&self) -> ResourceId {
        Self {
            synthetic: Vec::new(),
            ..self.clone()
        }
    }

    /// The last synthetic discriminator, if any.
    pub fn discriminator(&self) -> Option<&str> {
        self.synthetic.last().map(|s| s.name.as_str())
    }

    /// Splits a synthetic identity into its parent and last discriminator.
    pub fn split_synthetic(&self) -> Option<(ResourceId, &str)> {
        let (last, rest) = self.synthetic.split_last()?;
        let parent = Self {
            synthetic: rest.to_vec(),
            ..self.clone()
        };
        Some((parent, last.name.as_str()))
    }

    /// Key for the [`NamedLockRegistry`](crate::locks::NamedLockRegistry).
    ///
    /// Lower-cased native form: the remote API treats names case-insensitively,
    /// so case variants of one parent must contend for one lock.
    pub fn lock_key(&self) -> String {
        self.native().to_string().to_lowercase()
    }

    fn components(&self) -> impl Iterator<Item = &str> {
        [
            self.subscription_id.as_str(),
            self.resource_group.as_str(),
            self.provider.as_str(),
        ]
        .into_iter()
        .chain(
            self.native
                .iter()
                .chain(self.synthetic.iter())
                .flat_map(|s| [s.kind.as_str(), s.name.as_str()]),
        )
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{SUBSCRIPTIONS}/{}/{RESOURCE_GROUPS}/{}/{PROVIDERS}/{}",
            self.subscription_id, self.resource_group, self.provider
        )?;
        for segment in self.native.iter().chain(self.synthetic.iter()) {
            write!(f, "/{}/{}", segment.kind, segment.name)?;
        }
        Ok(())
    }
}

fn check_component(component: &str) -> Result<(), &'static str> {
    if component.is_empty() {
        Err("empty segment")
    } else if component.contains(SEPARATOR) {
        Err("segment contains the reserved separator")
    } else {
        Ok(())
    }
}

/// A native object kind the codec recognises, plus the synthetic markers that
/// may follow it.
#[derive(Debug, Clone)]
pub struct ResourceKind {
    provider: String,
    types: Vec<String>,
    markers: Vec<String>,
}

impl ResourceKind {
    /// A top-level kind such as `Microsoft.Network/networkSecurityGroups`.
    pub fn new(provider: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            types: vec![kind.into()],
            markers: Vec::new(),
        }
    }

    /// A natively addressed child kind, e.g. `virtualNetworks/subnets`.
    pub fn child(mut self, kind: impl Into<String>) -> Self {
        self.types.push(kind.into());
        self
    }

    /// Registers a synthetic marker allowed after this kind's native path.
    pub fn with_synthetic(mut self, marker: impl Into<String>) -> Self {
        self.markers.push(marker.into());
        self
    }

    fn matches_prefix(&self, provider: &str, types: &[&str]) -> bool {
        self.provider.eq_ignore_ascii_case(provider)
            && types.len() <= self.types.len()
            && self
                .types
                .iter()
                .zip(types)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    fn matches(&self, provider: &str, types: &[&str]) -> bool {
        types.len() == self.types.len() && self.matches_prefix(provider, types)
    }

    /// `id` with its provider, native kinds and markers in registered casing.
    fn canonicalise(&self, id: &ResourceId) -> ResourceId {
        let mut id = id.clone();
        id.provider.clone_from(&self.provider);
        for (segment, kind) in id.native.iter_mut().zip(&self.types) {
            segment.kind.clone_from(kind);
        }
        for segment in &mut id.synthetic {
            if let Some(marker) = self.marker(&segment.kind) {
                segment.kind = marker.to_string();
            }
        }
        id
    }

    fn marker(&self, candidate: &str) -> Option<&str> {
        self.markers
            .iter()
            .find(|m| m.eq_ignore_ascii_case(candidate))
            .map(String::as_str)
    }
}

/// Parses and synthesizes [`ResourceId`]s for a set of registered kinds.
#[derive(Debug, Clone, Default)]
pub struct IdentityCodec {
    kinds: Vec<ResourceKind>,
}

impl IdentityCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: ResourceKind) -> Self {
        self.kinds.push(kind);
        self
    }

    /// Parses a serialized identity.
    ///
    /// Fixed segments and kind names are matched case-insensitively and
    /// re-emitted in their registered casing; names are kept verbatim.
    pub fn parse(&self, input: &str) -> ReconcileResult<ResourceId> {
        let rest = input
            .strip_prefix(SEPARATOR)
            .ok_or_else(|| ReconcileError::malformed(input, "identity must start with '/'"))?;
        let parts: Vec<&str> = rest.split(SEPARATOR).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(ReconcileError::malformed(input, "empty segment"));
        }

        let mut parts = parts.into_iter();
        let subscription_id = expect_scope(input, &mut parts, SUBSCRIPTIONS)?;
        let resource_group = expect_scope(input, &mut parts, RESOURCE_GROUPS)?;
        let provider = expect_scope(input, &mut parts, PROVIDERS)?;

        let pairs: Vec<&str> = parts.collect();
        if pairs.is_empty() {
            return Err(ReconcileError::malformed(input, "missing object kind and name"));
        }
        if pairs.len() % 2 != 0 {
            return Err(ReconcileError::malformed(
                input,
                format!("segment {:?} has no name", pairs[pairs.len() - 1]),
            ));
        }

        let mut types: Vec<&str> = Vec::new();
        let mut native_names: Vec<&str> = Vec::new();
        let mut resolved: Option<&ResourceKind> = None;
        let mut synthetic = Vec::new();

        for pair in pairs.chunks(2) {
            let (kind, name) = (pair[0], pair[1]);

            if synthetic.is_empty() {
                types.push(kind);
                if self.kinds.iter().any(|k| k.matches_prefix(provider, &types)) {
                    native_names.push(name);
                    continue;
                }
                types.pop();
                resolved = self.kinds.iter().find(|k| k.matches(provider, &types));
            }

            match resolved.and_then(|k| k.marker(kind)) {
                Some(marker) => synthetic.push(Segment {
                    kind: marker.to_string(),
                    name: name.to_string(),
                }),
                None => {
                    return Err(ReconcileError::UnknownKind {
                        input: input.to_string(),
                        kind: kind.to_string(),
                    })
                }
            }
        }

        let kind = self
            .kinds
            .iter()
            .find(|k| k.matches(provider, &types))
            .ok_or_else(|| ReconcileError::UnknownKind {
                input: input.to_string(),
                kind: format!("{provider}/{}", types.join("/")),
            })?;

        Ok(ResourceId {
            subscription_id: subscription_id.to_string(),
            resource_group: resource_group.to_string(),
            provider: kind.provider.clone(),
            native: kind
                .types
                .iter()
                .zip(native_names)
                .map(|(kind, name)| Segment {
                    kind: kind.clone(),
                    name: name.to_string(),
                })
                .collect(),
            synthetic,
        })
    }

    /// Appends a `{marker}/{discriminator}` pair to `parent`.
    ///
    /// The output is a pure function of its inputs, so synthesized identities
    /// can be compared by their string form without re-parsing.
    pub fn synthesize(
        &self,
        parent: &ResourceId,
        marker: &str,
        discriminator: &str,
    ) -> ReconcileResult<ResourceId> {
        if discriminator.is_empty() {
            return Err(ReconcileError::InvalidDiscriminator {
                discriminator: discriminator.to_string(),
                reason: "discriminator must not be empty",
            });
        }
        if discriminator.contains(SEPARATOR) {
            return Err(ReconcileError::InvalidDiscriminator {
                discriminator: discriminator.to_string(),
                reason: "discriminator must not contain '/'",
            });
        }

        let kind_path = parent.kind_path();
        let unknown = || ReconcileError::UnknownKind {
            input: parent.to_string(),
            kind: marker.to_string(),
        };
        let kind = self
            .kinds
            .iter()
            .find(|k| k.matches(&parent.provider, &kind_path))
            .ok_or_else(unknown)?;
        let canonical_marker = kind.marker(marker).ok_or_else(unknown)?;

        let mut id = kind.canonicalise(parent);
        id.synthetic.push(Segment {
            kind: canonical_marker.to_string(),
            name: discriminator.to_string(),
        });
        Ok(id)
    }
}

fn expect_scope<'a>(
    input: &str,
    parts: &mut impl Iterator<Item = &'a str>,
    key: &str,
) -> ReconcileResult<&'a str> {
    match (parts.next(), parts.next()) {
        (Some(found), Some(value)) if found.eq_ignore_ascii_case(key) => Ok(value),
        (Some(found), _) if !found.eq_ignore_ascii_case(key) => Err(ReconcileError::malformed(
            input,
            format!("expected segment {key:?} but found {found:?}"),
        )),
        _ => Err(ReconcileError::malformed(
            input,
            format!("missing {key:?} segment"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NSG: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg1/providers/Microsoft.Network/networkSecurityGroups/nsg1";
    const SUBNET: &str = "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/internal";

    fn codec() -> IdentityCodec {
        IdentityCodec::new()
            .register(
                ResourceKind::new("Microsoft.Network", "networkSecurityGroups")
                    .with_synthetic("securityRules"),
            )
            .register(ResourceKind::new("Microsoft.Network", "virtualNetworks"))
            .register(
                ResourceKind::new("Microsoft.Network", "virtualNetworks")
                    .child("subnets")
                    .with_synthetic("delegations"),
            )
    }

    #[test]
    fn test_parse_native_identity() {
        let id = codec().parse(NSG).unwrap();
        assert_eq!(id.subscription_id(), "00000000-0000-0000-0000-000000000000");
        assert_eq!(id.resource_group(), "rg1");
        assert_eq!(id.provider(), "Microsoft.Network");
        assert_eq!(id.kind_path(), vec!["networkSecurityGroups"]);
        assert_eq!(id.name(), "nsg1");
        assert!(!id.is_synthetic());
        assert_eq!(id.to_string(), NSG);
    }

    #[test]
    fn test_parse_native_child_identity() {
        let id = codec().parse(SUBNET).unwrap();
        assert_eq!(id.kind_path(), vec!["virtualNetworks", "subnets"]);
        assert_eq!(id.name(), "internal");
        assert_eq!(id.to_string(), SUBNET);
    }

    #[test]
    fn test_parse_canonicalises_fixed_segments_and_kinds() {
        let raw = "/Subscriptions/sub/resourcegroups/rg1/Providers/microsoft.network/NetworkSecurityGroups/Nsg1";
        let id = codec().parse(raw).unwrap();
        assert_eq!(
            id.to_string(),
            "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/networkSecurityGroups/Nsg1"
        );
    }

    #[test]
    fn test_synthesize_round_trips() {
        let codec = codec();
        let parent = codec.parse(NSG).unwrap();
        for discriminator in ["allow-ssh", "Deny_All", "rule.with.dots", "x"] {
            let rule = codec.synthesize(&parent, "securityRules", discriminator).unwrap();
            let parsed = codec.parse(&rule.to_string()).unwrap();
            assert_eq!(parsed, rule);
            let (p, d) = parsed.split_synthetic().unwrap();
            assert_eq!(p, parent);
            assert_eq!(d, discriminator);
            assert_eq!(parsed.native(), parent);
        }
    }

    #[test]
    fn test_synthesize_canonicalises_parent_casing() {
        let codec = codec();
        let parent = ResourceId::new("sub", "rg", "microsoft.network", "NetworkSecurityGroups", "nsg1").unwrap();
        let rule = codec.synthesize(&parent, "SECURITYRULES", "r1").unwrap();
        assert_eq!(
            rule.to_string(),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/networkSecurityGroups/nsg1/securityRules/r1"
        );

        let parsed = codec.parse(&rule.to_string()).unwrap();
        let (p, d) = parsed.split_synthetic().unwrap();
        assert_eq!(p, parent);
        assert_eq!(d, "r1");
        assert_eq!(parsed, rule);
    }

    #[test]
    fn test_equality_ignores_kind_casing_only() {
        use std::collections::HashSet;

        let canonical = ResourceId::new("sub", "rg", "Microsoft.Network", "networkSecurityGroups", "nsg1").unwrap();
        let lower = ResourceId::new("sub", "rg", "microsoft.network", "networksecuritygroups", "nsg1").unwrap();
        let renamed = ResourceId::new("sub", "rg", "Microsoft.Network", "networkSecurityGroups", "NSG1").unwrap();
        assert_eq!(canonical, lower);
        assert_ne!(canonical, renamed);

        let set: HashSet<_> = [canonical, lower, renamed].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_synthesize_on_native_child() {
        let codec = codec();
        let subnet = codec.parse(SUBNET).unwrap();
        let delegation = codec.synthesize(&subnet, "delegations", "aci").unwrap();
        assert_eq!(delegation.to_string(), format!("{SUBNET}/delegations/aci"));
        assert_eq!(codec.parse(&delegation.to_string()).unwrap(), delegation);
    }

    #[test]
    fn test_synthesize_is_stable() {
        let codec = codec();
        let parent = codec.parse(NSG).unwrap();
        let a = codec.synthesize(&parent, "securityRules", "r1").unwrap();
        let b = codec.synthesize(&parent, "securityRules", "r1").unwrap();
        assert_eq!(a.to_string().as_bytes(), b.to_string().as_bytes());
    }

    #[test]
    fn test_synthesize_rejects_bad_discriminators() {
        let codec = codec();
        let parent = codec.parse(NSG).unwrap();
        assert!(matches!(
            codec.synthesize(&parent, "securityRules", ""),
            Err(ReconcileError::InvalidDiscriminator { .. })
        ));
        assert!(matches!(
            codec.synthesize(&parent, "securityRules", "a/b"),
            Err(ReconcileError::InvalidDiscriminator { .. })
        ));
        assert!(matches!(
            codec.synthesize(&parent, "routes", "r1"),
            Err(ReconcileError::UnknownKind { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_missing_segments() {
        let codec = codec();
        for raw in [
            "",
            "subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/networkSecurityGroups/nsg1",
            "/subscriptions/sub",
            "/subscriptions/sub/providers/Microsoft.Network/networkSecurityGroups/nsg1",
            "/subscriptions/sub/resourceGroups/rg1",
            "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network",
            "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/networkSecurityGroups",
            "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/networkSecurityGroups/nsg1/",
            "/subscriptions//resourceGroups/rg1/providers/Microsoft.Network/networkSecurityGroups/nsg1",
        ] {
            assert!(
                matches!(codec.parse(raw), Err(ReconcileError::MalformedIdentity { .. })),
                "expected malformed: {raw:?}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_unknown_kinds() {
        let codec = codec();
        let vm = "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Compute/virtualMachines/vm1".to_string();
        let unknown_marker = format!("{NSG}/routes/r1");
        let nested = format!("{NSG}/securityRules/r1/ports/p1");
        for raw in [&vm, &unknown_marker, &nested] {
            assert!(
                matches!(codec.parse(raw), Err(ReconcileError::UnknownKind { .. })),
                "expected unknown kind: {raw:?}"
            );
        }
    }

    #[test]
    fn test_new_validates_components() {
        assert!(ResourceId::new("sub", "rg", "Microsoft.Network", "networkSecurityGroups", "a/b").is_err());
        assert!(ResourceId::new("sub", "", "Microsoft.Network", "networkSecurityGroups", "a").is_err());
        let id = ResourceId::new("sub", "rg", "Microsoft.Network", "networkSecurityGroups", "a").unwrap();
        assert_eq!(codec().parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_lock_key_ignores_case_and_synthetic_suffix() {
        let codec = codec();
        let parent = codec.parse(NSG).unwrap();
        let upper = codec.parse(&NSG.replace("nsg1", "NSG1")).unwrap();
        let rule = codec.synthesize(&parent, "securityRules", "r1").unwrap();
        assert_eq!(parent.lock_key(), upper.lock_key());
        assert_eq!(parent.lock_key(), rule.lock_key());
    }
}
