//! # Object Kind Mappings
//!
//! The reconciliation core is generic over two shapes of object kind:
//!
//! - [`Resource`]: an object the remote API addresses natively (a security
//!   group, a route table). Written with a direct create-or-update.
//! - [`CollectionEntry`]: a named entry inside a list field of a parent
//!   [`Resource`] (a security rule inside a security group). The remote API
//!   cannot address it on its own, so it gets a synthetic identity and is
//!   written by replacing the parent's whole list.
//!
//! Implementors supply typed Desired/Remote/State structs and pure mapping
//! functions; there is no I/O in these traits. The
//! [`reconciler`](crate::reconciler) module drives them.

use crate::collection::NamedEntry;
use crate::error::ReconcileResult;
use crate::identity::{IdentityCodec, ResourceId};

pub trait Resource: Send + Sync + 'static {
    /// Operator-supplied configuration for one instance.
    type Desired: Send + Sync;
    /// The object as exchanged with the Remote API Client.
    type Remote: Clone + Send + Sync + 'static;
    /// Normalized state returned to the caller.
    type State: Send;

    /// Short kind name used in logs and lock keys.
    const KIND: &'static str;

    /// Derives the native identity the desired object will live at.
    fn identity(codec: &IdentityCodec, desired: &Self::Desired) -> ReconcileResult<ResourceId>;

    /// Extra named locks held for the whole of Create and Update,
    /// e.g. [`lock_key`](crate::locks::lock_key)s of objects this one attaches to.
    fn lock_keys(_desired: &Self::Desired) -> Vec<String> {
        Vec::new()
    }

    /// Builds the object to write.
    ///
    /// `existing` is the freshly read remote object on Update and `None` on
    /// Create. Fields the declaration does not own must be carried over
    /// from `existing`.
    fn expand(desired: &Self::Desired, existing: Option<Self::Remote>) -> Self::Remote;

    fn flatten(id: &ResourceId, remote: &Self::Remote) -> Self::State;
}

pub trait CollectionEntry: Send + Sync + 'static {
    type Desired: Send + Sync;
    /// The remote object holding the collection.
    type Parent: Clone + Send + Sync + 'static;
    type Entry: NamedEntry + Clone + Send + Sync + 'static;
    type State: Send;

    const KIND: &'static str;
    /// Synthetic segment kind appended to the parent identity, e.g. `securityRules`.
    const MARKER: &'static str;

    fn parent_identity(codec: &IdentityCodec, desired: &Self::Desired) -> ReconcileResult<ResourceId>;

    /// Builds the entry. Its [`NamedEntry::name`] becomes the discriminator.
    fn expand(desired: &Self::Desired) -> Self::Entry;

    fn entries(parent: &Self::Parent) -> Vec<Self::Entry>;

    fn set_entries(parent: &mut Self::Parent, entries: Vec<Self::Entry>);

    fn flatten(id: &ResourceId, parent: &Self::Parent, entry: &Self::Entry) -> Self::State;
}
