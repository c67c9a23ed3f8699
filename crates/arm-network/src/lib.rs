//! # ARM Network
//!
//! Network Security Groups and their Security Rules, reconciled through
//! [`arm_reconcile`].
//!
//! - **[model]**: wire shapes exchanged with the remote API.
//! - **[resources]**: [`Resource`](arm_reconcile::Resource) and
//!   [`CollectionEntry`](arm_reconcile::CollectionEntry) mappings.
//! - **[provider]**: the [`NetworkProvider`](provider::NetworkProvider) wiring
//!   both kinds onto one context, plus configuration loading.

pub mod model;
pub mod provider;
pub mod resources;
