//! # ARM Reconciliation Core
//!
//! This crate converges remote cloud objects towards an operator's desired
//! configuration. Per-kind field mapping is mechanical; the hard part is the
//! pattern every kind repeats, and that pattern lives here once:
//!
//! 1. **Identity** ([`identity`]) - parse native identities and synthesize
//!    identities for objects the remote API cannot address on its own.
//! 2. **Long-running operations** ([`poller`]) - drive an accepted write to
//!    a terminal state under a deadline, with distinct outcomes for success,
//!    remote failure, timeout and cancellation.
//! 3. **Shared collections** ([`collection`], [`locks`]) - name-keyed,
//!    case-insensitive merges into a parent's list field, serialized per
//!    parent so concurrent writers cannot lose each other's updates.
//!
//! [`reconciler`] composes these into four idempotent verbs (Create, Read,
//! Update, Delete).
//!
//! ## Architecture Overview
//!
//! The crate separates concerns into three layers:
//!
//! 1. **Kind Layer** ([`Resource`], [`CollectionEntry`]) - typed desired and
//!    remote structs plus pure mapping functions, one impl per object kind
//! 2. **Reconciliation Layer** ([`ResourceReconciler`], [`EntryReconciler`]) -
//!    existence checks, locking, merging, polling, drift handling
//! 3. **Transport Layer** ([`RemoteClient`]) - the Remote API Client, a
//!    black box behind a narrow trait
//!
//! You write the mapping **once** per kind; every verb's control flow is shared.
//!
//! ## Example
//!
//! ```rust
//! use arm_reconcile::{
//!     IdentityCodec, Observed, Reconcile, ReconcileContext, ReconcileResult, Resource,
//!     ResourceId, ResourceKind, ResourceReconciler,
//! };
//! use arm_reconcile::mock::MockRemote;
//! use std::sync::Arc;
//!
//! #[derive(Clone, Debug)]
//! struct Zone { records: u32 }
//!
//! struct DnsZone;
//!
//! struct ZoneConfig { name: String, records: u32 }
//!
//! impl Resource for DnsZone {
//!     type Desired = ZoneConfig;
//!     type Remote = Zone;
//!     type State = (String, u32);
//!     const KIND: &'static str = "dnsZones";
//!
//!     fn identity(_: &IdentityCodec, desired: &ZoneConfig) -> ReconcileResult<ResourceId> {
//!         ResourceId::new("sub", "rg", "Microsoft.Network", "dnsZones", desired.name.as_str())
//!     }
//!
//!     fn expand(desired: &ZoneConfig, _existing: Option<Zone>) -> Zone {
//!         Zone { records: desired.records }
//!     }
//!
//!     fn flatten(id: &ResourceId, remote: &Zone) -> (String, u32) {
//!         (id.to_string(), remote.records)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let codec = IdentityCodec::new().register(ResourceKind::new("Microsoft.Network", "dnsZones"));
//!     let ctx = Arc::new(ReconcileContext::new(MockRemote::<Zone>::new(), codec));
//!     let zones = ResourceReconciler::<DnsZone, _>::new(ctx);
//!
//!     let config = ZoneConfig { name: "example.com".into(), records: 2 };
//!     let (id, records) = zones.create(&config).await.unwrap();
//!     assert_eq!(records, 2);
//!
//!     // A second create never adopts the existing zone.
//!     assert!(zones.create(&config).await.is_err());
//!
//!     zones.delete(&id).await.unwrap();
//!     zones.delete(&id).await.unwrap();
//!     assert_eq!(zones.read(&id).await.unwrap(), Observed::Gone);
//! }
//! ```
//!
//! ## Explicit Context
//!
//! There are no process-wide singletons. A [`ReconcileContext`] carries the
//! client, codec, lock registry, cancellation token and deadline into every
//! call; reconcilers that must serialize against each other share one.
//!
//! ## Concurrency Model
//!
//! - Each reconciliation call is an independent task; calls interleave freely
//! - Suspension happens only in lock acquisition, remote calls and poll
//!   sleeps, all of which race the context's cancellation token and the
//!   verb's deadline
//! - The only shared mutable thing is a remote parent's list field, guarded
//!   by the [`NamedLockRegistry`] keyed on the parent's identity
//! - Locks are process-local; there is no cross-process coordination
//!
//! ## Testing
//!
//! [`mock::MockRemote`] implements [`RemoteClient`] in memory, with scripted
//! LRO state sequences, injected failures and artificial latency. Combined
//! with tokio's paused clock it runs hour-long poll loops in milliseconds.

pub mod client;
pub mod collection;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod locks;
pub mod mock;
pub mod poller;
pub mod reconciler;
pub mod resource;
pub mod telemetry;

// Re-export core types for convenience
pub use client::{LroHandle, OperationKind, PollStatus, ProvisioningState, RemoteClient, WriteResponse};
pub use collection::{Merge, NamedEntry};
pub use config::{ReconcileConfig, Timeouts, Verb};
pub use context::ReconcileContext;
pub use error::{ApiError, ReconcileError, ReconcileResult, RemoteErrorDetail};
pub use identity::{IdentityCodec, ResourceId, ResourceKind};
pub use locks::{lock_key, NamedLock, NamedLockRegistry};
pub use poller::{LroOutcome, LroPoller, NotFoundPolicy, StateWait};
pub use reconciler::{EntryReconciler, Observed, Reconcile, ResourceReconciler};
pub use resource::{CollectionEntry, Resource};
