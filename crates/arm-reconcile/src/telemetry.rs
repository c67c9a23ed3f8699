//! # Tracing Setup
//!
//! Every reconciliation emits structured events through the `tracing` crate.
//! Verbs open a span carrying the object kind and identity, so a single
//! `RUST_LOG` filter narrows output to one object or one component:
//!
//! ```text
//! RUST_LOG=info                          # verb outcomes and drift warnings
//! RUST_LOG=arm_reconcile::poller=debug   # every LRO poll
//! RUST_LOG=arm_reconcile::locks=trace    # lock acquisition
//! ```
//!
//! Drift ("removing from state") and remote failures are logged at `warn`.

use tracing_subscriber::EnvFilter;

/// Initializes the global subscriber with `RUST_LOG` filtering and the
/// compact format.
///
/// Panics if a global subscriber is already set; use [`try_setup_tracing`]
/// from tests.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}

/// Like [`setup_tracing`], but returns `false` instead of panicking when a
/// subscriber is already installed.
pub fn try_setup_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_test_writer()
        .try_init()
        .is_ok()
}
