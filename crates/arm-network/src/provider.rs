//! # Network Provider
//!
//! Wires every object kind of this crate onto **one** [`ReconcileContext`].
//! Sharing the context matters: a group update and a rule insert on the same
//! group contend for the same named lock only if they share the registry.
//!
//! ```rust,ignore
//! let provider = NetworkProvider::new(client, ReconcileConfig::default());
//!
//! let group = provider.security_groups().create(&group_config).await?;
//! let rule = provider
//!     .security_rules()
//!     .create(&SecurityRuleConfig::new(&group.id, "allow-https", 100))
//!     .await?;
//!
//! provider.shutdown(); // cancels anything still polling
//! ```
//!
//! ## Configuration
//!
//! [`load_config`] reads a [`ReconcileConfig`] from a JSON file; [`config_from_env`]
//! does so for the path in `ARM_RECONCILE_CONFIG` and falls back to defaults
//! when the variable is unset.

use crate::model::NetworkSecurityGroup;
use crate::resources::{codec, SecurityGroups, SecurityRules};
use arm_reconcile::{EntryReconciler, ReconcileConfig, ReconcileContext, RemoteClient, ResourceReconciler};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable naming a JSON configuration file.
pub const CONFIG_ENV: &str = "ARM_RECONCILE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub fn load_config(path: &Path) -> Result<ReconcileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), ?config, "Loaded configuration");
    Ok(config)
}

pub fn config_from_env() -> Result<ReconcileConfig, ConfigError> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => load_config(Path::new(&path)),
        None => Ok(ReconcileConfig::default()),
    }
}

pub struct NetworkProvider<C> {
    context: Arc<ReconcileContext<C>>,
    security_groups: ResourceReconciler<SecurityGroups, C>,
    security_rules: EntryReconciler<SecurityRules, C>,
}

impl<C> NetworkProvider<C>
where
    C: RemoteClient<NetworkSecurityGroup> + 'static,
{
    pub fn new(client: C, config: ReconcileConfig) -> Self {
        Self::from_context(ReconcileContext::new(client, codec()).with_config(config))
    }

    /// Uses a caller-built context, e.g. one with its own cancellation token
    /// or deadline. Its codec must know the kinds in [`codec`].
    pub fn from_context(context: ReconcileContext<C>) -> Self {
        let context = Arc::new(context);
        info!(
            poll_interval_secs = context.config().poll_interval.as_secs(),
            "Network provider ready"
        );
        Self {
            security_groups: ResourceReconciler::new(context.clone()),
            security_rules: EntryReconciler::new(context.clone()),
            context,
        }
    }

    pub fn security_groups(&self) -> &ResourceReconciler<SecurityGroups, C> {
        &self.security_groups
    }

    pub fn security_rules(&self) -> &EntryReconciler<SecurityRules, C> {
        &self.security_rules
    }

    pub fn context(&self) -> &ReconcileContext<C> {
        &self.context
    }

    /// Cancels every in-flight reconciliation. No rollback is attempted.
    pub fn shutdown(&self) {
        info!("Cancelling in-flight reconciliations");
        self.context.cancellation().cancel();
    }
}
