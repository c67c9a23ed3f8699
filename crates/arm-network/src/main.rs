//! # ARM Network Demo
//!
//! Runs a group and two rules through their whole lifecycle against the
//! in-memory remote, showing:
//! 1.  A create that the remote side accepts as a long-running operation.
//! 2.  Two rules inserted into the same group concurrently.
//! 3.  A group update that leaves separately managed rules in place.
//! 4.  Idempotent deletes.
//!
//! Set `RUST_LOG=debug` to see every poll and collection write, and
//! `ARM_RECONCILE_CONFIG` to load poll/timeout settings from a JSON file.

use arm_network::model::{Access, NetworkSecurityGroup, Protocol};
use arm_network::provider::{config_from_env, NetworkProvider, CONFIG_ENV};
use arm_network::resources::{SecurityGroupConfig, SecurityRuleConfig};
use arm_reconcile::mock::{MockRemote, PollStep};
use arm_reconcile::telemetry::setup_tracing;
use arm_reconcile::{ProvisioningState, Reconcile};
use std::time::Duration;
use tracing::{info, warn, Instrument};

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let mut config = config_from_env().map_err(|e| e.to_string())?;
    if std::env::var_os(CONFIG_ENV).is_none() {
        config = config.with_poll_interval(Duration::from_millis(200));
    }

    let remote = MockRemote::<NetworkSecurityGroup>::new().with_latency(Duration::from_millis(10));
    let provider = NetworkProvider::new(remote.clone(), config);

    let shutdown = provider.context().cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted");
            shutdown.cancel();
        }
    });

    // The remote side accepts the group asynchronously
    remote.script_next_write(vec![
        PollStep::State(ProvisioningState::Accepted),
        PollStep::State(ProvisioningState::Creating),
        PollStep::State(ProvisioningState::Succeeded),
    ]);

    let group_config = SecurityGroupConfig::new("00000000-0000-0000-0000-000000000000", "network-rg", "web-nsg", "westeurope")
        .with_tag("env", "demo");

    let span = tracing::info_span!("security_group_creation");
    let group = async {
        info!("Creating security group");
        provider
            .security_groups()
            .create(&group_config)
            .await
            .map_err(|e| e.to_string())
    }
    .instrument(span)
    .await?;
    info!(id = %group.id, "Security group created");

    let https = SecurityRuleConfig::new(&group.id, "allow-https", 100)
        .with_destination_port_range("443")
        .with_description("public HTTPS");
    let ssh = SecurityRuleConfig::new(&group.id, "deny-ssh", 200)
        .with_access(Access::Deny)
        .with_protocol(Protocol::Tcp)
        .with_destination_port_range("22")
        .with_source_address_prefix("Internet");

    let (https, ssh) = tokio::join!(
        provider.security_rules().create(&https),
        provider.security_rules().create(&ssh),
    );
    let https = https.map_err(|e| e.to_string())?;
    let ssh = ssh.map_err(|e| e.to_string())?;
    info!(https = %https.id, ssh = %ssh.id, "Rules created");

    let updated = provider
        .security_groups()
        .update(&group.id, &group_config.clone().with_tag("owner", "platform"))
        .await
        .map_err(|e| e.to_string())?;
    if let Some(state) = updated.present() {
        info!(
            rules = state.security_rules.len(),
            tags = state.tags.len(),
            "Security group updated"
        );
    }

    for id in [&https.id, &https.id, &ssh.id] {
        provider.security_rules().delete(id).await.map_err(|e| e.to_string())?;
    }
    provider.security_groups().delete(&group.id).await.map_err(|e| e.to_string())?;
    provider.security_groups().delete(&group.id).await.map_err(|e| e.to_string())?;

    let gone = provider
        .security_groups()
        .read(&group.id)
        .await
        .map_err(|e| e.to_string())?
        .is_gone();
    info!(
        gone,
        writes = remote.writes(),
        deletes = remote.deletes(),
        polls = remote.polls(),
        "Demo finished"
    );

    provider.shutdown();
    Ok(())
}
