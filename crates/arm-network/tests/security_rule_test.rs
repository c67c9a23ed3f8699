use arm_network::model::NetworkSecurityGroup;
use arm_network::provider::NetworkProvider;
use arm_network::resources::{codec, SecurityGroupConfig, SecurityRuleConfig};
use arm_reconcile::mock::{MockCall, MockRemote, PollStep};
use arm_reconcile::{
    ApiError, ProvisioningState, Reconcile, ReconcileConfig, ReconcileContext, ReconcileError, RemoteErrorDetail,
    Verb,
};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type Remote = MockRemote<NetworkSecurityGroup>;

const GROUP_ID: &str =
    "/subscriptions/sub-1/resourceGroups/network-rg/providers/Microsoft.Network/networkSecurityGroups/shared-nsg";

fn config() -> ReconcileConfig {
    ReconcileConfig::default().with_poll_interval(Duration::from_secs(10))
}

async fn with_group(remote: &Remote) -> NetworkProvider<Remote> {
    let provider = NetworkProvider::new(remote.clone(), config());
    provider
        .security_groups()
        .create(&SecurityGroupConfig::new("sub-1", "network-rg", "shared-nsg", "westeurope"))
        .await
        .expect("Failed to create group");
    provider
}

fn group(remote: &Remote) -> NetworkSecurityGroup {
    remote
        .get_object(&codec().parse(GROUP_ID).unwrap())
        .expect("group is missing")
}

/// Many rules declared against one group, reconciled at the same time.
/// Every rule must survive the full-list writes of the others.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rule_creates_keep_every_rule() {
    let remote = Remote::new().with_latency(Duration::from_millis(15));
    let provider = std::sync::Arc::new(with_group(&remote).await);

    let handles: Vec<_> = (0..6u32)
        .map(|i| {
            let provider = provider.clone();
            tokio::spawn(async move {
                let rule = SecurityRuleConfig::new(GROUP_ID, format!("rule-{i}"), 100 + i)
                    .with_destination_port_range(format!("{}", 8000 + i));
                provider.security_rules().create(&rule).await
            })
        })
        .collect();

    for handle in handles {
        handle.await.expect("task panicked").expect("Failed to create rule");
    }

    let rules = group(&remote).security_rules;
    assert_eq!(rules.len(), 6);
    for i in 0..6 {
        assert!(rules.iter().any(|r| r.name == format!("rule-{i}")), "rule-{i} was lost");
    }
}

/// Creates, updates and deletes racing on one group: the final list is
/// exactly what the surviving declarations say.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_concurrent_verbs_on_one_group() {
    let remote = Remote::new().with_latency(Duration::from_millis(10));
    let provider = std::sync::Arc::new(with_group(&remote).await);

    let doomed = provider
        .security_rules()
        .create(&SecurityRuleConfig::new(GROUP_ID, "doomed", 400))
        .await
        .unwrap();
    let edited = provider
        .security_rules()
        .create(&SecurityRuleConfig::new(GROUP_ID, "edited", 500))
        .await
        .unwrap();

    let delete = {
        let provider = provider.clone();
        tokio::spawn(async move { provider.security_rules().delete(&doomed.id).await })
    };
    let update = {
        let provider = provider.clone();
        tokio::spawn(async move {
            let desired = SecurityRuleConfig::new(GROUP_ID, "edited", 510).with_destination_port_range("443");
            provider.security_rules().update(&edited.id, &desired).await
        })
    };
    let create = {
        let provider = provider.clone();
        tokio::spawn(async move {
            provider
                .security_rules()
                .create(&SecurityRuleConfig::new(GROUP_ID, "fresh", 600))
                .await
        })
    };

    delete.await.unwrap().unwrap();
    assert!(update.await.unwrap().unwrap().present().is_some());
    create.await.unwrap().unwrap();

    let rules = group(&remote).security_rules;
    let mut names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["edited", "fresh"]);
    let edited = rules.iter().find(|r| r.name == "edited").unwrap();
    assert_eq!((edited.priority, edited.destination_port_range.as_str()), (510, "443"));
}

#[tokio::test]
async fn test_duplicate_rule_name_differing_in_case() {
    let remote = Remote::new();
    let provider = with_group(&remote).await;

    provider
        .security_rules()
        .create(&SecurityRuleConfig::new(GROUP_ID, "Allow-SSH", 100))
        .await
        .unwrap();
    let err = provider
        .security_rules()
        .create(&SecurityRuleConfig::new(GROUP_ID, "allow-ssh", 110))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::AlreadyExists { ref id } if id.ends_with("/securityRules/allow-ssh")));
    assert_eq!(group(&remote).security_rules.len(), 1);
}

#[tokio::test]
async fn test_rule_removed_out_of_band_is_gone() {
    let remote = Remote::new();
    let provider = with_group(&remote).await;
    let rule = provider
        .security_rules()
        .create(&SecurityRuleConfig::new(GROUP_ID, "temp", 100))
        .await
        .unwrap();

    let id = codec().parse(GROUP_ID).unwrap();
    let mut drifted = group(&remote);
    drifted.security_rules.clear();
    remote.insert(&id, drifted);
    let writes = remote.writes();

    assert!(provider.security_rules().read(&rule.id).await.unwrap().is_gone());
    let outcome = provider
        .security_rules()
        .update(&rule.id, &SecurityRuleConfig::new(GROUP_ID, "temp", 120))
        .await
        .unwrap();
    assert!(outcome.is_gone());
    provider.security_rules().delete(&rule.id).await.unwrap();
    assert_eq!(remote.writes(), writes);
}

#[tokio::test(start_paused = true)]
async fn test_group_write_failure_surfaces_on_rule_create() {
    let remote = Remote::new();
    let provider = with_group(&remote).await;

    remote.script_next_write(vec![
        PollStep::State(ProvisioningState::Updating),
        PollStep::Fail(RemoteErrorDetail::new("SecurityRuleConflict", "priority 100 is already in use")),
    ]);
    let err = provider
        .security_rules()
        .create(&SecurityRuleConfig::new(GROUP_ID, "conflicting", 100))
        .await
        .unwrap_err();

    match err {
        ReconcileError::RemoteOperationFailed { id, detail } => {
            assert_eq!(id, GROUP_ID);
            assert_eq!(detail.code, "SecurityRuleConflict");
        }
        other => panic!("expected a remote failure, got {other:?}"),
    }
    assert!(group(&remote).security_rules.is_empty());
}

#[tokio::test]
async fn test_group_read_failure_releases_the_lock() {
    let remote = Remote::new();
    let provider = with_group(&remote).await;

    remote.fail_next(MockCall::Get, ApiError::new(500, "InternalServerError", "try again"));
    let err = provider
        .security_rules()
        .create(&SecurityRuleConfig::new(GROUP_ID, "first", 100))
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    provider
        .security_rules()
        .create(&SecurityRuleConfig::new(GROUP_ID, "first", 100))
        .await
        .expect("lock was left held");
    assert_eq!(provider.context().locks().active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_group_write_times_out() {
    let remote = Remote::new();
    let provider = with_group(&remote).await;
    let deadline = Instant::now() + Duration::from_secs(60);
    let ctx = provider.context().child().with_deadline(deadline);
    let rules = arm_reconcile::EntryReconciler::<arm_network::resources::SecurityRules, _>::new(std::sync::Arc::new(ctx));

    remote.script_next_write(vec![PollStep::State(ProvisioningState::Updating)]);
    let err = rules
        .create(&SecurityRuleConfig::new(GROUP_ID, "slow", 100))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Timeout { .. }));
    assert!(Instant::now() >= deadline);
}

#[tokio::test]
async fn test_cancelled_child_context_stops_rule_reconciliation() {
    let remote = Remote::new();
    let token = CancellationToken::new();
    let ctx = ReconcileContext::new(remote.clone(), codec())
        .with_config(config())
        .with_cancellation(token.clone());
    let provider = NetworkProvider::from_context(ctx);
    token.cancel();

    let err = provider
        .security_rules()
        .create(&SecurityRuleConfig::new(GROUP_ID, "never", 100))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Cancelled));
    assert_eq!(remote.calls(MockCall::Get), 0);
    assert!(provider.context().deadline_for(Verb::Read) > Instant::now());
}
