//! Policy rounds against an in-memory orchestrator.

mod common;

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{ready_pods, FakeCluster, RecordingFactory, RemoteCall};
use reconfigurator::diff::{diff_bundles, ConfigBundle, ConfigDescription, ConfigPatch, ConfigVersion};
use reconfigurator::parser::{ConfigFormat, FormatterConfig};
use reconfigurator::policy::{
    ExecStatus, MaxUnavailable, PolicyRegistry, ReconfigureParams, ReturnedStatus, WorkloadType, OPERATOR_SYNC,
    PARALLEL, ROLLING, SIMPLE,
};

const KEY: &str = "mysql-config";
const UNIT: &str = "mysql";

fn patch() -> ConfigPatch {
    let old = ConfigBundle::new(BTreeMap::from([(
        "my.cnf".to_string(),
        "[mysqld]\nmax_connections=100\n".to_string(),
    )]));
    let new = ConfigBundle::new(BTreeMap::from([(
        "my.cnf".to_string(),
        "[mysqld]\nmax_connections=200\n".to_string(),
    )]));
    let descriptions = vec![ConfigDescription::new(
        "my.cnf",
        FormatterConfig::new(ConfigFormat::Ini).with_section("mysqld"),
    )];
    diff_bundles(&old, &new, &descriptions).unwrap()
}

fn params(cluster: &Arc<FakeCluster>, factory: &Arc<RecordingFactory>, replicas: usize) -> ReconfigureParams {
    ReconfigureParams {
        config_key: KEY.to_string(),
        config_version: ConfigVersion::from("v2"),
        patch: patch(),
        workload: WorkloadType::Stateful,
        units: vec![UNIT.to_string()],
        replicas,
        containers: vec!["mysql".to_string()],
        selector: BTreeMap::new(),
        max_unavailable: MaxUnavailable::Count(1),
        min_ready: Duration::ZERO,
        sidecar_port: 9901,
        cluster: cluster.clone(),
        client_factory: factory.clone(),
    }
}

async fn run(name: &str, params: &ReconfigureParams) -> ReturnedStatus {
    let policy = PolicyRegistry::with_defaults().get(name).unwrap();
    match policy.upgrade(params).await {
        Ok(status) => status,
        Err(e) => e.to_status(params.replicas),
    }
}

fn stopped(factory: &RecordingFactory) -> Vec<String> {
    factory
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            RemoteCall::Stop { address, .. } => Some(address),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_operator_sync_converges_over_two_rounds() {
    let cluster = FakeCluster::with_unit(UNIT, ready_pods(UNIT, 3));
    let factory = RecordingFactory::new();
    let params = params(&cluster, &factory, 3);

    let first = run(OPERATOR_SYNC, &params).await;
    assert_eq!(first, ReturnedStatus::retry(0, 3));

    let calls = factory.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(
        calls[0],
        RemoteCall::Online {
            address: "10.0.0.1:9901".to_string(),
            config_spec: KEY.to_string(),
            params: BTreeMap::from([("max_connections".to_string(), "200".to_string())]),
        }
    );

    let second = run(OPERATOR_SYNC, &params).await;
    assert_eq!(second, ReturnedStatus::converged(3));
    assert_eq!(factory.calls().len(), 3);
}

#[tokio::test]
async fn test_operator_sync_skips_unready_pods() {
    let cluster = FakeCluster::with_unit(UNIT, ready_pods(UNIT, 3));
    cluster.update_pod("mysql-1", |pod| pod.ready = false);
    let factory = RecordingFactory::new();
    let params = params(&cluster, &factory, 3);

    assert_eq!(run(OPERATOR_SYNC, &params).await.status, ExecStatus::Retry);
    assert_eq!(factory.calls().len(), 2);
    assert_eq!(cluster.versions(KEY)["mysql-1"], None);

    cluster.update_pod("mysql-1", |pod| pod.ready = true);
    assert_eq!(run(OPERATOR_SYNC, &params).await, ReturnedStatus::retry(2, 3));
    assert_eq!(run(OPERATOR_SYNC, &params).await, ReturnedStatus::converged(3));
}

#[tokio::test]
async fn test_operator_sync_selector_without_match_retries() {
    let cluster = FakeCluster::with_unit(UNIT, ready_pods(UNIT, 2));
    let factory = RecordingFactory::new();
    let mut params = params(&cluster, &factory, 2);
    params.selector = BTreeMap::from([("role".to_string(), "primary".to_string())]);

    assert_eq!(run(OPERATOR_SYNC, &params).await, ReturnedStatus::retry(0, 0));
    assert!(factory.calls().is_empty());
}

#[tokio::test]
async fn test_rolling_highest_ordinal_first() {
    let cluster = FakeCluster::with_unit(UNIT, ready_pods(UNIT, 3));
    let factory = RecordingFactory::new();
    let params = params(&cluster, &factory, 3);

    assert_eq!(run(ROLLING, &params).await, ReturnedStatus::retry(1, 3));
    assert_eq!(stopped(&factory), vec!["10.0.0.3:9901"]);

    assert_eq!(run(ROLLING, &params).await.status, ExecStatus::Retry);
    assert_eq!(stopped(&factory), vec!["10.0.0.3:9901", "10.0.0.2:9901"]);

    assert_eq!(run(ROLLING, &params).await.status, ExecStatus::Retry);
    assert_eq!(stopped(&factory).len(), 3);

    assert_eq!(run(ROLLING, &params).await, ReturnedStatus::converged(3));
    assert_eq!(stopped(&factory).len(), 3);
}

#[tokio::test]
async fn test_rolling_waits_for_restarted_pod() {
    let cluster = FakeCluster::with_unit(UNIT, ready_pods(UNIT, 3));
    let factory = RecordingFactory::new();
    let params = params(&cluster, &factory, 3);

    run(ROLLING, &params).await;
    cluster.update_pod("mysql-2", |pod| pod.ready = false);

    assert_eq!(run(ROLLING, &params).await.status, ExecStatus::Retry);
    assert_eq!(stopped(&factory), vec!["10.0.0.3:9901"]);
}

#[tokio::test]
async fn test_rolling_rejects_unhealthy_prefix() {
    let cluster = FakeCluster::with_unit(UNIT, ready_pods(UNIT, 3));
    cluster.update_pod("mysql-0", |pod| pod.ready = false);
    let factory = RecordingFactory::new();
    let params = params(&cluster, &factory, 3);

    assert_eq!(run(ROLLING, &params).await.status, ExecStatus::Retry);
    assert!(factory.calls().is_empty());
}

#[tokio::test]
async fn test_rolling_waits_for_all_replicas() {
    let cluster = FakeCluster::with_unit(UNIT, ready_pods(UNIT, 2));
    let factory = RecordingFactory::new();
    let params = params(&cluster, &factory, 3);

    assert_eq!(run(ROLLING, &params).await, ReturnedStatus::retry(0, 3));
    assert!(factory.calls().is_empty());
}

#[tokio::test]
async fn test_simple_polls_annotation_progress() {
    let cluster = FakeCluster::with_unit(UNIT, ready_pods(UNIT, 2));
    cluster.unit_conflicts.store(1, Ordering::SeqCst);
    let factory = RecordingFactory::new();
    let params = params(&cluster, &factory, 2);

    assert_eq!(run(SIMPLE, &params).await.status, ExecStatus::FailedAndRetry);
    assert_eq!(run(SIMPLE, &params).await, ReturnedStatus::retry(0, 2));

    cluster.recreate_pod(UNIT, "mysql-0");
    assert_eq!(run(SIMPLE, &params).await, ReturnedStatus::retry(1, 2));

    cluster.recreate_pod(UNIT, "mysql-1");
    assert_eq!(run(SIMPLE, &params).await, ReturnedStatus::converged(2));
    assert!(factory.calls().is_empty());
}

#[tokio::test]
async fn test_parallel_restarts_every_stale_pod() {
    let cluster = FakeCluster::with_unit(UNIT, ready_pods(UNIT, 3));
    cluster.update_pod("mysql-1", |pod| {
        pod.labels
            .insert(reconfigurator::policy::version_label_key(KEY), "v2".to_string());
    });
    let factory = RecordingFactory::new();
    let params = params(&cluster, &factory, 3);

    assert_eq!(run(PARALLEL, &params).await, ReturnedStatus::converged(3));
    assert_eq!(stopped(&factory), vec!["10.0.0.1:9901", "10.0.0.3:9901"]);
    assert!(cluster.versions(KEY).values().all(|v| v.as_deref() == Some("v2")));
    assert_eq!(
        factory.calls()[0],
        RemoteCall::Stop {
            address: "10.0.0.1:9901".to_string(),
            ids: vec!["containerd://mysql-0-mysql".to_string()],
        }
    );
}

#[tokio::test]
async fn test_parallel_fails_fast() {
    let cluster = FakeCluster::with_unit(UNIT, ready_pods(UNIT, 3));
    let factory = RecordingFactory::new();
    factory.fail("10.0.0.2:9901");
    let params = params(&cluster, &factory, 3);

    assert_eq!(run(PARALLEL, &params).await.status, ExecStatus::FailedAndRetry);
    let versions = cluster.versions(KEY);
    assert_eq!(versions["mysql-0"].as_deref(), Some("v2"));
    assert_eq!(versions["mysql-1"], None);
    assert_eq!(versions["mysql-2"], None);

    factory.failing.lock().unwrap().clear();
    assert_eq!(run(PARALLEL, &params).await, ReturnedStatus::converged(3));
    assert_eq!(stopped(&factory), vec!["10.0.0.1:9901", "10.0.0.2:9901", "10.0.0.3:9901"]);
}

#[tokio::test]
async fn test_missing_container_is_structural() {
    let cluster = FakeCluster::with_unit(UNIT, ready_pods(UNIT, 1));
    let factory = RecordingFactory::new();
    let mut params = params(&cluster, &factory, 1);
    params.containers = vec!["exporter".to_string()];

    assert_eq!(run(PARALLEL, &params).await.status, ExecStatus::Failed);
}

#[tokio::test]
async fn test_unsupported_workload() {
    let cluster = FakeCluster::with_unit(UNIT, ready_pods(UNIT, 1));
    let factory = RecordingFactory::new();
    let mut params = params(&cluster, &factory, 1);
    params.workload = WorkloadType::Stateless;

    for name in [ROLLING, PARALLEL, OPERATOR_SYNC] {
        assert_eq!(run(name, &params).await.status, ExecStatus::NotSupport, "{name}");
    }
    assert!(factory.calls().is_empty());
}
