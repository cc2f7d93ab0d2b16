//! Reconcile passes from config change to persisted last-applied state.

mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use common::{ready_pods, FakeCluster, RecordingFactory, RemoteCall};
use reconfigurator::config::ManagerConfig;
use reconfigurator::diff::{ConfigBundle, ConfigDescription, ConfigVersion, DiffError, ParameterClassification};
use reconfigurator::parser::{ConfigFormat, FormatterConfig};
use reconfigurator::policy::{restart_annotation_key, ExecStatus, PolicyRegistry, ReturnedStatus};
use reconfigurator::reconcile::{
    ReconcileError, ReconcileRequest, Reconciler, RolloutTarget, CONFIG_VERSION_LABEL, LAST_APPLIED_ANNOTATION,
};

const CONFIG: &str = "mysql-config";
const UNIT: &str = "mysql";
const OLD: &str = "[mysqld]\nmax_connections=100\ninnodb_buffer_pool_size=1G\n";

fn cluster_with_applied(applied: Option<&str>) -> Arc<FakeCluster> {
    let cluster = FakeCluster::with_unit(UNIT, ready_pods(UNIT, 3));
    cluster.put_config(CONFIG, &[("my.cnf", OLD)]);
    if let Some(content) = applied {
        let files = BTreeMap::from([("my.cnf".to_string(), content.to_string())]);
        cluster
            .configs
            .lock()
            .unwrap()
            .get_mut(CONFIG)
            .unwrap()
            .annotations
            .insert(LAST_APPLIED_ANNOTATION.to_string(), serde_json::to_string(&files).unwrap());
    }
    cluster
}

fn request(requested_policy: Option<&str>) -> ReconcileRequest {
    ReconcileRequest {
        config_name: CONFIG.to_string(),
        config_key: CONFIG.to_string(),
        descriptions: vec![ConfigDescription::new(
            "my.cnf",
            FormatterConfig::new(ConfigFormat::Ini).with_section("mysqld"),
        )],
        classification: ParameterClassification {
            static_parameters: BTreeSet::from(["innodb_buffer_pool_size".to_string()]),
            dynamic_parameters: BTreeSet::from(["max_connections".to_string()]),
        },
        requested_policy: requested_policy.map(str::to_string),
        target: RolloutTarget {
            units: vec![UNIT.to_string()],
            replicas: 3,
            containers: vec!["mysql".to_string()],
            sidecar_port: 9901,
            ..Default::default()
        },
    }
}

fn reconciler(cluster: &Arc<FakeCluster>, factory: &Arc<RecordingFactory>) -> Reconciler {
    Reconciler::new(cluster.clone(), factory.clone(), PolicyRegistry::with_defaults())
}

#[tokio::test]
async fn test_dynamic_change_goes_online_then_persists() {
    let cluster = cluster_with_applied(Some(OLD));
    let new = "[mysqld]\nmax_connections=200\ninnodb_buffer_pool_size=1G\n";
    cluster.put_config(CONFIG, &[("my.cnf", new)]);
    let factory = RecordingFactory::new();
    let reconciler = reconciler(&cluster, &factory);
    let request = request(Some("rolling"));

    let first = reconciler.reconcile(&request).await.unwrap();
    assert_eq!(first.policy, Some("operatorSyncUpdate"));
    assert!(first.dynamic);
    assert_eq!(first.status, ReturnedStatus::retry(0, 3));
    assert!(!cluster.config(CONFIG).labels.contains_key(CONFIG_VERSION_LABEL));

    let online: Vec<_> = factory
        .calls()
        .into_iter()
        .filter(|call| matches!(call, RemoteCall::Online { params, .. }
            if params == &BTreeMap::from([("max_connections".to_string(), "200".to_string())])))
        .collect();
    assert_eq!(online.len(), 3);

    let second = reconciler.reconcile(&request).await.unwrap();
    assert_eq!(second.status, ReturnedStatus::converged(3));

    let expected_version = ConfigVersion::of(&ConfigBundle::new(BTreeMap::from([(
        "my.cnf".to_string(),
        new.to_string(),
    )])));
    assert_eq!(second.version, expected_version);

    let object = cluster.config(CONFIG);
    assert_eq!(object.labels[CONFIG_VERSION_LABEL], expected_version.to_string());
    let applied: BTreeMap<String, String> =
        serde_json::from_str(&object.annotations[LAST_APPLIED_ANNOTATION]).unwrap();
    assert_eq!(applied["my.cnf"], new);

    let third = reconciler.reconcile(&request).await.unwrap();
    assert_eq!(third.policy, None);
    assert_eq!(third.status, ReturnedStatus::converged(0));
    assert_eq!(factory.calls().len(), 3);
}

#[tokio::test]
async fn test_static_change_uses_requested_policy() {
    let cluster = cluster_with_applied(Some(OLD));
    cluster.put_config(CONFIG, &[("my.cnf", "[mysqld]\nmax_connections=100\ninnodb_buffer_pool_size=2G\n")]);
    let factory = RecordingFactory::new();

    let outcome = reconciler(&cluster, &factory)
        .reconcile(&request(Some("rolling")))
        .await
        .unwrap();

    assert_eq!(outcome.policy, Some("rolling"));
    assert!(!outcome.dynamic);
    assert_eq!(outcome.status, ReturnedStatus::retry(1, 3));
    assert_eq!(
        factory.calls(),
        vec![RemoteCall::Stop {
            address: "10.0.0.3:9901".to_string(),
            ids: vec!["containerd://mysql-2-mysql".to_string()],
        }]
    );
    assert!(!cluster.config(CONFIG).labels.contains_key(CONFIG_VERSION_LABEL));
}

#[tokio::test]
async fn test_first_rollout_restarts_through_template() {
    let cluster = cluster_with_applied(None);
    let factory = RecordingFactory::new();

    let outcome = reconciler(&cluster, &factory)
        .reconcile(&request(None))
        .await
        .unwrap();

    assert_eq!(outcome.policy, Some("simple"));
    assert_eq!(outcome.status, ReturnedStatus::retry(0, 3));
    let annotations = cluster.unit_annotations.lock().unwrap()[UNIT].clone();
    assert_eq!(
        annotations[&restart_annotation_key(CONFIG)],
        outcome.version.to_string()
    );
    assert!(factory.calls().is_empty());
}

#[tokio::test]
async fn test_policy_failure_is_reported_in_outcome() {
    let cluster = cluster_with_applied(Some(OLD));
    cluster.put_config(CONFIG, &[("my.cnf", "[mysqld]\nmax_connections=300\ninnodb_buffer_pool_size=1G\n")]);
    let factory = RecordingFactory::new();
    factory.fail("10.0.0.1:9901");

    let outcome = reconciler(&cluster, &factory)
        .reconcile(&request(None))
        .await
        .unwrap();

    assert_eq!(outcome.status.status, ExecStatus::FailedAndRetry);
    assert!(outcome.message.unwrap().contains("mysql-0"));
    assert!(!cluster.config(CONFIG).labels.contains_key(CONFIG_VERSION_LABEL));
}

#[tokio::test]
async fn test_validator_rejects_before_rollout() {
    let cluster = cluster_with_applied(Some(OLD));
    cluster.put_config(CONFIG, &[("my.cnf", "[mysqld]\nmax_connections=-1\ninnodb_buffer_pool_size=1G\n")]);
    let factory = RecordingFactory::new();
    let validator = |bundle: &ConfigBundle| {
        if bundle.files.values().any(|content| content.contains("=-1")) {
            Err("max_connections must be positive".to_string())
        } else {
            Ok(())
        }
    };

    let result = reconciler(&cluster, &factory)
        .with_validator(Arc::new(validator))
        .reconcile(&request(None))
        .await;

    assert!(matches!(
        result,
        Err(ReconcileError::Diff(DiffError::Validation(_)))
    ));
    assert!(factory.calls().is_empty());
    assert!(cluster.label_patches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_config_is_an_error() {
    let cluster = FakeCluster::with_unit(UNIT, ready_pods(UNIT, 1));
    let factory = RecordingFactory::new();

    let result = reconciler(&cluster, &factory).reconcile(&request(None)).await;
    assert!(matches!(result, Err(ReconcileError::Cluster(_))));
}

#[tokio::test]
async fn test_reconfigure_section_drives_restart_window() {
    let cluster = cluster_with_applied(Some(OLD));
    cluster.put_config(CONFIG, &[("my.cnf", "[mysqld]\nmax_connections=100\ninnodb_buffer_pool_size=4G\n")]);
    let factory = RecordingFactory::new();
    let config: ManagerConfig = toml::from_str(
        r#"
        [reconfigure]
        sidecar_port = 3501
        max_unavailable = "2"
        default_policy = "rolling"
        "#,
    )
    .unwrap();
    let reconfigure = &config.reconfigure;

    let mut request = request(Some(reconfigure.default_policy.as_str()));
    request.target = reconfigure.rollout_target(vec![UNIT.to_string()], 3, vec!["mysql".to_string()]);

    let outcome = reconciler(&cluster, &factory).reconcile(&request).await.unwrap();

    assert_eq!(outcome.policy, Some(reconfigure.policy_for(false)));
    assert_eq!(outcome.status, ReturnedStatus::retry(2, 3));
    let stopped: Vec<_> = factory
        .calls()
        .into_iter()
        .map(|call| match call {
            RemoteCall::Stop { address, .. } => address,
            RemoteCall::Online { address, .. } => address,
        })
        .collect();
    assert_eq!(stopped, vec!["10.0.0.3:3501", "10.0.0.2:3501"]);
}
