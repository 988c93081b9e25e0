//! Replay and validate commands driven from YAML input files

mod common;

use std::time::Duration;

use podwatch::cluster::memory::ClusterSnapshot;
use podwatch::commands::replay::{replay, run_replay, ReplayArgs};
use podwatch::commands::validate::{run_validate, ValidateArgs};
use podwatch::commands::{load_cluster, load_events, load_subscriptions};
use podwatch::model::{Condition, InboundEvent, ResourceSnapshot, SubscriptionKey, SubscriptionRecord};

const CLUSTER: &str = r#"
namespaces:
  ns:
    env: prod
pods:
  - name: worker-1
    namespace: ns
    labels: { tier: backend }
    containers:
      - { name: app, restartCount: 3 }
  - name: web-0
    namespace: ns
    labels: { tier: frontend }
"#;

const EVENTS: &str = r#"
- reason: BackOff
  message: Back-off restarting failed container
  type: Warning
  involvedObject: { kind: Pod, name: worker-1, namespace: ns }
- reason: Scheduled
  message: Successfully assigned ns/worker-1
  type: Warning
  involvedObject: { kind: Pod, name: worker-1, namespace: ns }
- reason: Killing
  message: Stopping container app
  type: Warning
  involvedObject: { kind: Pod, name: web-0, namespace: ns }
"#;

fn subscriptions_yaml(webhook: &str) -> String {
    format!(
        r#"
- metadata: {{ name: backend, namespace: ns }}
  spec:
    webhookUrl: {webhook}
    enabled: true
    podSelector:
      matchLabels: {{ tier: backend }}
- metadata: {{ name: everything, namespace: ns }}
  spec:
    webhookUrl: {webhook}
    enabled: true
    namespaceSelector:
      matchLabels: {{ env: prod }}
- metadata: {{ name: muted, namespace: ns }}
  spec:
    webhookUrl: {webhook}
"#
    )
}

fn status_of(
    statuses: &[(SubscriptionKey, podwatch::status::ReportedStatus)],
    name: &str,
) -> podwatch::status::ReportedStatus {
    statuses
        .iter()
        .find(|(k, _)| k.name == name)
        .map(|(_, s)| s.clone())
        .unwrap_or_else(|| panic!("no status for {}", name))
}

#[tokio::test]
async fn test_replay_from_files() {
    let server = common::webhook(200).await;
    let (_d1, subs_path) = common::temp_yaml_file("subs.yaml", &subscriptions_yaml(&server.uri()));
    let (_d2, cluster_path) = common::temp_yaml_file("cluster.yaml", CLUSTER);
    let (_d3, events_path) = common::temp_yaml_file("events.yaml", EVENTS);

    let statuses = replay(
        &common::fast_config(),
        load_subscriptions(&subs_path).unwrap(),
        load_cluster(&cluster_path).unwrap(),
        load_events(&events_path).unwrap(),
        Duration::from_secs(10),
    )
    .await
    .unwrap();

    assert_eq!(statuses.len(), 3);
    assert_eq!(status_of(&statuses, "backend").event_count, 1);
    assert_eq!(status_of(&statuses, "everything").event_count, 2);
    assert_eq!(status_of(&statuses, "muted").event_count, 0);
    assert!(status_of(&statuses, "muted").conditions[Condition::READY].status);

    // backend: worker-1; everything: worker-1 and web-0
    assert_eq!(common::request_count(&server).await, 3);
}

#[tokio::test]
async fn test_replay_reports_invalid_records() {
    let server = common::webhook(200).await;
    let mut bad = SubscriptionRecord::new("ns", "bad-template", &server.uri());
    bad.spec.message_template = "%s restarted".to_string();
    let good = SubscriptionRecord::new("ns", "good", &server.uri());

    let cluster = ClusterSnapshot {
        pods: vec![ResourceSnapshot::new("ns", "worker-1")],
        ..Default::default()
    };
    let events = vec![InboundEvent::pod_warning(
        "ns",
        "worker-1",
        "BackOff",
        "Back-off restarting failed container",
    )];

    let statuses = replay(
        &common::fast_config(),
        vec![bad, good],
        cluster,
        events,
        Duration::from_secs(10),
    )
    .await
    .unwrap();

    let bad = status_of(&statuses, "bad-template");
    let condition = &bad.conditions[Condition::READY];
    assert!(!condition.status);
    assert_eq!(condition.reason, "InvalidTemplate");
    assert_eq!(bad.event_count, 0);

    assert_eq!(status_of(&statuses, "good").event_count, 1);
    assert_eq!(common::request_count(&server).await, 1);
}

#[tokio::test]
async fn test_replay_without_subscriptions() {
    let statuses = replay(
        &common::fast_config(),
        Vec::new(),
        ClusterSnapshot::default(),
        vec![InboundEvent::pod_warning("ns", "worker-1", "BackOff", "")],
        Duration::from_secs(1),
    )
    .await
    .unwrap();
    assert!(statuses.is_empty());
}

#[tokio::test]
async fn test_run_replay_missing_input() {
    let (_d, subs_path) = common::temp_yaml_file("subs.yaml", "[]");
    let args = ReplayArgs {
        subscriptions: subs_path,
        cluster: "/nonexistent/cluster.yaml".into(),
        events: "/nonexistent/events.yaml".into(),
        timeout_secs: 1,
    };

    let err = run_replay(common::fast_config(), args).await.unwrap_err();
    assert!(err.to_string().contains("cluster snapshot"));
}

#[test]
fn test_run_validate_accepts_valid_records() {
    let (_d, path) = common::temp_yaml_file(
        "subs.yaml",
        &subscriptions_yaml("https://hooks.example.com/services/T0"),
    );
    assert!(run_validate(ValidateArgs {
        subscriptions: path
    })
    .is_ok());
}

#[test]
fn test_run_validate_rejects_bad_selector() {
    let (_d, path) = common::temp_yaml_file(
        "subs.yaml",
        r#"
- metadata: { name: broken, namespace: ns }
  spec:
    webhookUrl: https://hooks.example.com/services/T0
    enabled: true
    podSelector:
      matchExpressions:
        - { key: tier, operator: Between, values: [a] }
"#,
    );
    assert!(run_validate(ValidateArgs {
        subscriptions: path
    })
    .is_err());
}
