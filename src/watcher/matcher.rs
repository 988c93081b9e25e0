//! Subscription selector matching
//!
//! Every failure path returns `false`: a selector that cannot be parsed or
//! a namespace whose labels cannot be fetched never produces an alert.

use crate::cluster::{with_deadline, ResourceLookup};
use crate::model::{LabelSelector, Labels, ResourceSnapshot, SubscriptionRecord};
use std::time::Duration;
use tracing::debug;

/// Whether `record` wants alerts for `pod`
///
/// # Arguments
///
/// * `record` - Subscription to evaluate
/// * `pod` - Pod the event is about
/// * `lookup` - Source of namespace labels
/// * `timeout` - Deadline for the namespace lookup
///
/// Both selectors must match when set; a record without selectors matches
/// every pod.
pub async fn should_alert(
    record: &SubscriptionRecord,
    pod: &ResourceSnapshot,
    lookup: &dyn ResourceLookup,
    timeout: Duration,
) -> bool {
    if let Some(selector) = &record.spec.namespace_selector {
        if !namespace_matches(record, selector, pod, lookup, timeout).await {
            return false;
        }
    }

    if let Some(selector) = &record.spec.pod_selector {
        if !selector_matches(record, "pod", selector, &pod.labels) {
            return false;
        }
    }

    true
}

async fn namespace_matches(
    record: &SubscriptionRecord,
    selector: &LabelSelector,
    pod: &ResourceSnapshot,
    lookup: &dyn ResourceLookup,
    timeout: Duration,
) -> bool {
    let compiled = match selector.compile() {
        Ok(compiled) => compiled,
        Err(e) => {
            debug!(
                subscription = %record.key(),
                error = %e,
                "Invalid namespace selector, not alerting"
            );
            return false;
        }
    };

    let labels = match with_deadline(timeout, lookup.namespace_labels(&pod.namespace)).await {
        Ok(labels) => labels,
        Err(e) => {
            debug!(
                subscription = %record.key(),
                namespace = %pod.namespace,
                error = %e,
                "Namespace lookup failed, not alerting"
            );
            return false;
        }
    };

    compiled.matches(&labels)
}

fn selector_matches(
    record: &SubscriptionRecord,
    target: &str,
    selector: &LabelSelector,
    labels: &Labels,
) -> bool {
    match selector.compile() {
        Ok(compiled) => compiled.matches(labels),
        Err(e) => {
            debug!(
                subscription = %record.key(),
                target = target,
                error = %e,
                "Invalid selector, not alerting"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::InMemoryCluster;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn record() -> SubscriptionRecord {
        SubscriptionRecord::new("ns", "app-alerts", "https://hooks.example.com/T0")
    }

    fn cluster() -> InMemoryCluster {
        let cluster = InMemoryCluster::new();
        cluster.insert_namespace(
            "prod",
            Labels::from([("env".to_string(), "prod".to_string())]),
        );
        cluster.insert_namespace("dev", Labels::new());
        cluster
    }

    #[tokio::test]
    async fn test_no_selectors_matches_everything() {
        let cluster = InMemoryCluster::new();
        let pod = ResourceSnapshot::new("anywhere", "worker-1");
        assert!(should_alert(&record(), &pod, &cluster, TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_pod_selector() {
        let cluster = cluster();
        let mut record = record();
        record.spec.pod_selector = Some(LabelSelector::from_labels([("tier", "backend")]));

        let backend = ResourceSnapshot::new("dev", "api").with_label("tier", "backend");
        let frontend = ResourceSnapshot::new("dev", "web").with_label("tier", "frontend");
        let unlabeled = ResourceSnapshot::new("dev", "job");

        assert!(should_alert(&record, &backend, &cluster, TIMEOUT).await);
        assert!(!should_alert(&record, &frontend, &cluster, TIMEOUT).await);
        assert!(!should_alert(&record, &unlabeled, &cluster, TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_namespace_selector() {
        let cluster = cluster();
        let mut record = record();
        record.spec.namespace_selector = Some(LabelSelector::from_labels([("env", "prod")]));

        let prod = ResourceSnapshot::new("prod", "api");
        let dev = ResourceSnapshot::new("dev", "api");

        assert!(should_alert(&record, &prod, &cluster, TIMEOUT).await);
        assert!(!should_alert(&record, &dev, &cluster, TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_both_selectors_must_match() {
        let cluster = cluster();
        let mut record = record();
        record.spec.namespace_selector = Some(LabelSelector::from_labels([("env", "prod")]));
        record.spec.pod_selector = Some(LabelSelector::from_labels([("tier", "backend")]));

        let good = ResourceSnapshot::new("prod", "api").with_label("tier", "backend");
        let wrong_ns = ResourceSnapshot::new("dev", "api").with_label("tier", "backend");
        let wrong_pod = ResourceSnapshot::new("prod", "web").with_label("tier", "frontend");

        assert!(should_alert(&record, &good, &cluster, TIMEOUT).await);
        assert!(!should_alert(&record, &wrong_ns, &cluster, TIMEOUT).await);
        assert!(!should_alert(&record, &wrong_pod, &cluster, TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_missing_namespace_fails_closed() {
        let cluster = cluster();
        let mut record = record();
        record.spec.namespace_selector =
            Some(LabelSelector::default().with_expression("env", "DoesNotExist", &[]));

        let pod = ResourceSnapshot::new("unknown", "api");
        assert!(!should_alert(&record, &pod, &cluster, TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_unavailable_lookup_fails_closed() {
        let cluster = cluster();
        cluster.set_unavailable(true);
        let mut record = record();
        record.spec.namespace_selector = Some(LabelSelector::from_labels([("env", "prod")]));

        let pod = ResourceSnapshot::new("prod", "api");
        assert!(!should_alert(&record, &pod, &cluster, TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_invalid_selector_fails_closed() {
        let cluster = cluster();
        let mut record = record();
        record.spec.pod_selector =
            Some(LabelSelector::default().with_expression("tier", "Like", &["back*"]));

        let pod = ResourceSnapshot::new("prod", "api").with_label("tier", "backend");
        assert!(!should_alert(&record, &pod, &cluster, TIMEOUT).await);

        record.spec.pod_selector = None;
        record.spec.namespace_selector =
            Some(LabelSelector::default().with_expression("env", "In", &[]));
        assert!(!should_alert(&record, &pod, &cluster, TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_set_based_expressions() {
        let cluster = cluster();
        let mut record = record();
        record.spec.pod_selector = Some(
            LabelSelector::default()
                .with_expression("tier", "In", &["backend", "worker"])
                .with_expression("canary", "DoesNotExist", &[]),
        );

        let worker = ResourceSnapshot::new("prod", "w").with_label("tier", "worker");
        let canary = ResourceSnapshot::new("prod", "c")
            .with_label("tier", "worker")
            .with_label("canary", "true");

        assert!(should_alert(&record, &worker, &cluster, TIMEOUT).await);
        assert!(!should_alert(&record, &canary, &cluster, TIMEOUT).await);
    }
}
