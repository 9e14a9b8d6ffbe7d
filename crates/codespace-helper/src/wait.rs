//! Bounded readiness polling.
//!
//! One generic suspension point ([`poll_until`]) plus the three
//! resource-specific predicates a codespace goes through: namespace active,
//! workload available with matching replicas, route holding an external IP.
//! Predicate errors are terminal and stop the poll immediately; only a
//! `false` outcome is retried.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::gateway::ClusterGateway;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Interval between readiness probes.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll `probe` every `interval` until it returns `Ok(true)`.
///
/// The first probe fires immediately. A probe error is terminal. A zero
/// `timeout` polls forever; otherwise expiry yields [`Error::Timeout`].
pub async fn poll_until<F, Fut>(
    interval: Duration,
    timeout: Duration,
    what: &str,
    mut probe: F,
) -> Result<()>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<bool>> + Send,
{
    let wait = async {
        loop {
            if probe().await? {
                return Ok(());
            }
            tokio::time::sleep(interval).await;
        }
    };

    if timeout.is_zero() {
        return wait.await;
    }

    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            what: what.to_string(),
            timeout,
        }),
    }
}

/// Namespace predicate: the namespace reports an active phase.
pub async fn namespace_active(gateway: &dyn ClusterGateway, tenant: &str) -> Result<bool> {
    let Some(ns) = gateway.get_namespace(tenant).await? else {
        return Ok(false);
    };

    let phase = ns.status.as_ref().and_then(|s| s.phase.as_deref());
    Ok(phase == Some("Active"))
}

/// Workload predicate with terminal-failure detection.
///
/// A `ReplicaFailure` condition fails immediately. While the deployment is
/// progressing, its pods are inspected: a failed pod or a container restart
/// count above [`MAX_RESTARTS`] is also terminal. Once `Available` is true,
/// readiness means the observed replica count matches the ready count.
pub async fn workload_ready(
    gateway: &dyn ClusterGateway,
    config: &Config,
    tenant: &str,
) -> Result<bool> {
    const MAX_RESTARTS: i32 = 4;

    let Some(app) = gateway.get_deployment(tenant, &config.app_name).await? else {
        return Ok(false);
    };

    let status = app.status.unwrap_or_default();
    let conditions = status.conditions.unwrap_or_default();

    if let Some(failure) = conditions
        .iter()
        .find(|c| c.type_ == "ReplicaFailure" && c.status == "True")
    {
        return Err(Error::RemoteFailure(format!(
            "deployment {}/{} replica failure: {}",
            tenant,
            config.app_name,
            failure.message.as_deref().unwrap_or("unknown")
        )));
    }

    if conditions
        .iter()
        .any(|c| c.type_ == "Progressing" && c.status == "True")
    {
        let selector = format!("app.kubernetes.io/name={}", config.app_name);
        for pod in gateway.list_pods(tenant, &selector).await? {
            let pod_name = pod.metadata.name.as_deref().unwrap_or("").to_string();
            let pod_status = pod.status.unwrap_or_default();

            if pod_status.phase.as_deref() == Some("Failed") {
                return Err(Error::RemoteFailure(format!(
                    "pod {tenant}/{pod_name} failed during rollout"
                )));
            }

            for container in pod_status.container_statuses.unwrap_or_default() {
                if container.restart_count > MAX_RESTARTS {
                    return Err(Error::RemoteFailure(format!(
                        "pod {tenant}/{pod_name} container {} restarted {} times",
                        container.name, container.restart_count
                    )));
                }
            }
        }
    }

    if conditions
        .iter()
        .any(|c| c.type_ == "Available" && c.status == "True")
    {
        let replicas = status.replicas.unwrap_or_default();
        let ready = status.ready_replicas.unwrap_or_default();
        debug!(
            "deployment {}/{} available with replicas={replicas}, ready={ready}",
            tenant, config.app_name
        );
        return Ok(replicas == ready);
    }

    Ok(false)
}

/// Route predicate: the ingress holds at least one external address with an IP.
pub async fn route_ready(
    gateway: &dyn ClusterGateway,
    config: &Config,
    tenant: &str,
) -> Result<bool> {
    let Some(ingress) = gateway.get_ingress(tenant, &config.app_name).await? else {
        return Ok(false);
    };

    let addresses = ingress
        .status
        .and_then(|s| s.load_balancer)
        .and_then(|lb| lb.ingress)
        .unwrap_or_default();

    Ok(addresses
        .iter()
        .any(|a| a.ip.as_deref().is_some_and(|ip| !ip.is_empty())))
}

/// Wait for a freshly applied codespace to become usable.
///
/// Three stages run in sequence; each gets a fresh full readiness budget
/// rather than a shared remaining one.
pub async fn wait_codespace_ready(
    gateway: &dyn ClusterGateway,
    config: &Config,
    tenant: &str,
) -> Result<()> {
    let budget = config.object_ready_timeout();

    info!("Waiting for codespace {tenant} to become ready");

    poll_until(
        POLL_INTERVAL,
        budget,
        &format!("namespace {tenant} to become active"),
        || namespace_active(gateway, tenant),
    )
    .await?;

    poll_until(
        POLL_INTERVAL,
        budget,
        &format!("deployment {tenant}/{} to become available", config.app_name),
        || workload_ready(gateway, config, tenant),
    )
    .await?;

    poll_until(
        POLL_INTERVAL,
        budget,
        &format!("ingress {tenant}/{} to acquire an address", config.app_name),
        || route_ready(gateway, config, tenant),
    )
    .await?;

    info!("Codespace {tenant} is ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockClusterGateway;
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentCondition, DeploymentStatus};
    use k8s_openapi::api::core::v1::{ContainerStatus, Pod, PodStatus};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn deployment(conditions: Vec<(&str, &str)>, replicas: i32, ready: i32) -> Deployment {
        Deployment {
            status: Some(DeploymentStatus {
                conditions: Some(
                    conditions
                        .into_iter()
                        .map(|(type_, status)| DeploymentCondition {
                            type_: type_.to_string(),
                            status: status.to_string(),
                            ..DeploymentCondition::default()
                        })
                        .collect(),
                ),
                replicas: Some(replicas),
                ready_replicas: Some(ready),
                ..DeploymentStatus::default()
            }),
            ..Deployment::default()
        }
    }

    fn pod_with_restarts(restarts: i32) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                container_statuses: Some(vec![ContainerStatus {
                    name: "workspace".to_string(),
                    restart_count: restarts,
                    ..ContainerStatus::default()
                }]),
                ..PodStatus::default()
            }),
            ..Pod::default()
        }
    }

    #[tokio::test]
    async fn test_replica_failure_is_terminal() {
        let mut gateway = MockClusterGateway::new();
        gateway
            .expect_get_deployment()
            .returning(|_, _| Ok(Some(deployment(vec![("ReplicaFailure", "True")], 1, 0))));
        gateway.expect_list_pods().times(0);

        let cfg = Config::default();
        let result = workload_ready(&gateway, &cfg, "alice").await;
        assert!(matches!(result, Err(Error::RemoteFailure(_))));
    }

    #[tokio::test]
    async fn test_excessive_restarts_during_rollout_are_terminal() {
        let mut gateway = MockClusterGateway::new();
        gateway
            .expect_get_deployment()
            .returning(|_, _| Ok(Some(deployment(vec![("Progressing", "True")], 1, 0))));
        gateway
            .expect_list_pods()
            .returning(|_, _| Ok(vec![pod_with_restarts(5)]));

        let cfg = Config::default();
        let result = workload_ready(&gateway, &cfg, "alice").await;
        assert!(matches!(result, Err(Error::RemoteFailure(_))));
    }

    #[tokio::test]
    async fn test_bounded_restarts_during_rollout_keep_polling() {
        let mut gateway = MockClusterGateway::new();
        gateway
            .expect_get_deployment()
            .returning(|_, _| Ok(Some(deployment(vec![("Progressing", "True")], 1, 0))));
        gateway
            .expect_list_pods()
            .returning(|_, _| Ok(vec![pod_with_restarts(4)]));

        let cfg = Config::default();
        let result = workload_ready(&gateway, &cfg, "alice").await;
        assert!(matches!(result, Ok(false)));
    }

    #[tokio::test]
    async fn test_available_requires_matching_replica_counts() {
        let mut gateway = MockClusterGateway::new();
        gateway
            .expect_get_deployment()
            .returning(|_, _| Ok(Some(deployment(vec![("Available", "True")], 2, 1))));

        let cfg = Config::default();
        assert!(matches!(
            workload_ready(&gateway, &cfg, "alice").await,
            Ok(false)
        ));

        let mut gateway = MockClusterGateway::new();
        gateway
            .expect_get_deployment()
            .returning(|_, _| Ok(Some(deployment(vec![("Available", "True")], 2, 2))));
        assert!(matches!(
            workload_ready(&gateway, &cfg, "alice").await,
            Ok(true)
        ));
    }

    #[tokio::test]
    async fn test_succeeds_once_probe_reports_done() {
        let calls = AtomicU32::new(0);
        let result = poll_until(Duration::from_millis(10), Duration::from_secs(5), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(n >= 2) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_probe_error_is_terminal_and_immediate() {
        let calls = AtomicU32::new(0);
        let result = poll_until(Duration::from_secs(60), Duration::from_secs(600), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::RemoteFailure("replica failure".into())) }
        })
        .await;

        assert!(matches!(result, Err(Error::RemoteFailure(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_yields_timeout_within_one_interval() {
        let started = tokio::time::Instant::now();
        let result = poll_until(
            Duration::from_secs(1),
            Duration::from_secs(30),
            "deployment test",
            || async { Ok(false) },
        )
        .await;

        match result {
            Err(Error::Timeout { what, timeout }) => {
                assert_eq!(what, "deployment test");
                assert_eq!(timeout, Duration::from_secs(30));
            }
            other => panic!("expected timeout, got {other:?}"),
        }

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(30));
        assert!(elapsed <= Duration::from_secs(31));
    }

    #[tokio::test]
    async fn test_zero_timeout_polls_until_done() {
        let calls = AtomicU32::new(0);
        let result = poll_until(Duration::from_millis(1), Duration::ZERO, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(n >= 9) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }
}
