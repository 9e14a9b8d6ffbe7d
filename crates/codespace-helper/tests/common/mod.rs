//! Shared test fixtures: an in-memory cluster gateway and config builders.

use async_trait::async_trait;
use clap::Parser;
use codespace_helper::error::{Error, Result};
use codespace_helper::gateway::ClusterGateway;
use codespace_helper::Config;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentCondition, DeploymentStatus};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, NamespaceStatus, Pod, Secret};
use k8s_openapi::api::networking::v1::{
    Ingress, IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressStatus,
};
use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Remote-side state the fake gateway serves.
#[derive(Default)]
pub struct ClusterState {
    /// Namespaces that currently exist (all reported Active).
    pub namespaces: HashSet<String>,
    /// Deployment reports an Available=True condition with matched replicas.
    pub workload_available: bool,
    /// Deployment reports a ReplicaFailure=True condition.
    pub replica_failure: bool,
    /// Ingress reports this load-balancer IP.
    pub ingress_ip: Option<String>,
    /// Next get_namespace call fails with a remote error.
    pub namespace_lookup_fails: bool,
}

/// In-memory [`ClusterGateway`] with programmable behavior and call counters.
#[derive(Default)]
pub struct FakeGateway {
    pub state: Mutex<ClusterState>,
    pub apply_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    /// Tenant namespace materialised by a successful apply.
    pub tenant: Mutex<String>,
    /// When set, apply signals `started` and then waits for `release`.
    pub apply_gate: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl FakeGateway {
    pub fn with_tenant(tenant: &str) -> Self {
        let gateway = Self::default();
        *gateway.tenant.lock().unwrap() = tenant.to_string();
        gateway
    }

    pub fn provisioned(tenant: &str) -> Self {
        let gateway = Self::with_tenant(tenant);
        {
            let mut state = gateway.state.lock().unwrap();
            state.namespaces.insert(tenant.to_string());
            state.workload_available = true;
            state.ingress_ip = Some("192.0.2.10".to_string());
        }
        gateway
    }

    fn active_namespace(name: &str) -> Namespace {
        let mut ns = Namespace::default();
        ns.metadata.name = Some(name.to_string());
        ns.status = Some(NamespaceStatus {
            phase: Some("Active".to_string()),
            ..NamespaceStatus::default()
        });
        ns
    }
}

#[async_trait]
impl ClusterGateway for FakeGateway {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        let mut state = self.state.lock().unwrap();
        if state.namespace_lookup_fails {
            state.namespace_lookup_fails = false;
            return Err(Error::RemoteFailure("api unavailable".into()));
        }
        Ok(state
            .namespaces
            .contains(name)
            .then(|| Self::active_namespace(name)))
    }

    async fn get_config_map(&self, _namespace: &str, _name: &str) -> Result<Option<ConfigMap>> {
        Ok(None)
    }

    async fn get_secret(&self, _namespace: &str, _name: &str) -> Result<Option<Secret>> {
        Ok(None)
    }

    async fn get_deployment(&self, namespace: &str, _name: &str) -> Result<Option<Deployment>> {
        let state = self.state.lock().unwrap();
        if !state.namespaces.contains(namespace) {
            return Ok(None);
        }

        let mut conditions = Vec::new();
        if state.replica_failure {
            conditions.push(DeploymentCondition {
                type_: "ReplicaFailure".to_string(),
                status: "True".to_string(),
                message: Some("pods failed to schedule".to_string()),
                ..DeploymentCondition::default()
            });
        }
        if state.workload_available {
            conditions.push(DeploymentCondition {
                type_: "Available".to_string(),
                status: "True".to_string(),
                ..DeploymentCondition::default()
            });
        }

        let mut deployment = Deployment::default();
        deployment.status = Some(DeploymentStatus {
            conditions: Some(conditions),
            replicas: Some(1),
            ready_replicas: Some(1),
            ..DeploymentStatus::default()
        });
        Ok(Some(deployment))
    }

    async fn list_pods(&self, _namespace: &str, _label_selector: &str) -> Result<Vec<Pod>> {
        Ok(Vec::new())
    }

    async fn get_ingress(&self, namespace: &str, _name: &str) -> Result<Option<Ingress>> {
        let state = self.state.lock().unwrap();
        if !state.namespaces.contains(namespace) {
            return Ok(None);
        }

        let mut ingress = Ingress::default();
        ingress.status = Some(IngressStatus {
            load_balancer: Some(IngressLoadBalancerStatus {
                ingress: Some(vec![IngressLoadBalancerIngress {
                    ip: state.ingress_ip.clone(),
                    ..IngressLoadBalancerIngress::default()
                }]),
            }),
        });
        Ok(Some(ingress))
    }

    async fn apply_manifest(&self, _manifest: &str) -> Result<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.apply_gate.lock().unwrap().clone();
        if let Some((started, release)) = gate {
            started.notify_one();
            release.notified().await;
        }

        let tenant = self.tenant.lock().unwrap().clone();
        self.state.lock().unwrap().namespaces.insert(tenant);
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().namespaces.remove(name);
        Ok(())
    }
}

/// Config pointing at a throwaway manifest template with short timeouts.
pub fn test_config() -> (Config, tempfile::NamedTempFile) {
    let mut template = tempfile::NamedTempFile::new().expect("temp template");
    template
        .write_all(b"apiVersion: v1\nkind: Namespace\nmetadata:\n  name: $ACCOUNT_NAMESPACE\n")
        .expect("write template");

    let path = template.path().to_string_lossy().into_owned();
    let config = Config::parse_from([
        "codespace-helper",
        "--template-file",
        &path,
        "--request-timeout",
        "5",
        "--object-ready-timeout",
        "5",
        "--deletion-timeout",
        "5",
    ]);

    (config, template)
}
