//! Narrow gateway to the cluster API.
//!
//! The lifecycle controller only ever talks to the [`ClusterGateway`] trait,
//! so tests can inject a fake and the kube client stays an implementation
//! detail. The real implementation builds its client exactly once per process
//! and shells out to `kubectl` for the declarative apply/delete primitives,
//! capturing diagnostics on failure.

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, Secret};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

/// Cluster operations the lifecycle controller depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Fetch a namespace; `None` when it does not exist.
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>>;

    /// Fetch a config map; `None` when it does not exist.
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    /// Fetch a secret; `None` when it does not exist.
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// Fetch a workload deployment; `None` when it does not exist.
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>>;

    /// List pods in a namespace matching a label selector.
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;

    /// Fetch an ingress route; `None` when it does not exist.
    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>>;

    /// Declaratively apply a rendered manifest.
    async fn apply_manifest(&self, manifest: &str) -> Result<()>;

    /// Delete a tenant namespace and everything inside it.
    async fn delete_namespace(&self, name: &str) -> Result<()>;
}

/// [`ClusterGateway`] backed by a real cluster.
pub struct KubeGateway {
    kubeconfig: Option<PathBuf>,
    request_timeout: Duration,
    deletion_timeout: Duration,
    max_grace_period: Duration,
    client: OnceCell<Client>,
}

impl KubeGateway {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            kubeconfig: config.kubeconfig.clone(),
            request_timeout: config.request_timeout(),
            deletion_timeout: config.deletion_timeout(),
            max_grace_period: config.max_grace_period(),
            client: OnceCell::new(),
        }
    }

    /// Build the kube client on first use; later calls reuse the same client.
    async fn client(&self) -> Result<Client> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let mut config = match &self.kubeconfig {
                    Some(path) => {
                        info!("Using kubeconfig at {}", path.display());
                        let kubeconfig = Kubeconfig::read_from(path)
                            .map_err(|e| Error::RemoteFailure(format!("reading kubeconfig: {e}")))?;
                        kube::Config::from_custom_kubeconfig(
                            kubeconfig,
                            &KubeConfigOptions::default(),
                        )
                        .await
                        .map_err(|e| Error::RemoteFailure(format!("loading kubeconfig: {e}")))?
                    }
                    None => {
                        info!("Using in-cluster configuration");
                        kube::Config::infer().await.map_err(|e| {
                            Error::RemoteFailure(format!("inferring cluster config: {e}"))
                        })?
                    }
                };

                if !self.request_timeout.is_zero() {
                    config.read_timeout = Some(self.request_timeout);
                    config.connect_timeout = Some(self.request_timeout);
                }

                let client = Client::try_from(config)
                    .map_err(|e| Error::RemoteFailure(format!("building kube client: {e}")))?;
                info!("Created Kubernetes client");
                Ok::<_, Error>(client)
            })
            .await?;

        Ok(client.clone())
    }

    /// Run the future under a deadline, mapping expiry onto the error taxonomy.
    async fn bounded<T>(
        what: &str,
        limit: Duration,
        fut: impl Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        if limit.is_zero() {
            return fut.await;
        }
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                what: what.to_string(),
                timeout: limit,
            }),
        }
    }

    /// Run kubectl, returning combined output or a failure carrying it.
    async fn kubectl(&self, args: &[&str]) -> Result<String> {
        debug!("kubectl {}", args.join(" "));

        let mut command = Command::new("kubectl");
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(path) = &self.kubeconfig {
            command.env("KUBECONFIG", path);
        }

        let output = command
            .output()
            .await
            .map_err(|e| Error::RemoteFailure(format!("spawning kubectl: {e}")))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            error!("kubectl {} failed: {}", args.join(" "), combined.trim());
            Err(Error::RemoteFailure(format!(
                "kubectl {} failed: {}",
                args.join(" "),
                combined.trim()
            )))
        }
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client().await?);
        match api.get(name).await {
            Ok(ns) => Ok(Some(ns)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(Error::remote("get namespace", name, e)),
        }
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client().await?, namespace);
        match api.get(name).await {
            Ok(cm) => Ok(Some(cm)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(Error::remote("get configmap", name, e)),
        }
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client().await?, namespace);
        match api.get(name).await {
            Ok(secret) => Ok(Some(secret)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(Error::remote("get secret", name, e)),
        }
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client().await?, namespace);
        match api.get(name).await {
            Ok(app) => Ok(Some(app)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(Error::remote("get deployment", name, e)),
        }
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client().await?, namespace);
        let params = ListParams::default().labels(label_selector);
        let pods = api
            .list(&params)
            .await
            .map_err(|e| Error::remote("list pods", namespace, e))?;
        Ok(pods.items)
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>> {
        let api: Api<Ingress> = Api::namespaced(self.client().await?, namespace);
        match api.get(name).await {
            Ok(ingress) => Ok(Some(ingress)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(Error::remote("get ingress", name, e)),
        }
    }

    async fn apply_manifest(&self, manifest: &str) -> Result<()> {
        // The file is removed on every exit path when the handle drops.
        let mut file = NamedTempFile::new()
            .map_err(|e| Error::TemplateError(format!("creating manifest file: {e}")))?;
        file.write_all(manifest.as_bytes())
            .map_err(|e| Error::TemplateError(format!("writing manifest file: {e}")))?;
        file.flush()
            .map_err(|e| Error::TemplateError(format!("writing manifest file: {e}")))?;

        let path = file.path().to_string_lossy().into_owned();
        Self::bounded(
            "manifest apply",
            self.request_timeout,
            self.kubectl(&["apply", "-f", &path]),
        )
        .await?;

        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let grace = self.max_grace_period.as_secs().to_string();
        Self::bounded(
            &format!("deletion of namespace {name}"),
            self.deletion_timeout,
            self.kubectl(&["delete", "ns", name, "--grace-period", &grace]),
        )
        .await?;

        info!("Deleted namespace {name}");
        Ok(())
    }
}
