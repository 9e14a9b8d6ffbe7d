//! Manifest template rendering.
//!
//! The manifest template is plain YAML with `$NAME` / `${NAME}` placeholders.
//! A fixed placeholder set is resolved from the tenant and the service
//! configuration; anything else falls back to the process environment, and an
//! unresolved placeholder is left in place verbatim rather than treated as an
//! error.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::gateway::ClusterGateway;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::json;
use std::path::Path;
use tracing::debug;

pub const APP_LABEL: &str = "app.kubernetes.io/name";

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
            .expect("placeholder pattern is valid");
}

/// Serialized per-tenant objects spliced into the manifest.
///
/// Each blob is a complete YAML document, or empty when the source object does
/// not exist in the platform namespace.
#[derive(Debug, Default, Clone)]
pub struct TenantBlobs {
    pub config_map: String,
    pub secret: String,
    pub ssh_key: String,
    pub ingress_tls: String,
}

/// Fetch the tenant's config and secrets from the shared platform namespace.
///
/// Absence of any object is not an error; the matching blob stays empty.
pub async fn fetch_tenant_blobs(
    gateway: &dyn ClusterGateway,
    config: &Config,
    tenant: &str,
) -> Result<TenantBlobs> {
    let ns = &config.platform_namespace;

    let config_map = match gateway.get_config_map(ns, tenant).await? {
        Some(cm) => config_map_yaml(tenant, &cm),
        None => {
            debug!("No configmap {ns}/{tenant} found");
            String::new()
        }
    };

    let secret = match gateway.get_secret(ns, tenant).await? {
        Some(s) => secret_yaml(tenant, tenant, "Opaque", &s),
        None => {
            debug!("No secret {ns}/{tenant} found");
            String::new()
        }
    };

    let ssh_key = match gateway.get_secret(ns, &config.ssh_secret).await? {
        Some(s) => secret_yaml(tenant, &config.ssh_secret, "Opaque", &s),
        None => {
            debug!("No secret {ns}/{} found", config.ssh_secret);
            String::new()
        }
    };

    let ingress_tls = match gateway.get_secret(ns, &config.tls_secret).await? {
        Some(s) => secret_yaml(tenant, &config.tls_secret, "kubernetes.io/tls", &s),
        None => {
            debug!("No secret {ns}/{} found", config.tls_secret);
            String::new()
        }
    };

    Ok(TenantBlobs {
        config_map,
        secret,
        ssh_key,
        ingress_tls,
    })
}

/// Read the manifest template from disk.
pub async fn load_template(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::TemplateError(format!("reading template {}: {e}", path.display())))
}

/// Substitute every placeholder in the template text.
#[must_use]
pub fn render(template: &str, tenant: &str, config: &Config, blobs: &TenantBlobs) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            resolve(name, tenant, config, blobs)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn resolve(name: &str, tenant: &str, config: &Config, blobs: &TenantBlobs) -> Option<String> {
    let value = match name {
        "ACCOUNT_NAMESPACE" => tenant.to_string(),
        "ACCOUNT_CONFIGMAP" => blobs.config_map.clone(),
        "ACCOUNT_SECRET" => blobs.secret.clone(),
        "ACCOUNT_SSH_KEY" => blobs.ssh_key.clone(),
        "INGRESS_SECRET_TLS" => blobs.ingress_tls.clone(),
        "CODESPACE_NAMESPACE" => config.platform_namespace.clone(),
        "CODESPACE_HOSTNAME" => config.hostname.clone(),
        "CODESPACE_PVC_SIZE" => config.volume_size.clone(),
        "CODESPACE_CPU_REQUEST" => config.min_cpus.clone(),
        "CODESPACE_CPU_MAX" => config.max_cpus.clone(),
        "CODESPACE_MEM_REQUEST" => config.min_memory.clone(),
        "CODESPACE_MEM_MAX" => config.max_memory.clone(),
        "CODESPACE_RUNNING_USER" => tenant.to_string(),
        "CODESPACE_USER_HOME" => format!("/home/{tenant}"),
        other => return std::env::var(other).ok(),
    };
    Some(value)
}

/// Re-home the platform configmap into the tenant namespace and serialize it.
fn config_map_yaml(tenant: &str, source: &ConfigMap) -> String {
    let value = json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": tenant,
            "namespace": tenant,
            "labels": { APP_LABEL: tenant },
        },
        "data": source.data,
        "binaryData": source.binary_data,
    });

    serde_yaml::to_string(&value).unwrap_or_default()
}

/// Re-home a platform secret into the tenant namespace and serialize it.
fn secret_yaml(tenant: &str, name: &str, type_: &str, source: &Secret) -> String {
    let value = json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "type": type_,
        "metadata": {
            "name": name,
            "namespace": tenant,
            "labels": { APP_LABEL: tenant },
        },
        "data": source.data,
    });

    serde_yaml::to_string(&value).unwrap_or_default()
}
