//! Service configuration.
//!
//! Every flag can also be set through the matching `CODESPACE_HELPER_*`
//! environment variable. The parsed value is immutable for the life of the
//! process and is passed by reference into the lifecycle controller.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_OBJECT_READY_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_DELETION_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_GRACE_PERIOD_SECS: u64 = 120;

/// Per-tenant codespace provisioner.
#[derive(Debug, Clone, Parser)]
#[command(name = "codespace-helper")]
#[command(about = "Creates and tears down per-tenant codespaces on Kubernetes")]
#[command(version)]
pub struct Config {
    /// Listen address
    #[arg(long, env = "CODESPACE_HELPER_LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: String,

    /// Redirect URL pattern; every `%s` is replaced with the tenant name
    #[arg(long, env = "CODESPACE_HELPER_REDIRECT_URL")]
    pub redirect_url: Option<String>,

    /// Sign-out URL offered after a codespace is deleted
    #[arg(
        long,
        env = "CODESPACE_HELPER_SIGNOUT_URL",
        default_value = "/oauth2/sign_out"
    )]
    pub signout_url: String,

    /// Kubeconfig file for the target cluster (default: in-cluster config)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Shared platform namespace holding per-tenant config and secrets
    #[arg(
        long,
        env = "CODESPACE_HELPER_NAMESPACE",
        default_value = "codespace-server"
    )]
    pub platform_namespace: String,

    /// Name of the workload (and its ingress) inside each tenant namespace
    #[arg(
        long,
        env = "CODESPACE_HELPER_APP_NAME",
        default_value = "codespace-server"
    )]
    pub app_name: String,

    /// Manifest template applied for each new tenant
    #[arg(
        long = "template-file",
        env = "CODESPACE_HELPER_TEMPLATE_FILE",
        default_value = "/codespace-helper/template.yaml"
    )]
    pub template_path: PathBuf,

    /// Directory with custom HTML page templates (default: embedded pages)
    #[arg(long, env = "CODESPACE_HELPER_PAGE_TEMPLATES")]
    pub page_templates: Option<PathBuf>,

    /// Ingress hostname of the codespace server
    #[arg(long, env = "CODESPACE_HELPER_HOSTNAME", default_value = "localhost")]
    pub hostname: String,

    /// TLS secret copied into each tenant namespace for the ingress
    #[arg(
        long,
        env = "CODESPACE_HELPER_INGRESS_SECRET_TLS",
        default_value = "codespace-server-ingress-tls"
    )]
    pub tls_secret: String,

    /// SSH key secret copied into each tenant namespace
    #[arg(
        long,
        env = "CODESPACE_HELPER_SSH_SECRET",
        default_value = "codespace-server-ssh-key"
    )]
    pub ssh_secret: String,

    /// Cookie domain candidates, most specific first; repeatable
    #[arg(long = "cookie-domain", env = "CODESPACE_HELPER_COOKIE_DOMAINS", value_delimiter = ',')]
    pub cookie_domains: Vec<String>,

    /// Limits: persistent volume size
    #[arg(long, env = "CODESPACE_HELPER_VOLUME_SIZE", default_value = "10G")]
    pub volume_size: String,

    /// Limits: minimum cpu
    #[arg(long, env = "CODESPACE_HELPER_MIN_CPUS", default_value = "500m")]
    pub min_cpus: String,

    /// Limits: maximum cpu
    #[arg(long, env = "CODESPACE_HELPER_MAX_CPUS", default_value = "4")]
    pub max_cpus: String,

    /// Limits: minimum memory
    #[arg(long, env = "CODESPACE_HELPER_MIN_MEMORY", default_value = "512Mi")]
    pub min_memory: String,

    /// Limits: maximum memory
    #[arg(long, env = "CODESPACE_HELPER_MAX_MEMORY", default_value = "8G")]
    pub max_memory: String,

    /// Request timeout in seconds for cluster API calls; 0 means no timeout
    #[arg(
        long = "request-timeout",
        env = "CODESPACE_HELPER_REQUEST_TIMEOUT",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS
    )]
    pub request_timeout_secs: u64,

    /// Per-stage readiness timeout in seconds; 0 means wait forever
    #[arg(
        long = "object-ready-timeout",
        env = "CODESPACE_HELPER_OBJECT_READY_TIMEOUT",
        default_value_t = DEFAULT_OBJECT_READY_TIMEOUT_SECS
    )]
    pub object_ready_timeout_secs: u64,

    /// Namespace deletion timeout in seconds
    #[arg(
        long = "deletion-timeout",
        env = "CODESPACE_HELPER_DELETION_TIMEOUT",
        default_value_t = DEFAULT_DELETION_TIMEOUT_SECS
    )]
    pub deletion_timeout_secs: u64,

    /// Maximum time evicted pods are given to terminate gracefully, in seconds
    #[arg(
        long = "max-grace-period",
        env = "CODESPACE_HELPER_MAX_GRACE_PERIOD",
        default_value_t = DEFAULT_MAX_GRACE_PERIOD_SECS
    )]
    pub max_grace_period_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CODESPACE_HELPER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text or json)
    #[arg(long, env = "CODESPACE_HELPER_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Config {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn object_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.object_ready_timeout_secs)
    }

    #[must_use]
    pub fn deletion_timeout(&self) -> Duration {
        Duration::from_secs(self.deletion_timeout_secs)
    }

    #[must_use]
    pub fn max_grace_period(&self) -> Duration {
        Duration::from_secs(self.max_grace_period_secs)
    }

    /// Workspace URL a tenant is redirected to after a successful create.
    ///
    /// When no pattern is configured the caller's own host is reused with the
    /// tenant's path appended.
    #[must_use]
    pub fn workspace_url(&self, tenant: &str, scheme: &str, host: &str) -> String {
        match &self.redirect_url {
            Some(pattern) if !pattern.is_empty() => pattern.replace("%s", tenant),
            _ => format!("{scheme}://{host}/{tenant}?folder=/workspace"),
        }
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self::parse_from(["codespace-helper"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_flag_documentation() {
        let cfg = Config::default();
        assert_eq!(cfg.listen, "0.0.0.0:8000");
        assert_eq!(cfg.platform_namespace, "codespace-server");
        assert_eq!(cfg.request_timeout(), Duration::from_secs(120));
        assert_eq!(cfg.object_ready_timeout(), Duration::from_secs(300));
        assert!(cfg.cookie_domains.is_empty());
    }

    #[test]
    fn test_workspace_url_substitutes_every_token() {
        let mut cfg = Config::default();
        cfg.redirect_url = Some("https://%s.codespaces.example.com/%s".into());
        assert_eq!(
            cfg.workspace_url("alice", "https", "ignored"),
            "https://alice.codespaces.example.com/alice"
        );
    }

    #[test]
    fn test_workspace_url_falls_back_to_request_host() {
        let cfg = Config::default();
        assert_eq!(
            cfg.workspace_url("alice", "https", "codespaces.example.com"),
            "https://codespaces.example.com/alice?folder=/workspace"
        );
    }
}
