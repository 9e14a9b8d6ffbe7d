//! Codespace helper core library
//!
//! Provisions and tears down per-tenant codespaces on Kubernetes: the tenant
//! registry and status machine, manifest rendering and apply, the readiness
//! waiter, and the HTTP surface exposing it all behind an authenticating
//! reverse proxy.

pub mod config;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod pages;
pub mod registry;
pub mod server;
pub mod template;
pub mod wait;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use gateway::{ClusterGateway, KubeGateway};
pub use lifecycle::Lifecycle;
pub use registry::{TenantRegistry, TenantStatus};
pub use server::{build_router, AppState};
