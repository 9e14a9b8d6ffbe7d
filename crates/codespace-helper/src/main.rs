use anyhow::Context as _;
use clap::Parser;
use codespace_helper::pages::PageWriter;
use codespace_helper::{build_router, AppState, Config, KubeGateway, Lifecycle, TenantRegistry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.log_format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::parse());
    init_tracing(&config);

    info!(
        "Starting codespace-helper (namespace {}, app {})",
        config.platform_namespace, config.app_name
    );

    let gateway = Arc::new(KubeGateway::new(&config));
    let registry = Arc::new(TenantRegistry::new());
    let pages = PageWriter::new(config.page_templates.as_deref(), env!("CARGO_PKG_VERSION"))
        .context("initialising page writer")?;

    let state = Arc::new(AppState {
        config: config.clone(),
        lifecycle: Lifecycle::new(config.clone(), gateway, registry),
        pages,
    });

    let app = build_router(state);

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!("Listening on {}", config.listen);

    axum::serve(listener, app).await.context("serving HTTP")?;

    Ok(())
}
