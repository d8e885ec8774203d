//! drm-proxy: DRM license request relay
//!
//! Usage: `drm-proxy [config.toml]`. Without a config file (argument or
//! `DRM_PROXY_CONFIG`) requests go unsigned to the Widevine test server.

use drm_proxy::config::CONFIG_PATH_ENV;
use drm_proxy::server::shutdown_signal;
use drm_proxy::{signer, GreetingServer, ProxyConfig, ProxyServer};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drm_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting drm-proxy v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .map(PathBuf::from);

    match config_path {
        Some(ref path) => info!("Loading configuration from {}", path.display()),
        None => info!("No config file specified, using the unsigned test license server"),
    }
    let config = ProxyConfig::load(config_path.as_deref())?;

    // Everything below must succeed before any listener binds
    signer::self_test()?;
    let server = ProxyServer::new(config.clone())?;
    let greeting = config.greeting.clone().map(GreetingServer::new).transpose()?;

    if let Some(greeting) = greeting {
        tokio::spawn(async move {
            if let Err(e) = greeting.run(shutdown_signal()).await {
                error!("Greeting server error: {}", e);
            }
        });
    }

    server.run(shutdown_signal()).await?;

    Ok(())
}
