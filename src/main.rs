use anyhow::Result;
use gatekeeper::config::{load_config, GatewayConfig};
use gatekeeper::Gateway;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatekeeper=info".into()),
        )
        .init();

    info!("Gatekeeper starting...");

    let config = match std::env::var("GATEKEEPER_CONFIG") {
        Ok(path) => {
            let mut config = load_config(&path)?;
            config.apply_env_overrides(|name| std::env::var(name).ok());
            info!(path = %path, "Configuration loaded");
            config
        }
        Err(_) => {
            info!("GATEKEEPER_CONFIG not set, using defaults and environment");
            GatewayConfig::from_env()
        }
    };

    let gateway = Gateway::from_config(&config)?;
    info!(path = %config.database.path, "Database ready");

    if gateway.authenticator().is_enabled() {
        let keys = gateway.authenticator().warm().await;
        if keys == 0 {
            warn!("No signing keys available yet, tokens will be rejected until the key ring refreshes");
        } else {
            info!(keys, "Signing keys loaded");
        }
    }

    let configured = gateway.configured_integrations();
    if configured.is_empty() {
        warn!("No integrations configured");
    }
    for kind in configured {
        info!(integration = %kind, "Integration configured");
    }

    info!("Gatekeeper ready");
    Ok(())
}
