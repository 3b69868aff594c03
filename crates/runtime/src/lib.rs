use std::sync::Arc;

use anyhow::{Context, Result};
use portal_auth::Authenticator;
use portal_backend::BackendClient;
use portal_config::AppConfig;
use portal_session::{FileStorage, Language, SessionStore};
use tracing::{info, warn};

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    /// Installs the fmt subscriber. Output goes to stderr so command output
    /// on stdout stays clean.
    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::INFO)
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

#[derive(Clone)]
pub struct PortalServices {
    pub backend: BackendClient,
    pub store: Arc<SessionStore>,
    pub authenticator: Authenticator,
}

impl PortalServices {
    pub fn initialise(config: &AppConfig) -> Result<Self> {
        let default_language = config
            .ui
            .default_language
            .parse::<Language>()
            .unwrap_or_else(|error| {
                warn!(%error, "falling back to english");
                Language::English
            });

        let storage = Arc::new(FileStorage::new(&config.storage.path));
        let store = Arc::new(
            SessionStore::open(storage, default_language)
                .with_context(|| format!("failed to open session store at {}", config.storage.path))?,
        );

        let backend =
            BackendClient::new(&config.backend).context("failed to build backend client")?;
        let authenticator = Authenticator::new(backend.clone(), store.clone(), &config.auth);

        info!(
            backend = %backend.base_url(),
            storage = %config.storage.path,
            language = %store.language(),
            "portal services ready"
        );

        Ok(Self {
            backend,
            store,
            authenticator,
        })
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
