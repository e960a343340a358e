use std::sync::Arc;

use canopy_auth::{RemoteJwks, TokenVerifier};
use canopy_infra::{AppConfig, EntityStore, InMemoryEntityStore, PostgresEntityStore, StoreError};

/// Store handle shared by every handler.
pub type SharedStore = Arc<dyn EntityStore>;

#[derive(Clone)]
pub struct AppServices {
    pub store: SharedStore,
    pub verifier: TokenVerifier,
}

impl AppServices {
    pub fn new(store: SharedStore, verifier: TokenVerifier) -> Self {
        Self { store, verifier }
    }
}

/// Wire the store and token verifier described by `config`.
///
/// Without `DATABASE_URL` the service runs on the in-memory store, which loses
/// everything on restart.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    let store: SharedStore = match &config.database_url {
        Some(url) => {
            let store = PostgresEntityStore::connect(url, config.database_max_connections).await?;
            store.ensure_schema().await?;
            tracing::info!("using postgres entity store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory entity store");
            Arc::new(InMemoryEntityStore::new())
        }
    };

    let keys = RemoteJwks::for_issuer(&config.auth_issuer).with_ttl(config.jwks_cache_ttl);
    tracing::info!(jwks_url = keys.url(), "token keys will be fetched from issuer");

    let verifier = TokenVerifier::new(
        config.auth_issuer.clone(),
        config.api_audience.clone(),
        Arc::new(keys),
    )
    .with_leeway(config.auth_leeway_secs);

    Ok(AppServices::new(store, verifier))
}
