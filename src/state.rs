use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::Store;
use crate::services::{
    Argon2Scheme, AuthService, CredentialVerifier, SeaOrmAuthService, SeaOrmUserService,
    UserService,
};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub clock: Arc<dyn Clock>,

    pub auth_service: Arc<dyn AuthService>,

    pub user_service: Arc<dyn UserService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(config: Config, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        Self::from_store(config, store, clock).await
    }

    pub async fn from_store(
        config: Config,
        store: Store,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let security = config.security.clone();
        let scheme = tokio::task::spawn_blocking(move || Argon2Scheme::new(&security)).await??;
        let verifier = CredentialVerifier::new(Arc::new(scheme));

        let config = Arc::new(config);

        let auth_service = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            config.clone(),
            clock.clone(),
            verifier.clone(),
        )) as Arc<dyn AuthService>;

        let user_service = Arc::new(SeaOrmUserService::new(
            store.clone(),
            config.clone(),
            clock.clone(),
            verifier,
        )) as Arc<dyn UserService>;

        Ok(Self {
            config,
            store,
            clock,
            auth_service,
            user_service,
        })
    }
}
