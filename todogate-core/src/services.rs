use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sea_orm::DatabaseConnection;
use todogate_common::TodoConfig;
use tokio::sync::Mutex;
use tracing::*;

use crate::db::{cleanup_db, connect_to_db};
use crate::rate_limiting::RateLimiterRegistry;
use crate::{DatabaseUserProvider, UserProviderEnum};

#[derive(Clone)]
pub struct Services {
    pub db: Arc<Mutex<DatabaseConnection>>,
    pub config: Arc<Mutex<TodoConfig>>,
    pub user_provider: Arc<Mutex<UserProviderEnum>>,
    pub rate_limiter_registry: Arc<RateLimiterRegistry>,
}

impl Services {
    pub async fn new(config: TodoConfig) -> Result<Self> {
        config.validate()?;
        let rate_limiter_registry =
            Arc::new(RateLimiterRegistry::new(config.store.rate_limiting.clone())?);

        let db = connect_to_db(&config).await?;
        let db = Arc::new(Mutex::new(db));

        let config = Arc::new(Mutex::new(config));

        let user_provider = Arc::new(Mutex::new(DatabaseUserProvider::new(&db).into()));

        tokio::spawn({
            let db = db.clone();
            async move {
                loop {
                    if let Err(error) = cleanup_db(&*db.lock().await).await {
                        warn!(%error, "Database cleanup failed");
                    }
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            }
        });

        Ok(Self {
            db,
            config,
            user_provider,
            rate_limiter_registry,
        })
    }
}
