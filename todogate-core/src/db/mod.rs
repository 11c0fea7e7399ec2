use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
};
use todogate_common::{TodoConfig, TodoError};
use todogate_db_entities::ApiToken;
use todogate_db_migrations::migrate_database;
use tracing::*;

fn is_in_memory_sqlite(url: &url::Url) -> bool {
    url.path() == ":memory:" || url.query_pairs().any(|(k, v)| k == "mode" && v == "memory")
}

pub async fn connect_to_db(config: &TodoConfig) -> Result<DatabaseConnection> {
    let mut url = url::Url::parse(&config.store.database_url.expose_secret()[..])?;

    if url.scheme() == "sqlite" && is_in_memory_sqlite(&url) {
        // Every pooled connection would get its own empty database
        let mut opt = ConnectOptions::new(url.to_string());
        opt.max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);
        let connection = Database::connect(opt).await?;
        migrate_database(&connection).await?;
        return Ok(connection);
    }

    if url.scheme() == "sqlite" {
        let path = url.path();
        let mut abs_path = config.paths_relative_to.clone();
        abs_path.push(path);
        abs_path.push("db.sqlite3");

        if let Some(parent) = abs_path.parent() {
            std::fs::create_dir_all(parent)?
        }

        url.set_path(
            abs_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Failed to convert database path to string"))?,
        );

        url.set_query(Some("mode=rwc"));

        let db = Database::connect(ConnectOptions::new(url.to_string())).await?;
        db.begin().await?.commit().await?;
        drop(db);
    }

    let mut opt = ConnectOptions::new(url.to_string());
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(true);

    let connection = Database::connect(opt).await?;

    migrate_database(&connection).await?;
    Ok(connection)
}

/// Deletes API tokens past their expiry
pub async fn cleanup_db(db: &DatabaseConnection) -> Result<(), TodoError> {
    let result = ApiToken::Entity::delete_many()
        .filter(ApiToken::Column::Expiry.lt(Utc::now()))
        .exec(db)
        .await?;
    if result.rows_affected > 0 {
        debug!(count = result.rows_affected, "Removed expired API tokens");
    }
    Ok(())
}
