use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use todogate_common::{TodoConfig, TodoConfigStore};
use tracing::*;

pub fn load_config(path: &Path) -> Result<TodoConfig> {
    let store: TodoConfigStore = Config::builder()
        .add_source(File::from(path))
        .add_source(
            Environment::with_prefix("TODOGATE")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .context("Could not load config")?
        .try_deserialize()
        .context("Could not parse config")?;

    let config = TodoConfig {
        store,
        paths_relative_to: path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };

    config.validate().context("Invalid config")?;

    let read = &config.store.rate_limiting.read;
    let write = &config.store.rate_limiting.write;
    info!(
        "Using config: {path:?} (read limit: {}/{:?}, write limit: {}/{:?})",
        read.token_limit, read.replenishment_period, write.token_limit, write.replenishment_period,
    );
    Ok(config)
}
