use std::path::Path;

use tracing::{info, warn};

use crate::error::AppError;

pub fn load_environment() -> anyhow::Result<()> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> anyhow::Result<()> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

#[derive(Debug)]
pub struct AppConfig {
    /// Primary record store (score rows).
    pub database_url: String,
    /// Secondary analytics store (computed averages). Required: its
    /// absence is fatal before any store access is attempted.
    pub analytics_database_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = require_var("DATABASE_URL")?;
        let analytics_database_url = require_var("ANALYTICS_DATABASE_URL")?;

        Ok(Self {
            database_url,
            analytics_database_url,
        })
    }
}

fn require_var(key: &str) -> Result<String, AppError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Configuration(format!("{} must be set", key))),
    }
}
