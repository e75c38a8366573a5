//! Server configuration

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

/// Listener and log sink settings
///
/// # Environment Variables
/// - `PORT`: Listening port (default: 4000)
/// - `LOG_DIR`: Directory holding the four classified log files (default: `logs`)
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub log_dir: String,
}

impl ServerConfig {
    pub fn load() -> Result<Self> {
        Config::builder()
            .set_default("port", 4000)?
            .set_default("log_dir", "logs")?
            .add_source(Environment::default().try_parsing(true))
            .build()
            .context("Failed to read server configuration")?
            .try_deserialize()
            .context("Invalid server configuration")
    }
}
