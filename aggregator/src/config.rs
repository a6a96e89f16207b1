//! Aggregator configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `LUMEN_AGGREGATOR_*` environment variables
//! (`LUMEN_AGGREGATOR_LISTEN_ADDR`, `LUMEN_AGGREGATOR_MAX_BODY_BYTES`).

use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8001";

/// 16 MiB
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Listen address for the HTTP server
    pub listen_addr: String,

    /// Largest accepted kernel trace batch, in bytes
    pub max_body_bytes: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl AggregatorConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("listen_addr", DEFAULT_LISTEN_ADDR)?
            .set_default("max_body_bytes", DEFAULT_MAX_BODY_BYTES as i64)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(Environment::with_prefix("LUMEN_AGGREGATOR").try_parsing(true))
            .build()
            .context("Failed to read aggregator configuration")?
            .try_deserialize()
            .context("Invalid aggregator configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        ensure!(self.max_body_bytes > 0, "max_body_bytes must be greater than 0");
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address {:?}", self.listen_addr))
    }
}
