//! Configuration loading for Streaman.
//!
//! Both the recorder core and the HTTP service read their settings from
//! [`StreamConfig`]. Values are layered so that a packaged default can be
//! overridden per user and per checkout without editing the base file.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/streaman/config.toml` (system)
//! 2. `~/.config/streaman/config.toml` (user)
//! 3. `./streaman.toml` (local override) or the `--config` path
//! 4. Environment variables (`STREAMAN_*`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! data_dir = "~/recordings"
//!
//! [bind]
//! listen = "127.0.0.1:3000"
//! prefix = "/streaman"
//!
//! [telemetry]
//! log_level = "debug"
//!
//! [capture]
//! quality = "720p60"
//! transcode_crf = 26
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};
pub use sections::{BindConfig, CaptureConfig, PathsConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Complete Streaman configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StreamConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub capture: CaptureConfig,
}

impl StreamConfig {
    /// Load configuration and report which files and variables contributed.
    ///
    /// `config_path` replaces `./streaman.toml`; system and user configs
    /// still load first.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::read_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let origin = sources
            .files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let mut config = loader::from_table(merged, &origin)?;

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize the effective config to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let body = toml::to_string_pretty(self)?;
        Ok(format!("# Streaman Configuration\n\n{}", body))
    }
}
