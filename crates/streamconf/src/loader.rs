//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, StreamConfig};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli). Only existing
/// files are returned.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/streaman/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("streaman/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("streaman.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a config file as a raw TOML table.
pub fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    contents
        .parse::<toml::Table>()
        .map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Merge `overlay` into `base`. Nested tables merge key by key; any other
/// value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

/// Turn a merged table into a typed config, filling gaps with defaults.
pub fn from_table(table: toml::Table, origin: &Path) -> Result<StreamConfig, ConfigError> {
    let mut config = StreamConfig::deserialize(toml::Value::Table(table)).map_err(
        |e: toml::de::Error| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        },
    )?;

    config.paths.data_dir = expand_path(&config.paths.data_dir.to_string_lossy());
    config.capture.shell = expand_path(&config.capture.shell.to_string_lossy());

    Ok(config)
}

/// Apply `STREAMAN_*` environment variable overrides to config.
pub fn apply_env_overrides(config: &mut StreamConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply overrides using `lookup` in place of the process environment.
pub fn apply_overrides_from<F>(config: &mut StreamConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("STREAMAN_DATA_DIR") {
        config.paths.data_dir = expand_path(&v);
        sources.env_overrides.push("STREAMAN_DATA_DIR".to_string());
    }

    if let Some(v) = lookup("STREAMAN_LISTEN") {
        config.bind.listen = v;
        sources.env_overrides.push("STREAMAN_LISTEN".to_string());
    }
    if let Some(v) = lookup("STREAMAN_PREFIX") {
        config.bind.prefix = v;
        sources.env_overrides.push("STREAMAN_PREFIX".to_string());
    }

    if let Some(v) = lookup("STREAMAN_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("STREAMAN_LOG_LEVEL".to_string());
    }
    // RUST_LOG wins over STREAMAN_LOG_LEVEL
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    if let Some(v) = lookup("STREAMAN_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = Some(v);
        sources.env_overrides.push("STREAMAN_OTLP_ENDPOINT".to_string());
    }
    if let Some(v) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = Some(v);
        sources.env_overrides.push("OTEL_EXPORTER_OTLP_ENDPOINT".to_string());
    }

    if let Some(v) = lookup("STREAMAN_NO_ENCODE") {
        if is_truthy(&v) {
            config.capture.allow_transcode = false;
        }
        sources.env_overrides.push("STREAMAN_NO_ENCODE".to_string());
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Expand `~/` and `$VAR/` prefixes in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        match directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            Some(home) => home.join(stripped),
            None => PathBuf::from(path),
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            match env::var(var_name) {
                Ok(var_value) => PathBuf::from(var_value).join(&stripped[slash_pos + 1..]),
                Err(_) => PathBuf::from(path),
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}
