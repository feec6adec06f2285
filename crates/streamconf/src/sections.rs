//! Typed configuration sections.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory that receives finished and in-progress captures.
    /// Also served read-only under `/files/`.
    /// Default: ./data
    #[serde(default = "PathsConfig::default_data_dir")]
    pub data_dir: PathBuf,
}

impl PathsConfig {
    fn default_data_dir() -> PathBuf {
        PathBuf::from("data")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindConfig {
    /// Socket address for the HTTP server.
    /// Default: 0.0.0.0:3000
    #[serde(default = "BindConfig::default_listen")]
    pub listen: String,

    /// Path prefix every route is mounted under, e.g. `/streaman`.
    /// Default: empty (mounted at the root)
    #[serde(default)]
    pub prefix: String,
}

impl BindConfig {
    fn default_listen() -> String {
        "0.0.0.0:3000".to_string()
    }

    /// Listen address with a bare `:port` widened to all interfaces.
    pub fn listen_addr(&self) -> String {
        let listen = self.listen.trim();
        if listen.starts_with(':') {
            format!("0.0.0.0{}", listen)
        } else {
            listen.to_string()
        }
    }

    /// Prefix normalised to either `""` or `/segment[/segment...]` without
    /// a trailing slash.
    pub fn normalized_prefix(&self) -> String {
        let trimmed = self.prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            listen: Self::default_listen(),
            prefix: String::new(),
        }
    }
}

/// Logging and tracing export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter directive (trace, debug, info, warn, error or a full
    /// `EnvFilter` expression).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,

    /// OTLP gRPC endpoint. Export is disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            otlp_endpoint: None,
        }
    }
}

/// How capture pipelines are built and supervised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Shell used to run the streamlink | ffmpeg pipeline.
    /// Default: /bin/bash
    #[serde(default = "CaptureConfig::default_shell")]
    pub shell: PathBuf,

    /// Upstream stream URL. `{channel}` is replaced with the channel name.
    /// Default: https://twitch.tv/{channel}
    #[serde(default = "CaptureConfig::default_stream_url")]
    pub stream_url: String,

    /// Stream quality requested from streamlink.
    /// Default: best
    #[serde(default = "CaptureConfig::default_quality")]
    pub quality: String,

    /// Leading stretch of the stream that ffmpeg discards (`-ss`).
    /// Default: 00:00:20.0
    #[serde(default = "CaptureConfig::default_skip")]
    pub skip: String,

    /// Video codec used when transcoding.
    /// Default: libx265
    #[serde(default = "CaptureConfig::default_transcode_codec")]
    pub transcode_codec: String,

    /// Constant rate factor used when transcoding.
    /// Default: 28
    #[serde(default = "CaptureConfig::default_transcode_crf")]
    pub transcode_crf: u32,

    /// Whether callers may request transcoding at all.
    /// Default: true
    #[serde(default = "CaptureConfig::default_true")]
    pub allow_transcode: bool,

    /// Interrupt running captures when the service shuts down.
    /// Default: true
    #[serde(default = "CaptureConfig::default_true")]
    pub stop_on_shutdown: bool,
}

impl CaptureConfig {
    fn default_shell() -> PathBuf {
        PathBuf::from("/bin/bash")
    }

    fn default_stream_url() -> String {
        "https://twitch.tv/{channel}".to_string()
    }

    fn default_quality() -> String {
        "best".to_string()
    }

    fn default_skip() -> String {
        "00:00:20.0".to_string()
    }

    fn default_transcode_codec() -> String {
        "libx265".to_string()
    }

    fn default_transcode_crf() -> u32 {
        28
    }

    fn default_true() -> bool {
        true
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            shell: Self::default_shell(),
            stream_url: Self::default_stream_url(),
            quality: Self::default_quality(),
            skip: Self::default_skip(),
            transcode_codec: Self::default_transcode_codec(),
            transcode_crf: Self::default_transcode_crf(),
            allow_transcode: true,
            stop_on_shutdown: true,
        }
    }
}
