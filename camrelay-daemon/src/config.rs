//! Configuration management

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::policy::ReconnectPolicy;
use crate::quality::{default_profiles, VideoProfile};

/// IPC control socket
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Override for the socket path (default: platform socket dir)
    pub socket_path: Option<PathBuf>,
}

/// SRT input the camera publishes to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub host: String,
    pub port: u16,
    pub stream_id: String,
    pub passphrase: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9999,
            stream_id: "camera".to_string(),
            passphrase: None,
        }
    }
}

impl IngestConfig {
    /// `srt://host:port`, safe to show anywhere
    pub fn endpoint(&self) -> String {
        format!("srt://{}:{}", self.host, self.port)
    }

    /// Full input URL handed to the transcoder
    pub fn input_url(&self) -> String {
        let mut url = format!("{}?streamid={}", self.endpoint(), self.stream_id);
        if let Some(pass) = self.passphrase.as_deref().filter(|p| !p.is_empty()) {
            url.push_str("&passphrase=");
            url.push_str(pass);
        }
        url
    }
}

/// RTMP(S) ingest endpoint the relay pushes to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EgressConfig {
    pub ingest_url: String,
    pub stream_key: Option<String>,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            ingest_url: "rtmps://live-api-s.facebook.com:443/rtmp/".to_string(),
            stream_key: None,
        }
    }
}

impl EgressConfig {
    pub fn stream_key(&self) -> Option<&str> {
        self.stream_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

/// Transcoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    pub ffmpeg_path: String,

    /// Profile name from `profiles`
    pub quality: String,

    pub preset: String,
    pub profile: String,
    pub level: String,
    pub threads: u32,

    pub audio_bitrate_kbps: u32,
    pub audio_sample_rate: u32,
    pub audio_channels: u32,

    /// Seconds to wait after SIGTERM before killing the transcoder
    pub stop_grace_secs: u64,

    pub profiles: BTreeMap<String, VideoProfile>,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            quality: "standard".to_string(),
            preset: "veryfast".to_string(),
            profile: "main".to_string(),
            level: "3.1".to_string(),
            threads: 2,
            audio_bitrate_kbps: 128,
            audio_sample_rate: 44100,
            audio_channels: 2,
            stop_grace_secs: 10,
            profiles: default_profiles(),
        }
    }
}

/// Telemetry push socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub socket_path: Option<PathBuf>,
    pub heartbeat_secs: u64,
    pub status_log_secs: u64,
    /// Minimum spacing between progress log lines (publication is unthrottled)
    pub progress_log_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            socket_path: None,
            heartbeat_secs: 10,
            status_log_secs: 300,
            progress_log_secs: 60,
        }
    }
}

/// Alerting and self-checks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub sample_secs: u64,
    pub max_dropped_frames: u64,
    pub min_bitrate_kbps: f64,
    pub memory_check_secs: u64,
    pub memory_warn_mb: u64,
    pub write_report: bool,
    pub report_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_secs: 10,
            max_dropped_frames: 100,
            min_bitrate_kbps: 1000.0,
            memory_check_secs: 60,
            memory_warn_mb: 400,
            write_report: true,
            report_path: None,
        }
    }
}

/// Relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    pub ipc: IpcConfig,
    pub ingest: IngestConfig,
    pub egress: EgressConfig,
    pub encode: EncodeConfig,
    pub reconnect: ReconnectPolicy,
    pub telemetry: TelemetryConfig,
    pub monitor: MonitorConfig,
}

impl RelayConfig {
    /// Load configuration from `path` (or the default location), creating a
    /// default file if none exists, then apply `RELAY_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => camrelay_paths::get_config_file_path()?,
        };

        let mut config = if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;

            let mut config: RelayConfig =
                toml::from_str(&contents).context("Failed to parse config file")?;

            config.config_path = config_path;
            config
        } else {
            let config = Self {
                config_path,
                ..Self::default()
            };
            config.save().context("Failed to save default config")?;
            config
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("RELAY_STREAM_KEY") {
            self.egress.stream_key = Some(key);
        }
        if let Some(url) = lookup("RELAY_INGEST_URL") {
            self.egress.ingest_url = url;
        }
        if let Some(id) = lookup("RELAY_STREAM_ID") {
            self.ingest.stream_id = id;
        }
        if let Some(pass) = lookup("RELAY_STREAM_PASSPHRASE") {
            self.ingest.passphrase = Some(pass);
        }
        if let Some(host) = lookup("RELAY_SRT_HOST") {
            self.ingest.host = host;
        }
        if let Some(port) = lookup("RELAY_SRT_PORT") {
            self.ingest.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid RELAY_SRT_PORT: {}", port))?;
        }
        if let Some(ffmpeg) = lookup("RELAY_FFMPEG") {
            self.encode.ffmpeg_path = ffmpeg;
        }
        Ok(())
    }

    pub fn ipc_socket_path(&self) -> Result<PathBuf> {
        match &self.ipc.socket_path {
            Some(p) => Ok(p.clone()),
            None => camrelay_paths::get_ipc_socket_path(),
        }
    }

    pub fn telemetry_socket_path(&self) -> Result<PathBuf> {
        match &self.telemetry.socket_path {
            Some(p) => Ok(p.clone()),
            None => camrelay_paths::get_telemetry_socket_path(),
        }
    }

    pub fn report_path(&self) -> Result<PathBuf> {
        match &self.monitor.report_path {
            Some(p) => Ok(p.clone()),
            None => camrelay_paths::get_report_path(),
        }
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.telemetry.heartbeat_secs.max(1))
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.sample_secs.max(1))
    }

    pub fn status_log_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry.status_log_secs.max(1))
    }

    pub fn memory_check_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.memory_check_secs.max(1))
    }
}
