//! Configuration management for linksync.
//!
//! Configuration is loaded from `<data-dir>/config.toml` when present.
//! Every key is optional; command-line flags override file values.
//!
//! ```toml
//! log_filter = "info"
//!
//! [auth]
//! idle_exit = "30s"
//! qr_format = "terminal"
//! download_media = false
//! max_media_downloads = 4
//!
//! [command]
//! timeout = "5m"
//!
//! [local]
//! scan_delay = "3s"
//! code_ttl = "20s"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::duration;

/// Config file name inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// How pairing codes are shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QrFormat {
    /// Unicode QR code on stderr.
    #[default]
    Terminal,
    /// Raw pairing string on stdout.
    Text,
}

/// Root configuration for the CLI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
    /// Tracing filter used when no log environment variable is set.
    #[serde(default)]
    pub log_filter: Option<String>,
    /// `auth` defaults.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Settings shared by all commands.
    #[serde(default)]
    pub command: CommandConfig,
    /// Local session behaviour.
    #[serde(default)]
    pub local: LocalConfig,
}

/// `auth` defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Idle window for bootstrap runs (default: 30s, `0` disables).
    #[serde(default = "default_idle_exit", deserialize_with = "duration::deserialize")]
    pub idle_exit: Duration,
    /// Pairing code output (default: terminal).
    #[serde(default)]
    pub qr_format: QrFormat,
    /// Download media in the background (default: false).
    #[serde(default)]
    pub download_media: bool,
    /// Concurrent media downloads (default: 4).
    #[serde(default = "default_max_media_downloads")]
    pub max_media_downloads: usize,
}

/// Settings shared by all commands.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    /// Timeout for `auth status` and `auth logout` (default: 5m, `0` disables).
    #[serde(default = "default_timeout", deserialize_with = "duration::deserialize")]
    pub timeout: Duration,
}

/// Local session behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    /// Delay before a shown pairing code counts as scanned (default: 3s).
    #[serde(default = "default_scan_delay", deserialize_with = "duration::deserialize")]
    pub scan_delay: Duration,
    /// Lifetime of one pairing code before a new one is issued (default: 20s).
    #[serde(default = "default_code_ttl", deserialize_with = "duration::deserialize")]
    pub code_ttl: Duration,
}

// Default value functions
fn default_idle_exit() -> Duration {
    sync_client::DEFAULT_IDLE_EXIT
}

fn default_max_media_downloads() -> usize {
    sync_client::DEFAULT_MAX_MEDIA_DOWNLOADS
}

fn default_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_scan_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_code_ttl() -> Duration {
    Duration::from_secs(20)
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            idle_exit: default_idle_exit(),
            qr_format: QrFormat::default(),
            download_media: false,
            max_media_downloads: default_max_media_downloads(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            scan_delay: default_scan_delay(),
            code_ttl: default_code_ttl(),
        }
    }
}

impl CliConfig {
    /// Load `config.toml` from the data directory, or defaults if absent.
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = CliConfig::load(dir.path()).unwrap();
        assert_eq!(config.auth.idle_exit, Duration::from_secs(30));
        assert_eq!(config.auth.qr_format, QrFormat::Terminal);
        assert_eq!(config.auth.max_media_downloads, 4);
        assert_eq!(config.command.timeout, Duration::from_secs(300));
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
log_filter = "debug"

[auth]
idle_exit = "1m30s"
qr_format = "text"
download_media = true

[local]
scan_delay = "50ms"
"#;

        let config: CliConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
        assert_eq!(config.auth.idle_exit, Duration::from_secs(90));
        assert_eq!(config.auth.qr_format, QrFormat::Text);
        assert!(config.auth.download_media);
        assert_eq!(config.auth.max_media_downloads, 4);
        assert_eq!(config.local.scan_delay, Duration::from_millis(50));
        assert_eq!(config.local.code_ttl, Duration::from_secs(20));
    }

    #[test]
    fn zero_disables_timeout() {
        let config: CliConfig = toml::from_str("[command]\ntimeout = \"0\"\n").unwrap();
        assert!(config.command.timeout.is_zero());
    }

    #[test]
    fn bad_duration_is_parse_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[auth]\nidle_exit = \"soon\"\n").unwrap();

        let err = CliConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn data_dir_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("test-data");
        tokio::fs::create_dir_all(&data_dir).await.unwrap();
        set_dir_permissions_0700(&data_dir).await.unwrap();

        let perms = tokio::fs::metadata(&data_dir).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o700, "dir should be 0700");
    }
}
