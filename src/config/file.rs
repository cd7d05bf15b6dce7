//! TOML configuration file loading
//!
//! Supports `~/.config/trusted-proxy/config.toml` as a persistent config source.
//! All fields are optional, the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Device group name prefix marking a trust group
    #[serde(default)]
    pub trust_group_prefix: Option<String>,

    /// Path the worker is mounted on (e.g. "/shared/TrustedProxy")
    #[serde(default)]
    pub worker_path: Option<String>,

    /// Local registry connection
    #[serde(default)]
    pub registry: RegistryFileConfig,

    /// Listener configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Proxied request forwarding
    #[serde(default)]
    pub router: RouterFileConfig,
}

/// Registry connection configuration
#[derive(Debug, Default, Deserialize)]
pub struct RegistryFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,

    /// Per-call timeout in seconds; unset means wait indefinitely
    pub request_timeout_secs: Option<u64>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Bind address
    pub host: Option<String>,

    /// Listen port
    pub port: Option<u16>,
}

/// Forwarding configuration for proxied requests
#[derive(Debug, Default, Deserialize)]
pub struct RouterFileConfig {
    /// Scheme used to reach trusted devices ("https" or "http")
    pub device_scheme: Option<String>,

    /// Header carrying the trust token on forwarded requests
    pub token_header: Option<String>,

    /// Accept self-signed device certificates
    pub accept_invalid_certs: Option<bool>,
}

/// Load the config file
///
/// An explicit `path` must exist and parse. Without one, the default location is
/// tried and `ConfigFile::default()` is returned if it is missing or unreadable.
///
/// # Errors
///
/// Returns error if an explicitly requested file cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<ConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(ConfigFile::default());
    };

    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let config = match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    };

    Ok(config)
}

/// Return the config file path: `~/.config/trusted-proxy/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir().join("trusted-proxy").join("config.toml")
    })
}
