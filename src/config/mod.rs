//! Configuration management for the trusted proxy
//!
//! Sources, lowest precedence first: built-in defaults, the TOML file,
//! `TRUSTED_PROXY_*` environment variables. CLI flags are applied on top in `main`.

pub mod file;

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;

use crate::{Error, Result};

use file::ConfigFile;

/// Registry host used when nothing else is configured
pub const DEFAULT_REGISTRY_HOST: &str = "localhost";

/// Registry port used when nothing else is configured
pub const DEFAULT_REGISTRY_PORT: u16 = 8100;

/// Device group name prefix marking a trust group
pub const DEFAULT_TRUST_GROUP_PREFIX: &str = "TrustProxy";

/// Path the worker answers on
pub const DEFAULT_WORKER_PATH: &str = "/shared/TrustedProxy";

/// Header carrying the trust token on forwarded requests
pub const DEFAULT_TOKEN_HEADER: &str = "X-F5-Auth-Token";

/// Trusted proxy configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Local registry connection
    pub registry: RegistryConfig,

    /// Device groups whose name starts with this are trust groups
    pub trust_group_prefix: String,

    /// Path the worker is mounted on, always with a leading slash
    pub worker_path: String,

    /// HTTP listener
    pub server: ServerConfig,

    /// Forwarding of proxied requests to devices
    pub router: RouterConfig,
}

/// Local registry connection settings
///
/// Read-only after load; shared by every registry call.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,

    /// Per-call timeout; `None` waits indefinitely
    pub request_timeout: Option<Duration>,
}

impl RegistryConfig {
    /// Base URL for registry calls, e.g. `http://localhost:8100`
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_REGISTRY_HOST.to_string(),
            port: DEFAULT_REGISTRY_PORT,
            username: "admin".to_string(),
            password: SecretString::from(String::new()),
            request_timeout: None,
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8105,
        }
    }
}

/// Forwarding configuration for proxied requests
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Scheme used to reach trusted devices
    pub device_scheme: String,

    /// Header carrying the trust token
    pub token_header: String,

    /// Accept self-signed device certificates
    pub accept_invalid_certs: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            device_scheme: "https".to_string(),
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
            accept_invalid_certs: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            trust_group_prefix: DEFAULT_TRUST_GROUP_PREFIX.to_string(),
            worker_path: DEFAULT_WORKER_PATH.to_string(),
            server: ServerConfig::default(),
            router: RouterConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the config file and process environment
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file cannot be loaded or a value is invalid
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path)?;
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a numeric variable does not parse or the result is invalid
    pub fn from_sources(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let registry = RegistryConfig {
            host: env("TRUSTED_PROXY_REGISTRY_HOST")
                .or(fc.registry.host)
                .unwrap_or(defaults.registry.host),
            port: parse_env(&env, "TRUSTED_PROXY_REGISTRY_PORT")?
                .or(fc.registry.port)
                .unwrap_or(defaults.registry.port),
            username: env("TRUSTED_PROXY_REGISTRY_USER")
                .or(fc.registry.username)
                .unwrap_or(defaults.registry.username),
            password: env("TRUSTED_PROXY_REGISTRY_PASSWORD")
                .or(fc.registry.password)
                .map_or(defaults.registry.password, SecretString::from),
            request_timeout: parse_env(&env, "TRUSTED_PROXY_REGISTRY_TIMEOUT_SECS")?
                .or(fc.registry.request_timeout_secs)
                .map(Duration::from_secs),
        };

        let server = ServerConfig {
            host: env("TRUSTED_PROXY_HOST")
                .or(fc.server.host)
                .unwrap_or(defaults.server.host),
            port: parse_env(&env, "TRUSTED_PROXY_PORT")?
                .or(fc.server.port)
                .unwrap_or(defaults.server.port),
        };

        let router = RouterConfig {
            device_scheme: env("TRUSTED_PROXY_DEVICE_SCHEME")
                .or(fc.router.device_scheme)
                .unwrap_or(defaults.router.device_scheme),
            token_header: env("TRUSTED_PROXY_TOKEN_HEADER")
                .or(fc.router.token_header)
                .unwrap_or(defaults.router.token_header),
            accept_invalid_certs: env("TRUSTED_PROXY_ACCEPT_INVALID_CERTS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(fc.router.accept_invalid_certs)
                .unwrap_or(defaults.router.accept_invalid_certs),
        };

        let config = Self {
            registry,
            trust_group_prefix: env("TRUSTED_PROXY_TRUST_GROUP_PREFIX")
                .or(fc.trust_group_prefix)
                .unwrap_or(defaults.trust_group_prefix),
            worker_path: normalize_path(
                &env("TRUSTED_PROXY_WORKER_PATH")
                    .or(fc.worker_path)
                    .unwrap_or(defaults.worker_path),
            ),
            server,
            router,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot serve requests
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.trust_group_prefix.is_empty() {
            return Err(Error::Config(
                "trust group prefix must not be empty".to_string(),
            ));
        }
        if self.worker_path == "/" {
            return Err(Error::Config("worker path must not be the root".to_string()));
        }
        if !matches!(self.router.device_scheme.as_str(), "http" | "https") {
            return Err(Error::Config(format!(
                "unsupported device scheme: {}",
                self.router.device_scheme
            )));
        }
        if axum::http::HeaderName::from_bytes(self.router.token_header.as_bytes()).is_err() {
            return Err(Error::Config(format!(
                "invalid token header name: {}",
                self.router.token_header
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    env(key)
        .map(|v| {
            v.parse()
                .map_err(|_| Error::Config(format!("{key} has invalid value: {v}")))
        })
        .transpose()
}

/// Ensure a single leading slash and no trailing slash
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{trimmed}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_local_registry() {
        let config = Config::from_sources(ConfigFile::default(), env_from(&[])).unwrap();

        assert_eq!(config.registry.base_url(), "http://localhost:8100");
        assert_eq!(config.registry.username, "admin");
        assert_eq!(config.registry.password.expose_secret(), "");
        assert!(config.registry.request_timeout.is_none());
        assert_eq!(config.trust_group_prefix, "TrustProxy");
        assert_eq!(config.worker_path, "/shared/TrustedProxy");
    }

    #[test]
    fn env_overrides_file() {
        let fc: ConfigFile = toml::from_str(
            r#"
            trust_group_prefix = "FromFile"

            [registry]
            host = "registry.local"
            port = 9100
            "#,
        )
        .unwrap();

        let config = Config::from_sources(
            fc,
            env_from(&[
                ("TRUSTED_PROXY_REGISTRY_PORT", "9200"),
                ("TRUSTED_PROXY_REGISTRY_TIMEOUT_SECS", "5"),
            ]),
        )
        .unwrap();

        assert_eq!(config.trust_group_prefix, "FromFile");
        assert_eq!(config.registry.host, "registry.local");
        assert_eq!(config.registry.port, 9200);
        assert_eq!(config.registry.request_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let result = Config::from_sources(
            ConfigFile::default(),
            env_from(&[("TRUSTED_PROXY_REGISTRY_PORT", "not-a-port")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn worker_path_is_normalized() {
        let config = Config::from_sources(
            ConfigFile::default(),
            env_from(&[("TRUSTED_PROXY_WORKER_PATH", "mgmt/shared/TrustedProxy/")]),
        )
        .unwrap();
        assert_eq!(config.worker_path, "/mgmt/shared/TrustedProxy");
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let result = Config::from_sources(
            ConfigFile::default(),
            env_from(&[("TRUSTED_PROXY_TRUST_GROUP_PREFIX", "")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let result = Config::from_sources(
            ConfigFile::default(),
            env_from(&[("TRUSTED_PROXY_DEVICE_SCHEME", "ftp")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
