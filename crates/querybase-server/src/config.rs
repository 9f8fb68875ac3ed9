//! Runtime configuration: one `RuntimeConfig` loaded from a TOML file (or
//! environment variables alone), mirroring the nested-section shape each
//! subsystem exposes.

use std::env;
use std::path::Path;

use querybase_error::ConfigError;
use querybase_secrets::VaultKey;
use serde::Deserialize;

fn default_pool_size() -> u32 {
    10
}
fn default_backend_pool_size() -> u32 {
    5
}
fn default_idle_cap_secs() -> u64 {
    10 * 60
}
fn default_shutdown_drain_secs() -> u64 {
    15
}
fn default_schema_freshness_secs() -> u64 {
    5 * 60
}
fn default_log_level() -> String {
    "querybase_server=info,querybase_broker=info".to_string()
}
fn default_webhook_timeout_secs() -> u64 {
    30
}

/// Metadata store connection (§4.13).
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,
}

/// Credential vault key (§4.1). `key` may be left out of the file
/// entirely and supplied only via `QUERYBASE_VAULT_KEY` at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub key: Option<String>,
}

/// Per-backend connection pool sizing (§4.2).
#[derive(Debug, Clone, Deserialize)]
pub struct BackendsConfig {
    #[serde(default = "default_backend_pool_size")]
    pub pool_size: u32,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            pool_size: default_backend_pool_size(),
        }
    }
}

/// Transaction broker tuning (§4.9 "Bounded hold time", "Shutdown drain").
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_idle_cap_secs")]
    pub idle_cap_secs: u64,
    #[serde(default = "default_shutdown_drain_secs")]
    pub shutdown_drain_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            idle_cap_secs: default_idle_cap_secs(),
            shutdown_drain_secs: default_shutdown_drain_secs(),
        }
    }
}

/// Schema cache freshness window (§4.5).
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    #[serde(default = "default_schema_freshness_secs")]
    pub freshness_secs: u64,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            freshness_secs: default_schema_freshness_secs(),
        }
    }
}

/// `tracing-subscriber` setup.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_level(),
            json: false,
        }
    }
}

/// Notification transport (C16, §4.16, §9 "Notification delivery is
/// pluggable"). Leaving `url` unset disables the webhook transport
/// entirely -- the event bus still publishes, there's simply no
/// subscriber to forward to.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            secret: None,
            timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

impl RuntimeConfig {
    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read or
    /// `ConfigError::ParseError` if it is not valid TOML matching this
    /// shape.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `QUERYBASE_CONFIG` if set, else `./querybase.toml` if it
    /// exists, else `ConfigError::NotFound`.
    ///
    /// # Errors
    ///
    /// See [`RuntimeConfig::from_file`].
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = env::var("QUERYBASE_CONFIG") {
            return Self::from_file(path);
        }
        let local = Path::new("./querybase.toml");
        if local.exists() {
            return Self::from_file(local);
        }
        Err(ConfigError::NotFound)
    }

    /// Resolve the vault key: `QUERYBASE_VAULT_KEY` takes precedence over
    /// `vault.key` in the file (§4.1).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::VaultKeyInvalid` if neither source decodes to
    /// a 32-byte key.
    pub fn vault_key(&self) -> Result<VaultKey, ConfigError> {
        let encoded = env::var("QUERYBASE_VAULT_KEY")
            .ok()
            .or_else(|| self.vault.key.clone())
            .ok_or(ConfigError::VaultKeyInvalid)?;
        VaultKey::from_base64(&encoded).ok_or(ConfigError::VaultKeyInvalid)
    }

    /// `QUERYBASE_DATABASE_URL` overrides `database.url` when set, so the
    /// metadata store's DSN never has to live in a checked-in file.
    #[must_use]
    pub fn database_url(&self) -> String {
        env::var("QUERYBASE_DATABASE_URL").unwrap_or_else(|_| self.database.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_file() {
        let toml = r#"
            [database]
            url = "postgres://localhost/querybase"
        "#;
        let config: RuntimeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.broker.idle_cap_secs, 600);
        assert!(!config.logging.json);
        assert!(config.webhook.url.is_none());
        assert_eq!(config.webhook.timeout_secs, 30);
    }

    #[test]
    fn missing_vault_key_is_invalid() {
        let config = RuntimeConfig {
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 1,
            },
            vault: VaultConfig::default(),
            backends: BackendsConfig::default(),
            broker: BrokerConfig::default(),
            schema: SchemaConfig::default(),
            logging: LoggingConfig::default(),
            webhook: WebhookConfig::default(),
        };
        assert!(matches!(config.vault_key(), Err(ConfigError::VaultKeyInvalid)));
    }
}
