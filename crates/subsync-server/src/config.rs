use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};
use subsync_billing::{DEFAULT_API_KEY_HEADER, HttpProviderConfig};
use subsync_db_postgres::PostgresConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Payment provider REST API
    #[serde(default)]
    pub provider: ProviderSettings,
    /// Bearer credential validation for the sync endpoint
    #[serde(default)]
    pub auth: AuthSettings,
    /// Provider-pushed payment events
    #[serde(default)]
    pub webhook: WebhookSettings,
    #[serde(default)]
    pub reconcile: ReconcileSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        if self.storage.backend == StorageBackend::Postgres {
            match &self.storage.postgres {
                None => {
                    return Err("storage.backend=postgres requires storage.postgres".into());
                }
                Some(pg) if pg.url.trim().is_empty() => {
                    return Err("storage.postgres.url must not be empty".into());
                }
                Some(pg) if pg.pool_size == 0 => {
                    return Err("storage.postgres.pool_size must be > 0".into());
                }
                Some(_) => {}
            }
        }
        if self.provider.base_url.trim().is_empty() {
            return Err("provider.base_url must not be empty".into());
        }
        if self.provider.api_key.trim().is_empty() {
            return Err("provider.api_key must not be empty".into());
        }
        if self.provider.timeout_ms == Some(0) {
            return Err("provider.timeout_ms must be > 0 when set".into());
        }
        if self.auth.jwt_secret.is_empty() {
            return Err("auth.jwt_secret must not be empty".into());
        }
        if self.reconcile.concurrency == 0 {
            return Err("reconcile.concurrency must be > 0".into());
        }
        if self.webhook.token.is_some() && self.webhook.header.trim().is_empty() {
            return Err("webhook.header must not be empty when webhook.token is set".into());
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::new(host, self.server.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    256 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    /// Per-request timeout; unset keeps the HTTP client default
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_provider_base_url() -> String {
    "https://api.asaas.com/v3".into()
}
fn default_api_key_header() -> String {
    DEFAULT_API_KEY_HEADER.into()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            api_key: String::new(),
            api_key_header: default_api_key_header(),
            timeout_ms: None,
        }
    }
}

impl ProviderSettings {
    pub fn to_http_config(&self) -> HttpProviderConfig {
        let mut config = HttpProviderConfig::new(&self.base_url, &self.api_key);
        config.api_key_header = self.api_key_header.clone();
        config.timeout = self.timeout_ms.map(Duration::from_millis);
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthSettings {
    /// HS256 secret shared with the identity backend
    #[serde(default)]
    pub jwt_secret: String,
    /// Expected `aud` claim; not checked when unset
    #[serde(default)]
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    /// Shared token; the webhook endpoint answers 404 when unset
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_webhook_header")]
    pub header: String,
}

fn default_webhook_header() -> String {
    "asaas-access-token".into()
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            token: None,
            header: default_webhook_header(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSettings {
    /// Seconds between scheduled runs over all owners; 0 disables the scheduler
    #[serde(default)]
    pub interval_secs: u64,
    /// Records reconciled at once within a run
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    1
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            interval_secs: 0,
            concurrency: default_concurrency(),
        }
    }
}

impl ReconcileSettings {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or("subsync.toml"));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., SUBSYNC__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("SUBSYNC")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.provider.api_key = "key".into();
        cfg.auth.jwt_secret = "secret".into();
        cfg
    }

    #[test]
    fn defaults_need_credentials() {
        let err = AppConfig::default().validate().unwrap_err();
        assert!(err.contains("provider.api_key"));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn postgres_backend_requires_section() {
        let mut cfg = valid();
        cfg.storage.backend = StorageBackend::Postgres;
        assert!(cfg.validate().unwrap_err().contains("storage.postgres"));

        cfg.storage.postgres = Some(PostgresConfig::new("postgres://localhost/subsync"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut cfg = valid();
        cfg.reconcile.concurrency = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn provider_settings_carry_over() {
        let mut settings = ProviderSettings::default();
        settings.api_key = "k".into();
        settings.timeout_ms = Some(2500);
        let http = settings.to_http_config();
        assert_eq!(http.base_url, "https://api.asaas.com/v3");
        assert_eq!(http.api_key_header, "access_token");
        assert_eq!(http.timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn scheduler_interval() {
        let mut settings = ReconcileSettings::default();
        assert_eq!(settings.interval(), None);
        settings.interval_secs = 60;
        assert_eq!(settings.interval(), Some(Duration::from_secs(60)));
    }
}
