use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.portone.io";
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;

/// Payment gateway connection settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Base URL of the gateway HTTP API
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,

    /// API secret used in the Authorization header
    #[validate(length(min = 1, message = "Gateway API secret must not be empty"))]
    pub api_secret: String,

    /// Bounded timeout applied to every outbound gateway call
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

/// Audit export settings. Export is disabled when no webhook URL is set.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Destination for order audit records
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Optional HMAC secret for signing audit payloads
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL must not be empty"))]
    pub database_url: String,

    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment name (development, production, ...)
    #[serde(default = "default_env")]
    pub environment: String,

    /// Log level directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON instead of human-readable lines
    #[serde(default)]
    pub log_json: bool,

    #[validate]
    pub gateway: GatewayConfig,

    #[serde(default)]
    #[validate]
    pub audit: AuditConfig,
}

fn default_gateway_base_url() -> String {
    DEFAULT_GATEWAY_BASE_URL.to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_env() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl AppConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, AppConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppConfigError::Invalid(format!("invalid bind address: {}", e)))
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from `config/{default,<env>}.toml` plus `APP__`-prefixed
/// environment variables (e.g. `APP__GATEWAY__API_SECRET`).
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let builder = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", DEFAULT_HOST)?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("gateway.base_url", DEFAULT_GATEWAY_BASE_URL)?
        .set_default("gateway.timeout_secs", DEFAULT_GATEWAY_TIMEOUT_SECS as i64)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // The gateway secret has no default; verification is impossible without it.
    if config.get_string("gateway.api_secret").is_err() {
        error!("Gateway API secret is not configured. Set APP__GATEWAY__API_SECRET.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "gateway.api_secret is required but not configured".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;
    app_config
        .validate()
        .map_err(|e| AppConfigError::Invalid(e.to_string()))?;

    Ok(app_config)
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            environment: DEFAULT_ENV.into(),
            log_level: DEFAULT_LOG_LEVEL.into(),
            log_json: false,
            gateway: GatewayConfig {
                base_url: DEFAULT_GATEWAY_BASE_URL.into(),
                api_secret: "secret".into(),
                timeout_secs: DEFAULT_GATEWAY_TIMEOUT_SECS,
            },
            audit: AuditConfig::default(),
        }
    }

    #[test]
    fn socket_addr_parses() {
        let cfg = base_config();
        assert_eq!(cfg.socket_addr().unwrap().port(), DEFAULT_PORT);
    }

    #[test]
    fn empty_gateway_secret_fails_validation() {
        let mut cfg = base_config();
        cfg.gateway.api_secret = String::new();
        assert!(cfg.validate().is_err());
    }
}
