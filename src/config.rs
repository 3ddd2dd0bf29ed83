use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "EUR";
const DEFAULT_CHECKOUT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Shipping rates per destination zone, plus the domestic free-shipping rule.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ShippingConfig {
    #[serde(default = "default_domestic_rate")]
    pub domestic_rate: Decimal,

    #[serde(default = "default_regional_rate")]
    pub regional_rate: Decimal,

    #[serde(default = "default_international_rate")]
    pub international_rate: Decimal,

    /// Domestic orders at or above this post-discount subtotal ship free.
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: Decimal,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            domestic_rate: default_domestic_rate(),
            regional_rate: default_regional_rate(),
            international_rate: default_international_rate(),
            free_shipping_threshold: default_free_shipping_threshold(),
        }
    }
}

/// Hosted checkout provider settings. The provider is optional: without an
/// API key the checkout endpoints answer 503 instead of failing at startup.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CheckoutConfig {
    /// Base URL of the provider's API
    #[serde(default)]
    pub api_url: Option<String>,

    /// Secret API key for the provider
    #[serde(default)]
    pub api_key: Option<String>,

    /// Where the provider redirects the shopper after payment
    #[serde(default = "default_success_url")]
    pub success_url: String,

    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,

    /// Bound on outbound provider calls, in seconds
    #[serde(default = "default_checkout_timeout_secs")]
    pub timeout_secs: u64,

    /// Shared secret for webhook signature verification
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Accepted clock skew for signed webhook timestamps, in seconds
    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: u64,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            success_url: default_success_url(),
            cancel_url: default_cancel_url(),
            timeout_secs: default_checkout_timeout_secs(),
            webhook_secret: None,
            webhook_tolerance_secs: default_webhook_tolerance_secs(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Seed the catalog with the initial collection when it is empty
    #[serde(default)]
    pub seed_catalog: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    /// ISO 4217 currency for all prices and checkout sessions
    #[validate(length(equal = 3))]
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Fixed per-unit price of the charm add-on
    #[serde(default = "default_charm_price")]
    pub charm_price: Decimal,

    /// Vendor address receiving order notifications
    #[validate(email)]
    #[serde(default = "default_vendor_email")]
    pub vendor_email: String,

    #[serde(default)]
    #[validate]
    pub shipping: ShippingConfig,

    #[serde(default)]
    #[validate]
    pub checkout: CheckoutConfig,
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Minimal configuration used by the test harness.
    pub fn for_tests(database_url: String) -> Self {
        Self {
            database_url,
            host: "127.0.0.1".to_string(),
            port: 18_080,
            environment: "test".to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            auto_migrate: true,
            seed_catalog: false,
            cors_allowed_origins: None,
            db_max_connections: 1,
            db_min_connections: 1,
            db_connect_timeout_secs: 5,
            currency: DEFAULT_CURRENCY.to_string(),
            charm_price: default_charm_price(),
            vendor_email: default_vendor_email(),
            shipping: ShippingConfig::default(),
            checkout: CheckoutConfig {
                webhook_secret: Some("whsec_test".to_string()),
                ..CheckoutConfig::default()
            },
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_charm_price() -> Decimal {
    dec!(2.00)
}

fn default_vendor_email() -> String {
    "orders@boutique.example".to_string()
}

fn default_domestic_rate() -> Decimal {
    dec!(5.00)
}

fn default_regional_rate() -> Decimal {
    dec!(12.00)
}

fn default_international_rate() -> Decimal {
    dec!(20.00)
}

fn default_free_shipping_threshold() -> Decimal {
    dec!(80.00)
}

fn default_success_url() -> String {
    "http://localhost:3000/checkout/success".to_string()
}

fn default_cancel_url() -> String {
    "http://localhost:3000/checkout/cancel".to_string()
}

fn default_checkout_timeout_secs() -> u64 {
    DEFAULT_CHECKOUT_TIMEOUT_SECS
}

fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Loads configuration from `config/` files layered with `APP__`-prefixed
/// environment variables (e.g. `APP__CHECKOUT__API_KEY`).
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

    let config = Config::builder()
        .set_default("database_url", "sqlite://boutique.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    Ok(app_config)
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured
/// level when set.
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("boutique_api={},tower_http=info", level);
    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let _ = fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_storefront_rates() {
        let shipping = ShippingConfig::default();
        assert_eq!(shipping.domestic_rate, dec!(5.00));
        assert_eq!(shipping.regional_rate, dec!(12.00));
        assert_eq!(shipping.international_rate, dec!(20.00));
        assert_eq!(shipping.free_shipping_threshold, dec!(80.00));
    }

    #[test]
    fn test_checkout_provider_optional_by_default() {
        let checkout = CheckoutConfig::default();
        assert!(checkout.api_url.is_none());
        assert!(checkout.api_key.is_none());
        assert_eq!(checkout.timeout_secs, DEFAULT_CHECKOUT_TIMEOUT_SECS);
        assert_eq!(
            checkout.webhook_tolerance_secs,
            DEFAULT_WEBHOOK_TOLERANCE_SECS
        );
    }

    #[test]
    fn test_for_tests_is_valid() {
        let cfg = AppConfig::for_tests("sqlite::memory:".to_string());
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.charm_price, dec!(2.00));
    }
}
