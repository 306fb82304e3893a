use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Fixed-rate shipping fee table, keyed by shipping method.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ShippingConfig {
    pub standard_fee: Decimal,
    pub express_fee: Decimal,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            standard_fee: dec!(30000),
            express_fee: dec!(45000),
        }
    }
}

/// VNPay gateway credentials and endpoints.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct VnpayConfig {
    /// Terminal code issued by the gateway
    pub tmn_code: String,
    /// Shared HMAC secret
    pub hash_secret: String,
    /// Gateway payment page
    #[serde(default = "default_vnpay_url")]
    pub pay_url: String,
    /// Endpoint the gateway redirects the browser back to
    pub return_url: String,
    /// Storefront page that renders the checkout result
    pub result_url: String,
}

fn default_vnpay_url() -> String {
    "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string()
}

impl Default for VnpayConfig {
    fn default() -> Self {
        Self {
            tmn_code: String::new(),
            hash_secret: String::new(),
            pay_url: default_vnpay_url(),
            return_url: "http://localhost:8080/api/v1/payments/vnpay/return".to_string(),
            result_url: "http://localhost:3000/checkout/result".to_string(),
        }
    }
}

/// Unpaid-order reclaimer cadence.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ReclaimConfig {
    /// Sweep interval in seconds
    #[serde(default = "default_reclaim_interval")]
    pub interval_secs: u64,
    /// Grace period before an unpaid gateway order is cancelled, in minutes
    #[serde(default = "default_reclaim_grace")]
    pub grace_mins: i64,
}

fn default_reclaim_interval() -> u64 {
    60
}
fn default_reclaim_grace() -> i64 {
    60
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reclaim_interval(),
            grace_mins: default_reclaim_grace(),
        }
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
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

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Maximum database connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Minimum database connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Pending-payment records older than this are dead, in minutes
    #[serde(default = "default_pending_ttl")]
    pub pending_payment_ttl_mins: i64,

    #[serde(default)]
    #[validate]
    pub shipping: ShippingConfig,

    #[serde(default)]
    #[validate]
    pub vnpay: VnpayConfig,

    #[serde(default)]
    #[validate]
    pub reclaim: ReclaimConfig,
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
fn default_pending_ttl() -> i64 {
    45
}

impl AppConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pending_payment_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.pending_payment_ttl_mins)
    }

    pub fn reclaim_grace(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.reclaim.grace_mins)
    }
}

/// Loads configuration from defaults, optional `config/*.toml` profiles and
/// `APP__`-prefixed environment variables.
pub fn load_config() -> Result<AppConfig, ConfigError> {
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
        .set_default("database_url", "sqlite://glowcart.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    Ok(app_config)
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured
/// level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("glowcart_api={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);
    let filter = EnvFilter::new(filter_directive);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
