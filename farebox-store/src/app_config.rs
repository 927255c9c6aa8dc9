use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub payment: PaymentConfig,
    pub booking_rules: BookingRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    /// How long a hold keeps seats off the market before payment.
    pub hold_duration_minutes: i64,
    pub sweep_interval_seconds: u64,
    /// Every Nth sweep also reconciles seat maps against dead reservations.
    #[serde(default = "default_reconcile_every_ticks")]
    pub reconcile_every_ticks: u64,
    /// Budget for expiring a single reservation before the sweeper moves on.
    #[serde(default = "default_expiry_item_timeout_ms")]
    pub expiry_item_timeout_ms: u64,
    #[serde(default = "default_ticket_code_length")]
    pub ticket_code_length: usize,
}

fn default_reconcile_every_ticks() -> u64 {
    10
}

fn default_expiry_item_timeout_ms() -> u64 {
    5_000
}

fn default_ticket_code_length() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    pub webhook_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Environment-specific file is optional.
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in.
            .add_source(config::File::with_name("config/local").required(false))
            // FAREBOX_SERVER__PORT=8080 style environment overrides.
            .add_source(config::Environment::with_prefix("FAREBOX").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
