// Centralized configuration management for the lifecycle core.
// All env vars load once at startup; missing required values are fatal.

use std::env;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::subscription::PlanPrices;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Global application configuration loaded once at startup.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    AppConfig::from_env().expect("Failed to load configuration")
});

/// Complete configuration for the lifecycle subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub billing: BillingConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Authorization key for the billing gateway.
    pub api_key: String,
    /// Shared secret for webhook signature verification.
    pub webhook_secret: String,
    pub gateway_base_url: String,
    /// How often outstanding invoices are re-checked.
    pub poll_interval: Duration,
    pub prices: PlanPrices,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often fired one-shot jobs are reclaimed.
    pub sweep_interval: Duration,
    /// Lifetime assigned to links created without an explicit one.
    pub default_link_lifetime: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        Ok(Self {
            billing: BillingConfig {
                api_key: require_var("BILLING_API_KEY")?,
                webhook_secret: require_var("BILLING_WEBHOOK_SECRET")?,
                gateway_base_url: var_or("BILLING_GATEWAY_URL", "https://api.qiwi.com"),
                poll_interval: Duration::from_secs(parse_var(
                    "BILLING_POLL_INTERVAL_SECS",
                    300,
                )?),
                prices: PlanPrices {
                    weekly: parse_var("PLAN_PRICE_WEEKLY", 1.99)?,
                    monthly: parse_var("PLAN_PRICE_MONTHLY", 4.99)?,
                    yearly: parse_var("PLAN_PRICE_YEARLY", 39.99)?,
                },
            },
            scheduler: SchedulerConfig {
                sweep_interval: Duration::from_secs(parse_var(
                    "SCHEDULER_SWEEP_INTERVAL_SECS",
                    12 * 60 * 60,
                )?),
                default_link_lifetime: Duration::from_secs(parse_var(
                    "DEFAULT_LINK_LIFETIME_SECS",
                    12 * 60 * 60,
                )?),
            },
        })
    }
}

fn require_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}
