//! Environment configuration
//!
//! Values come from the process environment (a `.env` file is loaded by the
//! binaries first). Empty variables count as unset.

use crate::calculator::CalculatorConfig;
use crate::error::BotError;
use crate::Result;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_API_URL: &str = "https://api.telegram.org";
const DEFAULT_WEBHOOK_BASE: &str = "https://optimal-lot-size-bot.vercel.app";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;
const DEFAULT_FOLLOW_UP_DELAY_MS: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    pub telegram_api_url: String,
    /// Public base URL the webhook is served under
    pub webhook_base_url: String,
    pub webhook_secret: Option<String>,
    pub port: u16,
    pub database_url: Option<String>,
    pub session_ttl: Duration,
    /// Pause before the "calculate again?" prompt
    pub follow_up_delay: Duration,
    pub calculator: CalculatorConfig,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bot_token = get("TELEGRAM_BOT_TOKEN")
            .ok_or_else(|| BotError::Config("TELEGRAM_BOT_TOKEN is not set".to_string()))?;

        let webhook_base_url = get("WEBHOOK_URL")
            .or_else(|| get("VERCEL_URL"))
            .map(|url| with_scheme(&url))
            .unwrap_or_else(|| DEFAULT_WEBHOOK_BASE.to_string());

        let defaults = CalculatorConfig::default();
        let calculator = CalculatorConfig {
            standard_lot_units: parse_or(&get, "CALC_STANDARD_LOT_UNITS", defaults.standard_lot_units)?,
            crypto_contract_size: parse_or(&get, "CALC_CRYPTO_CONTRACT_SIZE", defaults.crypto_contract_size)?,
            ounces_per_lot: parse_or(&get, "CALC_OUNCES_PER_LOT", defaults.ounces_per_lot)?,
            index_point_value: parse_or(&get, "CALC_INDEX_POINT_VALUE", defaults.index_point_value)?,
        };

        for (key, value) in [
            ("CALC_STANDARD_LOT_UNITS", calculator.standard_lot_units),
            ("CALC_CRYPTO_CONTRACT_SIZE", calculator.crypto_contract_size),
            ("CALC_OUNCES_PER_LOT", calculator.ounces_per_lot),
            ("CALC_INDEX_POINT_VALUE", calculator.index_point_value),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(BotError::Config(format!("{} must be a positive number", key)));
            }
        }

        let port = match get("PORT") {
            Some(value) => parse_value("PORT", &value)?,
            None => parse_or(&get, "API_PORT", DEFAULT_PORT)?,
        };

        Ok(Self {
            bot_token,
            telegram_api_url: get("TELEGRAM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            webhook_base_url,
            webhook_secret: get("WEBHOOK_SECRET"),
            port,
            database_url: get("POSTGRES_URL").or_else(|| get("DATABASE_URL")),
            session_ttl: Duration::from_secs(parse_or(&get, "SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?),
            follow_up_delay: Duration::from_millis(parse_or(
                &get,
                "FOLLOW_UP_DELAY_MS",
                DEFAULT_FOLLOW_UP_DELAY_MS,
            )?),
            calculator,
        })
    }

    /// Full URL Telegram should deliver updates to.
    pub fn webhook_url(&self) -> String {
        format!("{}/api/webhook", self.webhook_base_url.trim_end_matches('/'))
    }
}

fn with_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| BotError::Config(format!("Invalid {} '{}': {}", key, value, e)))
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}
