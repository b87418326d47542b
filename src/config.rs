use std::env;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::Error;

const DEFAULT_EXCHANGE_RATE: &str = "0.02";
const DEFAULT_LOCAL_CURRENCY: &str = "EGP";
const DEFAULT_SETTLEMENT_CURRENCY: &str = "USD";
const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_APPROVAL_URL: &str = "https://gateway.sandbox.local/checkoutnow";

/// Payment settings, read from `SCREEN_BOOKING_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Settlement-currency units per one local-currency unit.
    pub exchange_rate: Decimal,
    pub local_currency: String,
    pub settlement_currency: String,
    pub gateway_timeout: Duration,
    pub approval_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            exchange_rate: Decimal::new(2, 2),
            local_currency: DEFAULT_LOCAL_CURRENCY.to_string(),
            settlement_currency: DEFAULT_SETTLEMENT_CURRENCY.to_string(),
            gateway_timeout: Duration::from_millis(DEFAULT_GATEWAY_TIMEOUT_MS),
            approval_url: DEFAULT_APPROVAL_URL.to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let exchange_rate: Decimal = parse(
            "SCREEN_BOOKING_EXCHANGE_RATE",
            lookup("SCREEN_BOOKING_EXCHANGE_RATE").unwrap_or_else(|| DEFAULT_EXCHANGE_RATE.into()),
        )?;
        if exchange_rate <= Decimal::ZERO {
            return Err(Error::InvalidConfig {
                key: "SCREEN_BOOKING_EXCHANGE_RATE",
                value: exchange_rate.to_string(),
            });
        }

        let timeout_ms: u64 = match lookup("SCREEN_BOOKING_GATEWAY_TIMEOUT_MS") {
            Some(raw) => parse("SCREEN_BOOKING_GATEWAY_TIMEOUT_MS", raw)?,
            None => DEFAULT_GATEWAY_TIMEOUT_MS,
        };
        if timeout_ms == 0 {
            return Err(Error::InvalidConfig {
                key: "SCREEN_BOOKING_GATEWAY_TIMEOUT_MS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            exchange_rate,
            local_currency: currency(
                "SCREEN_BOOKING_LOCAL_CURRENCY",
                lookup("SCREEN_BOOKING_LOCAL_CURRENCY"),
                DEFAULT_LOCAL_CURRENCY,
            )?,
            settlement_currency: currency(
                "SCREEN_BOOKING_SETTLEMENT_CURRENCY",
                lookup("SCREEN_BOOKING_SETTLEMENT_CURRENCY"),
                DEFAULT_SETTLEMENT_CURRENCY,
            )?,
            gateway_timeout: Duration::from_millis(timeout_ms),
            approval_url: lookup("SCREEN_BOOKING_APPROVAL_URL")
                .unwrap_or_else(|| DEFAULT_APPROVAL_URL.to_string()),
        })
    }
}

fn parse<T: FromStr>(key: &'static str, raw: String) -> Result<T, Error> {
    raw.trim()
        .parse()
        .map_err(|_| Error::InvalidConfig { key, value: raw })
}

// ISO 4217 style: three ASCII letters, stored upper-case
fn currency(key: &'static str, raw: Option<String>, default: &str) -> Result<String, Error> {
    let value = raw.unwrap_or_else(|| default.to_string());
    let code = value.trim().to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(Error::InvalidConfig { key, value })
    }
}
