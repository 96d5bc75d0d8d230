//! Environment driven configuration for the mint process.

use std::env;
use std::net::SocketAddr;

use gild_core::primitives::CurrencyUnit;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
pub struct MintConfig {
    pub info: MintInfoConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub lightning_fee: LightningFeeConfig,
    pub limits: MintLimitsConfig,
    pub quotes: QuoteConfig,
}

impl MintConfig {
    pub fn from_env() -> Self {
        Self {
            info: MintInfoConfig::from_env(),
            server: ServerConfig::from_env(),
            database: DatabaseConfig::from_env(),
            lightning_fee: LightningFeeConfig::from_env(),
            limits: MintLimitsConfig::from_env(),
            quotes: QuoteConfig::from_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host_port: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host_port: "[::]:3338".parse().expect("invalid host port"),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host_port: env_or_default("MINT_HOST_PORT", Self::default().host_port),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub db_url: String,
    pub max_connections: u32,
    /// directory the sql migrations are loaded from at startup
    pub migrations_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_url: String::new(),
            max_connections: 5,
            migrations_path: "gild-mint/migrations".to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_url: env::var("MINT_DB_URL").unwrap_or_default(),
            max_connections: env_or_default("MINT_DB_MAX_CONNECTIONS", defaults.max_connections),
            migrations_path: env::var("MINT_DB_MIGRATIONS_PATH")
                .unwrap_or(defaults.migrations_path),
        }
    }
}

/// Reserve kept for Lightning routing fees when quoting a melt:
/// `max(1, base_fee + ceil(amount * fee_rate))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightningFeeConfig {
    pub base_fee_sat: u64,
    pub fee_rate: f64,
}

impl Default for LightningFeeConfig {
    fn default() -> Self {
        Self {
            base_fee_sat: 1,
            fee_rate: 0.01,
        }
    }
}

impl LightningFeeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_fee_sat: env_or_default("MINT_FEE_BASE_SAT", defaults.base_fee_sat),
            fee_rate: env_or_default("MINT_FEE_RATE", defaults.fee_rate),
        }
    }

    pub fn fee_reserve(&self, amount_sat: u64) -> u64 {
        let variable = (amount_sat as f64 * self.fee_rate).ceil() as u64;
        (self.base_fee_sat + variable).max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintLimitsConfig {
    pub mint_min_sat: u64,
    pub mint_max_sat: u64,
}

impl Default for MintLimitsConfig {
    fn default() -> Self {
        Self {
            mint_min_sat: 1,
            mint_max_sat: 1_000_000,
        }
    }
}

impl MintLimitsConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            mint_min_sat: env_or_default("MINT_MIN_SAT", defaults.mint_min_sat),
            mint_max_sat: env_or_default("MINT_MAX_SAT", defaults.mint_max_sat),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteConfig {
    /// lifetime of unpaid quotes
    pub quote_ttl_secs: u64,
    /// how long proofs stay locked to an in-flight melt
    pub pending_ttl_secs: u64,
    /// upper bound on a single Lightning pay attempt
    pub pay_timeout_secs: u64,
    /// cadence of the expired quote and pending proof sweeper
    pub sweep_interval_secs: u64,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            quote_ttl_secs: 1800,
            pending_ttl_secs: 300,
            pay_timeout_secs: 60,
            sweep_interval_secs: 60,
        }
    }
}

impl QuoteConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            quote_ttl_secs: env_or_default("MINT_QUOTE_TTL_SECS", defaults.quote_ttl_secs),
            pending_ttl_secs: env_or_default("MINT_PENDING_TTL_SECS", defaults.pending_ttl_secs),
            pay_timeout_secs: env_or_default("MINT_PAY_TIMEOUT_SECS", defaults.pay_timeout_secs),
            sweep_interval_secs: env_or_default(
                "MINT_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MintInfoConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub description_long: Option<String>,
    pub motd: Option<String>,
    pub contact_email: Option<String>,
}

impl MintInfoConfig {
    pub fn from_env() -> Self {
        Self {
            name: env::var("MINT_INFO_NAME").ok(),
            description: env::var("MINT_INFO_DESCRIPTION").ok(),
            description_long: env::var("MINT_INFO_DESCRIPTION_LONG").ok(),
            motd: env::var("MINT_INFO_MOTD").ok(),
            contact_email: env::var("MINT_INFO_CONTACT_EMAIL").ok(),
        }
    }
}

/// The unit this mint issues tokens in.
pub const MINT_UNIT: CurrencyUnit = CurrencyUnit::Sat;

fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::LightningFeeConfig;

    #[test]
    fn test_fee_reserve() {
        let fees = LightningFeeConfig::default();
        // max(1, 1 + ceil(amount * 0.01))
        assert_eq!(fees.fee_reserve(0), 1);
        assert_eq!(fees.fee_reserve(100), 2);
        assert_eq!(fees.fee_reserve(1000), 11);
        assert_eq!(fees.fee_reserve(99), 2);
    }
}
