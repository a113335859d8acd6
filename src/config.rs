//! Configuration management for the swap engine
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub engine: EngineConfig,
    pub rpc: RpcConfig,
    pub quote: QuoteConfig,
    pub fee: FeeConfig,
    pub metrics: MetricsConfig,
    pub wallet: WalletConfig,
    pub user_settings: UserSettingsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Periodic route refresh interval, independent of edits
    pub route_refresh_interval_ms: u64,
    /// Minimum age before an existing route is refetched
    pub min_route_refetch_interval_ms: u64,
    /// Wallet asset refresh interval
    pub asset_refresh_interval_ms: u64,
    /// Submission attempts per transaction leg
    pub submit_max_attempts: u32,
    /// Confirmation poll interval per attempt
    pub confirm_poll_interval_ms: u64,
    /// Confirmation timeout per attempt
    pub confirm_timeout_ms: u64,
    /// Holdings worth at most this many USD count as dust
    pub dust_max_value_usd: f64,
    /// Default output token and second always-present protocol token
    pub quote_token_mint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// RPC URLs, tried in order with round-robin failover
    pub urls: Vec<String>,
    pub request_timeout_ms: u64,
    /// Reference program the priority fee estimate is scoped to
    pub priority_fee_program: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteConfig {
    /// Aggregator base URL (quote + swap-instructions endpoints)
    pub base_url: String,
    /// Token registry list URL
    pub registry_url: String,
    /// Hard account limit per transaction
    pub max_accounts: u8,
    /// Accounts reserved for the fee-skim transfer
    pub reserved_fee_accounts: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    /// Fee collection address
    pub fee_wallet: String,
    /// Flat fee-skim amount
    pub fee_lamports: u64,
    /// Legs below this input value are exempt from the fee
    pub min_skim_value_usd: f64,
    /// Safety margin added to the aggregator's compute unit estimate
    pub compute_unit_margin: u32,
    /// Minimum total priority fee needed to qualify for expedited processing
    pub min_fast_lane_fee_lamports: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// JSON keypair file for the signing wallet
    pub keypair_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserSettingsConfig {
    /// Where the persisted user settings file lives
    pub path: String,
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("PLACER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.rpc.urls.is_empty() {
            anyhow::bail!("At least one RPC URL must be configured");
        }

        if self.engine.submit_max_attempts == 0 {
            anyhow::bail!("submit_max_attempts must be at least 1");
        }

        if self.quote.reserved_fee_accounts >= self.quote.max_accounts {
            anyhow::bail!("reserved_fee_accounts must be below max_accounts");
        }

        for (name, address) in [
            ("fee_wallet", &self.fee.fee_wallet),
            ("quote_token_mint", &self.engine.quote_token_mint),
            ("priority_fee_program", &self.rpc.priority_fee_program),
        ] {
            if solana_sdk::pubkey::Pubkey::from_str(address).is_err() {
                anyhow::bail!("{} is not a valid address: {}", name, address);
            }
        }

        Ok(())
    }

    /// Quote account budget left after reserving the fee-skim accounts
    pub fn quote_max_accounts(&self) -> u8 {
        self.quote.max_accounts - self.quote.reserved_fee_accounts
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
