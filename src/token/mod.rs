//! Token model and the ranked, de-duplicated catalog
//!
//! Tokens are immutable snapshots. The catalog is derived state: it is
//! rebuilt wholesale whenever one of its contributing sources refreshes.

pub mod catalog;

pub use catalog::{CatalogSources, TokenCatalog};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Native SOL wrapped mint address
pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Default quote token mint (USDC)
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// Registry and wallet provenance tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenTag {
    OldRegistry,
    Community,
    Wormhole,
    SolanaFm,
    Unknown,
    #[serde(rename = "token-2022")]
    Token2022,
    /// Sourced from the user's wallet holdings
    WalletHeld,
}

/// One tradeable token. Immutable snapshot, replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub address: String,
    pub decimals: u8,
    pub symbol: String,
    pub name: String,
    #[serde(rename = "logoURI", default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<TokenTag>,
    /// Quote currency per natural unit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Raw integer units held by the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<u64>,
}

impl Token {
    /// Trusted tokens come from a curated registry or the user's own wallet
    pub fn is_strict(&self) -> bool {
        self.tags.iter().any(|tag| {
            matches!(
                tag,
                TokenTag::OldRegistry | TokenTag::Community | TokenTag::Wormhole | TokenTag::WalletHeld
            )
        })
    }

    /// Display value of the user's whole holding, in quote currency
    pub fn holding_value_usd(&self) -> f64 {
        let balance = self.balance.unwrap_or(0);
        self.price.unwrap_or(0.0) * convert_raw_to_natural(self.decimals, balance)
    }

    /// A held token whose whole balance is worth at most the dust ceiling
    pub fn is_dust(&self, max_value_usd: f64) -> bool {
        self.balance.unwrap_or(0) > 0
            && self.price.unwrap_or(0.0) > 0.0
            && self.holding_value_usd() <= max_value_usd
    }
}

/// Native SOL as it appears in the catalog before balances arrive
pub fn sol_token() -> Token {
    Token {
        address: WRAPPED_SOL_MINT.to_string(),
        decimals: 9,
        symbol: "SOL".to_string(),
        name: "Solana".to_string(),
        logo_uri: None,
        tags: BTreeSet::from([TokenTag::OldRegistry]),
        price: None,
        balance: None,
    }
}

/// The protocol's quote token (USDC)
pub fn usdc_token() -> Token {
    Token {
        address: USDC_MINT.to_string(),
        decimals: 6,
        symbol: "USDC".to_string(),
        name: "USD Coin".to_string(),
        logo_uri: None,
        tags: BTreeSet::from([TokenTag::OldRegistry]),
        price: None,
        balance: None,
    }
}

/// Convert user-facing decimal text into raw integer units.
///
/// Unparseable, negative or non-finite input converts to 0, which downstream
/// routing classifies as `AmountTooSmall`.
pub fn convert_natural_to_raw(decimals: u8, natural: &str) -> u64 {
    let value: f64 = match natural.trim().parse() {
        Ok(v) => v,
        Err(_) => return 0,
    };
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let raw = value * 10f64.powi(decimals as i32);
    if raw >= u64::MAX as f64 {
        u64::MAX
    } else {
        raw.round() as u64
    }
}

/// Convert raw integer units into natural units
pub fn convert_raw_to_natural(decimals: u8, raw: u64) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}
