//! Wallet asset discovery and the token registry
//!
//! Wallet holdings come from a DAS (`getAssetsByOwner`) endpoint and the
//! token registry from the aggregator's token list. Both are mapped into
//! the common [`Token`] snapshot; the catalog merge does the rest.

use crate::error::{EngineError, EngineResult};
use crate::token::{sol_token, Token, TokenTag};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

const PAGE_LIMIT: usize = 1000;

/// Source of the user's holdings and the tradeable-token registry
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Fungible wallet holdings, frozen and non-fungible entries excluded,
    /// native balance mapped onto the SOL token.
    async fn wallet_assets(&self, owner: &Pubkey) -> EngineResult<Vec<Token>>;

    /// Full token registry with provenance tags
    async fn token_registry(&self) -> EngineResult<Vec<Token>>;
}

#[derive(Debug, Deserialize)]
struct DasResponse {
    result: Option<DasResult>,
}

#[derive(Debug, Deserialize, Default)]
struct DasResult {
    #[serde(default)]
    items: Vec<DasAsset>,
    #[serde(rename = "nativeBalance")]
    native_balance: Option<NativeBalance>,
}

#[derive(Debug, Deserialize)]
struct DasAsset {
    id: String,
    interface: String,
    content: Option<DasContent>,
    ownership: Option<DasOwnership>,
    token_info: Option<DasTokenInfo>,
}

#[derive(Debug, Deserialize, Default)]
struct DasContent {
    metadata: Option<DasMetadata>,
    links: Option<DasLinks>,
}

#[derive(Debug, Deserialize, Default)]
struct DasMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DasLinks {
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DasOwnership {
    #[serde(default)]
    frozen: bool,
}

#[derive(Debug, Deserialize, Default)]
struct DasTokenInfo {
    #[serde(default)]
    balance: u64,
    #[serde(default)]
    decimals: u8,
    #[serde(default)]
    symbol: Option<String>,
    price_info: Option<DasPriceInfo>,
}

#[derive(Debug, Deserialize)]
struct DasPriceInfo {
    price_per_token: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NativeBalance {
    #[serde(default)]
    lamports: u64,
    price_per_sol: Option<f64>,
}

/// One registry entry; tags arrive as free-form strings
#[derive(Debug, Deserialize)]
struct RegistryToken {
    address: String,
    decimals: u8,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "logoURI", default)]
    logo_uri: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

fn parse_tag(tag: &str) -> Option<TokenTag> {
    match tag {
        "old-registry" => Some(TokenTag::OldRegistry),
        "community" => Some(TokenTag::Community),
        "wormhole" => Some(TokenTag::Wormhole),
        "solana-fm" => Some(TokenTag::SolanaFm),
        "unknown" => Some(TokenTag::Unknown),
        "token-2022" => Some(TokenTag::Token2022),
        _ => None,
    }
}

fn registry_token(entry: RegistryToken) -> Token {
    let tags = entry
        .tags
        .iter()
        .filter_map(|t| parse_tag(t))
        .collect::<BTreeSet<_>>();
    Token {
        address: entry.address,
        decimals: entry.decimals,
        symbol: entry.symbol,
        name: entry.name,
        logo_uri: entry.logo_uri,
        tags,
        price: None,
        balance: None,
    }
}

fn held_token(asset: DasAsset) -> Option<Token> {
    if asset.interface != "FungibleToken" {
        return None;
    }
    if asset.ownership.map(|o| o.frozen).unwrap_or(false) {
        return None;
    }

    let info = asset.token_info?;
    let content = asset.content.unwrap_or_default();
    let metadata = content.metadata.unwrap_or_default();
    let symbol = info
        .symbol
        .or(metadata.symbol)
        .unwrap_or_else(|| asset.id.clone());
    let name = metadata.name.unwrap_or_else(|| symbol.clone());

    Some(Token {
        address: asset.id,
        decimals: info.decimals,
        symbol,
        name,
        logo_uri: content.links.and_then(|l| l.image),
        tags: BTreeSet::from([TokenTag::WalletHeld]),
        price: info.price_info.and_then(|p| p.price_per_token),
        balance: Some(info.balance),
    })
}

fn native_token(balance: NativeBalance) -> Token {
    let mut token = sol_token();
    token.balance = Some(balance.lamports);
    token.price = balance.price_per_sol;
    token.tags.insert(TokenTag::WalletHeld);
    token
}

/// HTTP client for both asset endpoints
pub struct DasAssetClient {
    http: reqwest::Client,
    das_url: String,
    registry_url: String,
}

impl DasAssetClient {
    pub fn new(das_url: String, registry_url: String, timeout_ms: u64) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| EngineError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            das_url,
            registry_url,
        })
    }

    async fn fetch_page(&self, owner: &Pubkey, page: usize) -> EngineResult<DasResult> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getAssetsByOwner",
            "params": {
                "ownerAddress": owner.to_string(),
                "page": page,
                "limit": PAGE_LIMIT,
                "displayOptions": {
                    "showFungible": true,
                    "showNativeBalance": true,
                }
            }
        });

        let response: DasResponse = self
            .http
            .post(&self.das_url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        response
            .result
            .ok_or_else(|| EngineError::Rpc("asset query returned no result".to_string()))
    }
}

#[async_trait]
impl AssetSource for DasAssetClient {
    async fn wallet_assets(&self, owner: &Pubkey) -> EngineResult<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut page = 1;
        loop {
            let result = self.fetch_page(owner, page).await?;
            let page_len = result.items.len();

            tokens.extend(result.items.into_iter().filter_map(held_token));
            if let Some(native) = result.native_balance {
                // Only reported on the first page
                tokens.push(native_token(native));
            }

            if page_len < PAGE_LIMIT {
                break;
            }
            page += 1;
        }

        debug!("wallet holds {} fungible assets", tokens.len());
        Ok(tokens)
    }

    async fn token_registry(&self) -> EngineResult<Vec<Token>> {
        let entries: Vec<RegistryToken> = self
            .http
            .get(&self.registry_url)
            .send()
            .await?
            .error_for_status()
            .map_err(EngineError::from)?
            .json()
            .await?;
        Ok(entries.into_iter().map(registry_token).collect())
    }
}
