//! Ranked, de-duplicated token catalog
//!
//! The catalog merges the wallet-held-asset source, the two protocol tokens
//! and the general registry, in that priority order. Within a source, tokens
//! are ordered by `price * balance` descending so that top-of-list means
//! highest display value. The merge is pure and synchronous; it is rerun
//! whenever a source list or the untrusted-token toggle changes.

use super::Token;
use std::cmp::Ordering;
use std::collections::HashMap;

/// What each contributing source has reported so far.
///
/// `None` means the source has not reported yet; the catalog stays unbuilt
/// until every source has, which guards downstream reads.
#[derive(Debug, Clone, Default)]
pub struct CatalogSources {
    pub wallet_assets: Option<Vec<Token>>,
    pub registry: Option<Vec<Token>>,
}

impl CatalogSources {
    pub fn ready(&self) -> bool {
        self.wallet_assets.is_some() && self.registry.is_some()
    }
}

/// Insertion-ordered mapping of address to token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenCatalog {
    order: Vec<String>,
    tokens: HashMap<String, Token>,
}

impl TokenCatalog {
    pub fn get(&self, address: &str) -> Option<&Token> {
        self.tokens.get(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.tokens.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tokens in display order, highest-value holdings first
    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.order.iter().filter_map(|address| self.tokens.get(address))
    }

    fn add_source(&mut self, source: &[Token], allow_untrusted: bool) {
        let mut sorted: Vec<&Token> = source.iter().collect();
        sorted.sort_by(|a, b| display_value_order(a, b));

        for token in sorted {
            if let Some(existing) = self.tokens.get_mut(&token.address) {
                // Collision: merge tag sets, first-seen price/balance wins
                existing.tags.extend(token.tags.iter().copied());
                continue;
            }
            if !allow_untrusted && !token.is_strict() {
                continue;
            }
            self.order.push(token.address.clone());
            self.tokens.insert(token.address.clone(), token.clone());
        }
    }
}

/// Merge all sources into one catalog.
///
/// Returns `None` until every contributing source has reported at least
/// once. The protocol tokens are always present and need no source.
pub fn merge(
    sources: &CatalogSources,
    protocol_tokens: &[Token],
    allow_untrusted: bool,
) -> Option<TokenCatalog> {
    if !sources.ready() {
        return None;
    }

    let mut catalog = TokenCatalog::default();
    if let Some(wallet) = &sources.wallet_assets {
        catalog.add_source(wallet, allow_untrusted);
    }
    catalog.add_source(protocol_tokens, allow_untrusted);
    if let Some(registry) = &sources.registry {
        catalog.add_source(registry, allow_untrusted);
    }

    Some(catalog)
}

/// Sort by `price * balance` descending, tie-broken by price then balance
fn display_value_order(a: &Token, b: &Token) -> Ordering {
    let a_price = a.price.unwrap_or(0.0);
    let b_price = b.price.unwrap_or(0.0);
    let a_balance = a.balance.unwrap_or(0) as f64;
    let b_balance = b.balance.unwrap_or(0) as f64;

    (b_price * b_balance)
        .partial_cmp(&(a_price * a_balance))
        .unwrap_or(Ordering::Equal)
        .then(b_price.partial_cmp(&a_price).unwrap_or(Ordering::Equal))
        .then(b_balance.partial_cmp(&a_balance).unwrap_or(Ordering::Equal))
}
