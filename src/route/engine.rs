//! Route decision engine
//!
//! One pure decision function serves both the periodic refresh tick and
//! edit-triggered passes, so the two call sites cannot drift apart. There
//! is no cancellation of in-flight quote requests; superseded responses
//! are rejected on arrival by the guards in `apply_quote_result`.

use super::{InputTokenEntry, RouteSnapshot, RoutingStatus};
use crate::quote::{QuoteError, QuoteResponse};
use tracing::debug;

/// What a routing pass decided for one entry
#[derive(Debug, Clone, PartialEq)]
pub enum RouteAction {
    MarkAmountTooSmall,
    MarkSameInputOutput,
    /// Cache hit or request already in flight
    Skip,
    Fetch { amount: u64 },
}

/// Per-entry decision, shared by the tick and edit triggers
pub fn route_action(
    entry: &InputTokenEntry,
    output_token: &str,
    now_ms: u64,
    min_refetch_ms: u64,
) -> RouteAction {
    if entry.amount == 0 {
        return RouteAction::MarkAmountTooSmall;
    }

    if entry.token_address == output_token {
        return RouteAction::MarkSameInputOutput;
    }

    if let Some(route) = &entry.route {
        if route.amount == entry.amount && now_ms.saturating_sub(route.fetched_at) < min_refetch_ms
        {
            return RouteAction::Skip;
        }
    }

    RouteAction::Fetch {
        amount: entry.amount,
    }
}

/// An asynchronous quote request the basket wants issued
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteJob {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
    pub issued_at: u64,
}

/// The input basket: entries plus the single output token.
///
/// Single-writer state; the engine owns it and presentation only reads
/// snapshots of it.
#[derive(Debug, Clone, Default)]
pub struct Basket {
    pub entries: Vec<InputTokenEntry>,
    pub output_token: String,
}

impl Basket {
    pub fn new(output_token: &str) -> Self {
        Self {
            entries: Vec::new(),
            output_token: output_token.to_string(),
        }
    }

    pub fn entry(&self, token_address: &str) -> Option<&InputTokenEntry> {
        self.entries.iter().find(|e| e.token_address == token_address)
    }

    fn entry_mut(&mut self, token_address: &str) -> Option<&mut InputTokenEntry> {
        self.entries.iter_mut().find(|e| e.token_address == token_address)
    }

    pub fn contains(&self, token_address: &str) -> bool {
        self.entry(token_address).is_some()
    }

    /// Add an entry; duplicates are ignored
    pub fn add_entry(&mut self, entry: InputTokenEntry) {
        if !self.contains(&entry.token_address) {
            self.entries.push(entry);
        }
    }

    pub fn remove_entry(&mut self, token_address: &str) {
        self.entries.retain(|e| e.token_address != token_address);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Update an entry's amount from an edit. A changed amount invalidates
    /// the stored route.
    pub fn set_amount(&mut self, token_address: &str, natural_amount: &str, amount: u64) {
        if let Some(entry) = self.entry_mut(token_address) {
            if entry.amount != amount {
                entry.route = None;
            }
            entry.natural_amount = natural_amount.to_string();
            entry.amount = amount;
        }
    }

    /// Switch the output token, invalidating every stored route
    pub fn set_output_token(&mut self, token_address: &str) {
        if self.output_token == token_address {
            return;
        }
        for entry in &mut self.entries {
            entry.route = None;
        }
        self.output_token = token_address.to_string();
    }

    /// Run one routing pass over all entries.
    ///
    /// Applies error statuses synchronously, marks fetches as in-flight
    /// (so repeated passes within the refetch interval issue nothing) and
    /// returns the quote requests to dispatch.
    pub fn plan_routing_pass(&mut self, now_ms: u64, min_refetch_ms: u64) -> Vec<QuoteJob> {
        let output_token = self.output_token.clone();
        let mut jobs = Vec::new();

        for entry in &mut self.entries {
            match route_action(entry, &output_token, now_ms, min_refetch_ms) {
                RouteAction::MarkAmountTooSmall => {
                    entry.status = RoutingStatus::AmountTooSmall;
                    entry.route = None;
                }
                RouteAction::MarkSameInputOutput => {
                    entry.status = RoutingStatus::SameInputOutput;
                    entry.route = None;
                }
                RouteAction::Skip => {}
                RouteAction::Fetch { amount } => {
                    // In-flight marker: doubles as the debounce record
                    entry.status = RoutingStatus::Routing;
                    entry.route = Some(RouteSnapshot {
                        fetched_at: now_ms,
                        amount,
                        quote: None,
                    });
                    jobs.push(QuoteJob {
                        input_mint: entry.token_address.clone(),
                        output_mint: output_token.clone(),
                        amount,
                        issued_at: now_ms,
                    });
                }
            }
        }

        jobs
    }

    /// Guarded write-back for a completed quote request.
    ///
    /// The result is applied only if the output token still matches, the
    /// entry amount still equals the requested amount, and the request is
    /// at least as recent as the stored route. This optimistic-concurrency
    /// check is the sole race-prevention mechanism.
    pub fn apply_quote_result(
        &mut self,
        job: &QuoteJob,
        result: Result<QuoteResponse, QuoteError>,
    ) {
        if self.output_token != job.output_mint {
            debug!(input = %job.input_mint, "dropping quote for stale output token");
            return;
        }

        let Some(entry) = self.entry_mut(&job.input_mint) else {
            return;
        };
        if entry.amount != job.amount {
            debug!(input = %job.input_mint, "dropping quote for stale amount");
            return;
        }
        if let Some(route) = &entry.route {
            if route.fetched_at > job.issued_at {
                debug!(input = %job.input_mint, "dropping quote superseded by newer request");
                return;
            }
        }

        match result {
            Ok(quote) => {
                entry.status = RoutingStatus::Routing;
                entry.route = Some(RouteSnapshot {
                    fetched_at: job.issued_at,
                    amount: job.amount,
                    quote: Some(quote),
                });
            }
            Err(QuoteError::NoRoute) => {
                entry.status = RoutingStatus::NoRoute;
                entry.route = None;
            }
            Err(QuoteError::Unknown(reason)) => {
                debug!(input = %job.input_mint, %reason, "quote failed");
                entry.status = RoutingStatus::UnknownQuoteError;
                entry.route = None;
            }
        }
    }

    /// Entries whose quote is usable for swapping right now
    pub fn swappable_entries(&self) -> Vec<&InputTokenEntry> {
        self.entries.iter().filter(|e| e.usable_quote().is_some()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SOL: &str = "So11111111111111111111111111111111111111112";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    const MIN_REFETCH: u64 = 10_000;

    fn quote_for(amount: u64) -> QuoteResponse {
        serde_json::from_value(json!({
            "inputMint": SOL,
            "inAmount": amount.to_string(),
            "outputMint": USDC,
            "outAmount": "5000",
            "priceImpactPct": "0.0",
        }))
        .unwrap()
    }

    fn basket_with(amount: u64) -> Basket {
        let mut basket = Basket::new(USDC);
        basket.add_entry(InputTokenEntry::new(SOL, "1", amount));
        basket
    }

    #[test]
    fn test_zero_amount_marks_too_small_without_fetch() {
        let mut basket = basket_with(0);
        let jobs = basket.plan_routing_pass(1_000, MIN_REFETCH);
        assert!(jobs.is_empty());
        assert_eq!(basket.entries[0].status, RoutingStatus::AmountTooSmall);
        assert!(basket.entries[0].route.is_none());
    }

    #[test]
    fn test_same_input_output_marks_without_fetch() {
        let mut basket = Basket::new(SOL);
        basket.add_entry(InputTokenEntry::new(SOL, "1", 1_000));
        let jobs = basket.plan_routing_pass(1_000, MIN_REFETCH);
        assert!(jobs.is_empty());
        assert_eq!(basket.entries[0].status, RoutingStatus::SameInputOutput);
    }

    #[test]
    fn test_debounce_one_request_per_interval() {
        let mut basket = basket_with(1_000);

        let first = basket.plan_routing_pass(1_000, MIN_REFETCH);
        assert_eq!(first.len(), 1);

        // Repeated passes inside the interval issue nothing, edits included
        assert!(basket.plan_routing_pass(2_000, MIN_REFETCH).is_empty());
        basket.set_amount(SOL, "1", 1_000);
        assert!(basket.plan_routing_pass(9_000, MIN_REFETCH).is_empty());

        // Once the interval elapses the entry is fetched again
        let later = basket.plan_routing_pass(1_000 + MIN_REFETCH, MIN_REFETCH);
        assert_eq!(later.len(), 1);
    }

    #[test]
    fn test_amount_edit_invalidates_route_and_refetches() {
        let mut basket = basket_with(1_000);
        basket.plan_routing_pass(1_000, MIN_REFETCH);

        basket.set_amount(SOL, "2", 2_000);
        assert!(basket.entries[0].route.is_none());

        let jobs = basket.plan_routing_pass(2_000, MIN_REFETCH);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].amount, 2_000);
    }

    #[test]
    fn test_stale_response_rejected_after_amount_change() {
        let mut basket = basket_with(1_000);
        let old_jobs = basket.plan_routing_pass(1_000, MIN_REFETCH);

        // User edits the amount; a newer request goes out
        basket.set_amount(SOL, "2", 2_000);
        let new_jobs = basket.plan_routing_pass(2_000, MIN_REFETCH);

        // The late response for the old amount must not overwrite anything
        basket.apply_quote_result(&old_jobs[0], Ok(quote_for(1_000)));
        assert!(basket.entries[0].route.as_ref().unwrap().quote.is_none());

        // The response for the new amount lands
        basket.apply_quote_result(&new_jobs[0], Ok(quote_for(2_000)));
        assert!(basket.entries[0].usable_quote().is_some());
    }

    #[test]
    fn test_stale_response_rejected_after_output_change() {
        let mut basket = basket_with(1_000);
        let jobs = basket.plan_routing_pass(1_000, MIN_REFETCH);

        basket.set_output_token(SOL);
        basket.apply_quote_result(&jobs[0], Ok(quote_for(1_000)));
        assert!(basket.entries[0].route.is_none());
    }

    #[test]
    fn test_older_request_cannot_overwrite_newer_route() {
        let mut basket = basket_with(1_000);
        let old_jobs = basket.plan_routing_pass(1_000, MIN_REFETCH);

        // Periodic tick refetches the same amount later
        let new_jobs = basket.plan_routing_pass(1_000 + MIN_REFETCH, MIN_REFETCH);
        basket.apply_quote_result(&new_jobs[0], Ok(quote_for(1_000)));

        let fresh = basket.entries[0].route.clone().unwrap();
        basket.apply_quote_result(&old_jobs[0], Err(QuoteError::Unknown("late".into())));
        assert_eq!(basket.entries[0].route.as_ref(), Some(&fresh));
        assert_eq!(basket.entries[0].status, RoutingStatus::Routing);
    }

    #[test]
    fn test_no_route_error_classification() {
        let mut basket = basket_with(1_000);
        let jobs = basket.plan_routing_pass(1_000, MIN_REFETCH);

        basket.apply_quote_result(&jobs[0], Err(QuoteError::NoRoute));
        assert_eq!(basket.entries[0].status, RoutingStatus::NoRoute);

        // Self-healing: the next pass fetches again
        let retry = basket.plan_routing_pass(2_000, MIN_REFETCH);
        assert_eq!(retry.len(), 1);
    }

    #[test]
    fn test_unknown_error_classification() {
        let mut basket = basket_with(1_000);
        let jobs = basket.plan_routing_pass(1_000, MIN_REFETCH);
        basket.apply_quote_result(&jobs[0], Err(QuoteError::Unknown("boom".into())));
        assert_eq!(basket.entries[0].status, RoutingStatus::UnknownQuoteError);
    }

    #[test]
    fn test_swappable_entries_require_matching_quote() {
        let mut basket = basket_with(1_000);
        basket.add_entry(InputTokenEntry::new("mint-b", "0", 0));

        let jobs = basket.plan_routing_pass(1_000, MIN_REFETCH);
        basket.apply_quote_result(&jobs[0], Ok(quote_for(1_000)));

        let swappable = basket.swappable_entries();
        assert_eq!(swappable.len(), 1);
        assert_eq!(swappable[0].token_address, SOL);
    }
}
