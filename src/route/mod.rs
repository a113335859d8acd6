//! Input basket entries and their routing state

pub mod engine;

pub use engine::{Basket, QuoteJob, RouteAction};

use crate::quote::QuoteResponse;
use serde::{Deserialize, Serialize};

/// Routing state of one basket entry.
///
/// Everything except `Routing` is a recoverable, per-entry error that heals
/// on the next refresh pass. None of these are ever raised as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingStatus {
    Routing,
    NoRoute,
    SameInputOutput,
    AmountTooSmall,
    UnknownQuoteError,
}

impl RoutingStatus {
    pub fn is_error(&self) -> bool {
        *self != RoutingStatus::Routing
    }
}

/// A fetched (or in-flight) route for one entry
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSnapshot {
    /// When the quote request was issued, epoch millis
    pub fetched_at: u64,
    /// The entry amount the request was made for
    pub amount: u64,
    /// Present once the response arrived; `None` marks an in-flight request
    pub quote: Option<QuoteResponse>,
}

/// One row of the input basket.
///
/// `amount` is canonical; `natural_amount` is the user-facing view of it.
/// Editing the text recomputes `amount` and invalidates the route.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTokenEntry {
    pub token_address: String,
    pub natural_amount: String,
    pub amount: u64,
    pub status: RoutingStatus,
    pub route: Option<RouteSnapshot>,
}

impl InputTokenEntry {
    pub fn new(token_address: &str, natural_amount: &str, amount: u64) -> Self {
        Self {
            token_address: token_address.to_string(),
            natural_amount: natural_amount.to_string(),
            amount,
            status: RoutingStatus::Routing,
            route: None,
        }
    }

    /// A quote usable for swapping: routing succeeded and the quote still
    /// matches the current amount.
    pub fn usable_quote(&self) -> Option<&QuoteResponse> {
        if self.status != RoutingStatus::Routing {
            return None;
        }
        let route = self.route.as_ref()?;
        if route.amount != self.amount {
            return None;
        }
        route.quote.as_ref()
    }
}
