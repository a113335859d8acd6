//! Aggregator wire types
//!
//! The aggregator speaks camelCase JSON with raw amounts encoded as decimal
//! strings. `QuoteResponse` keeps unknown fields so a quote can be passed
//! back verbatim to the instruction-build endpoint.

pub mod client;

pub use client::{HttpQuoteClient, QuoteError, QuoteSource};

use crate::error::{EngineError, EngineResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// Slippage parameters for a quote request, taken from the user settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slippage {
    Auto { max_bps: u32 },
    Fixed { bps: u32 },
}

/// One quote request for an `(input, output, amount)` triple
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    /// Raw integer units
    pub amount: u64,
    pub slippage: Slippage,
    pub max_accounts: u8,
}

impl QuoteRequest {
    /// Query parameters for the aggregator's quote endpoint
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("inputMint", self.input_mint.clone()),
            ("outputMint", self.output_mint.clone()),
            ("amount", self.amount.to_string()),
            ("maxAccounts", self.max_accounts.to_string()),
        ];
        match self.slippage {
            Slippage::Auto { max_bps } => {
                params.push(("autoSlippage", "true".to_string()));
                params.push(("maxAutoSlippageBps", max_bps.to_string()));
            }
            Slippage::Fixed { bps } => {
                params.push(("slippageBps", bps.to_string()));
            }
        }
        params
    }
}

/// Aggregator quote. Unknown fields are preserved for the round trip to
/// the instruction-build endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub input_mint: String,
    pub in_amount: String,
    pub output_mint: String,
    pub out_amount: String,
    pub price_impact_pct: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl QuoteResponse {
    pub fn in_amount_raw(&self) -> EngineResult<u64> {
        self.in_amount
            .parse()
            .map_err(|_| EngineError::Internal(format!("bad quote inAmount: {}", self.in_amount)))
    }

    pub fn out_amount_raw(&self) -> EngineResult<u64> {
        self.out_amount
            .parse()
            .map_err(|_| EngineError::Internal(format!("bad quote outAmount: {}", self.out_amount)))
    }

    pub fn price_impact(&self) -> f64 {
        self.price_impact_pct.parse().unwrap_or(0.0)
    }
}

/// Request for the instruction-build endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstructionsRequest {
    pub user_public_key: String,
    pub quote_response: QuoteResponse,
    pub wrap_and_unwrap_sol: bool,
    pub use_shared_accounts: bool,
    pub dynamic_compute_unit_limit: bool,
}

impl SwapInstructionsRequest {
    pub fn new(user: &Pubkey, quote: QuoteResponse) -> Self {
        Self {
            user_public_key: user.to_string(),
            quote_response: quote,
            wrap_and_unwrap_sol: true,
            use_shared_accounts: true,
            dynamic_compute_unit_limit: true,
        }
    }
}

/// Aggregator-provided instruction set for one swap leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstructionsResponse {
    #[serde(default)]
    pub compute_budget_instructions: Vec<InstructionPayload>,
    #[serde(default)]
    pub setup_instructions: Vec<InstructionPayload>,
    pub swap_instruction: InstructionPayload,
    #[serde(default)]
    pub cleanup_instruction: Option<InstructionPayload>,
    #[serde(default)]
    pub address_lookup_table_addresses: Vec<String>,
}

/// One serialized instruction as the aggregator encodes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionPayload {
    pub program_id: String,
    pub accounts: Vec<AccountMetaPayload>,
    /// Base64-encoded instruction data
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountMetaPayload {
    pub pubkey: String,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl InstructionPayload {
    /// Decode into a runnable instruction
    pub fn to_instruction(&self) -> EngineResult<Instruction> {
        let program_id = Pubkey::from_str(&self.program_id)
            .map_err(|_| EngineError::Assembly(format!("bad program id: {}", self.program_id)))?;

        let mut accounts = Vec::with_capacity(self.accounts.len());
        for meta in &self.accounts {
            let pubkey = Pubkey::from_str(&meta.pubkey)
                .map_err(|_| EngineError::Assembly(format!("bad account key: {}", meta.pubkey)))?;
            accounts.push(if meta.is_writable {
                AccountMeta::new(pubkey, meta.is_signer)
            } else {
                AccountMeta::new_readonly(pubkey, meta.is_signer)
            });
        }

        let data = BASE64
            .decode(&self.data)
            .map_err(|e| EngineError::Assembly(format!("bad instruction data: {}", e)))?;

        Ok(Instruction {
            program_id,
            accounts,
            data,
        })
    }
}
