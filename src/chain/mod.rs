//! Chain module - Solana RPC access
//!
//! This module provides:
//! - Multi-RPC provider management with automatic failover
//! - Transaction submission and signature status polling
//! - Priority fee estimation scoped to the aggregator program

pub mod provider;

pub use provider::RpcProvider;

use crate::error::EngineResult;

use async_trait::async_trait;
use solana_sdk::account::Account;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::TransactionConfirmationStatus;

/// RPC surface the engine depends on; test doubles implement this
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Latest blockhash, shared across every leg of one assembly pass
    async fn latest_blockhash(&self) -> EngineResult<Hash>;

    /// Fetch raw accounts in one batched call; missing accounts are `None`
    async fn multiple_accounts(&self, pubkeys: &[Pubkey]) -> EngineResult<Vec<Option<Account>>>;

    /// Submit a signed transaction. Preflight simulation is skipped and
    /// node-side resubmission disabled; retries are owned by the caller.
    async fn send_transaction(&self, transaction: &VersionedTransaction)
        -> EngineResult<Signature>;

    /// Confirmation status for a signature, `None` while unobserved
    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> EngineResult<Option<TransactionConfirmationStatus>>;

    /// Recommended priority fee in micro-lamports per compute unit
    async fn priority_fee_estimate(&self) -> EngineResult<u64>;
}
