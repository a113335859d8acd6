//! Solana RPC provider with multi-endpoint support and automatic failover

use crate::chain::LedgerRpc;
use crate::config::RpcConfig;
use crate::error::{EngineError, EngineResult};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::account::Account;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::TransactionConfirmationStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct PriorityFeeResult {
    #[serde(rename = "priorityFeeEstimate")]
    priority_fee_estimate: f64,
}

#[derive(Debug, Deserialize)]
struct PriorityFeeResponse {
    result: Option<PriorityFeeResult>,
}

/// Multi-endpoint RPC wrapper with automatic failover
pub struct RpcProvider {
    config: RpcConfig,
    clients: Vec<RpcClient>,
    /// Current active endpoint index
    current: AtomicUsize,
    /// Separate HTTP client for JSON-RPC extensions the Solana client
    /// does not expose (priority fee estimation)
    http: reqwest::Client,
}

impl RpcProvider {
    pub fn new(config: RpcConfig) -> EngineResult<Self> {
        if config.urls.is_empty() {
            return Err(EngineError::Config("no RPC urls configured".to_string()));
        }

        let timeout = Duration::from_millis(config.request_timeout_ms);
        let clients = config
            .urls
            .iter()
            .map(|url| {
                debug!("Added RPC endpoint: {}", url);
                RpcClient::new_with_timeout(url.clone(), timeout)
            })
            .collect();

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            config,
            clients,
            current: AtomicUsize::new(0),
            http,
        })
    }

    fn client(&self) -> &RpcClient {
        let idx = self.current.load(Ordering::Relaxed);
        &self.clients[idx % self.clients.len()]
    }

    fn active_url(&self) -> &str {
        let idx = self.current.load(Ordering::Relaxed);
        &self.config.urls[idx % self.config.urls.len()]
    }

    /// Switch to the next available endpoint
    fn failover(&self) {
        let current = self.current.load(Ordering::Relaxed);
        let next = (current + 1) % self.clients.len();
        self.current.store(next, Ordering::Relaxed);
        warn!("RPC failover to endpoint {}", next);
    }

}

#[async_trait]
impl LedgerRpc for RpcProvider {
    async fn latest_blockhash(&self) -> EngineResult<Hash> {
        let mut last_error = None;
        for _ in 0..self.clients.len() {
            match self.client().get_latest_blockhash().await {
                Ok(hash) => return Ok(hash),
                Err(e) => {
                    warn!("getLatestBlockhash failed on {}: {}", self.active_url(), e);
                    last_error = Some(e);
                    self.failover();
                }
            }
        }
        Err(all_failed(last_error))
    }

    async fn multiple_accounts(&self, pubkeys: &[Pubkey]) -> EngineResult<Vec<Option<Account>>> {
        let mut last_error = None;
        for _ in 0..self.clients.len() {
            match self.client().get_multiple_accounts(pubkeys).await {
                Ok(accounts) => return Ok(accounts),
                Err(e) => {
                    warn!("getMultipleAccounts failed on {}: {}", self.active_url(), e);
                    last_error = Some(e);
                    self.failover();
                }
            }
        }
        Err(all_failed(last_error))
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> EngineResult<Signature> {
        // Preflight would reject on transient simulation failures and
        // node-side retries would fight the caller's own resubmission.
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };

        let mut last_error = None;
        for _ in 0..self.clients.len() {
            match self
                .client()
                .send_transaction_with_config(transaction, config.clone())
                .await
            {
                Ok(signature) => return Ok(signature),
                Err(e) => {
                    warn!("sendTransaction failed on {}: {}", self.active_url(), e);
                    last_error = Some(e);
                    self.failover();
                }
            }
        }
        Err(all_failed(last_error))
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> EngineResult<Option<TransactionConfirmationStatus>> {
        let mut last_error = None;
        for _ in 0..self.clients.len() {
            match self
                .client()
                .get_signature_statuses(std::slice::from_ref(signature))
                .await
            {
                Ok(statuses) => {
                    return Ok(statuses
                        .value
                        .into_iter()
                        .next()
                        .flatten()
                        .and_then(|status| status.confirmation_status))
                }
                Err(e) => {
                    warn!("getSignatureStatuses failed on {}: {}", self.active_url(), e);
                    last_error = Some(e);
                    self.failover();
                }
            }
        }
        Err(all_failed(last_error))
    }

    async fn priority_fee_estimate(&self) -> EngineResult<u64> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getPriorityFeeEstimate",
            "params": [{
                "accountKeys": [self.config.priority_fee_program],
                "options": { "recommended": true }
            }]
        });

        let response: PriorityFeeResponse = self
            .http
            .post(self.active_url())
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        let estimate = response
            .result
            .map(|r| r.priority_fee_estimate)
            .ok_or_else(|| EngineError::Rpc("priority fee estimate unavailable".to_string()))?;

        Ok(estimate.ceil() as u64)
    }
}

fn all_failed(last_error: Option<solana_client::client_error::ClientError>) -> EngineError {
    match last_error {
        Some(e) => EngineError::from(e),
        None => EngineError::Rpc("no RPC endpoints available".to_string()),
    }
}
