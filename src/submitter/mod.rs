//! Transaction submission and confirmation
//!
//! Each leg of an intent is driven independently and concurrently:
//! submit, poll the signature until it confirms or the attempt times
//! out, resubmit the same signed payload up to the attempt budget.
//! Outcomes flow back through the ledger only; a failed leg never stops
//! its siblings, and the intent always ends `Completed`.

use crate::chain::LedgerRpc;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::ledger::IntentLedger;
use crate::metrics;

use futures::future::join_all;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::TransactionConfirmationStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct SubmitterConfig {
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub confirm_timeout: Duration,
}

impl From<&EngineConfig> for SubmitterConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.submit_max_attempts,
            poll_interval: Duration::from_millis(config.confirm_poll_interval_ms),
            confirm_timeout: Duration::from_millis(config.confirm_timeout_ms),
        }
    }
}

/// Poll one signature until it confirms or the attempt window closes
async fn await_confirmation(
    rpc: &dyn LedgerRpc,
    signature: &solana_sdk::signature::Signature,
    config: &SubmitterConfig,
) -> bool {
    let deadline = Instant::now() + config.confirm_timeout;
    loop {
        tokio::time::sleep(config.poll_interval).await;
        match rpc.signature_status(signature).await {
            Ok(Some(
                TransactionConfirmationStatus::Confirmed
                | TransactionConfirmationStatus::Finalized,
            )) => return true,
            Ok(_) => {}
            Err(e) => warn!("status poll for {} failed: {}", signature, e),
        }
        if Instant::now() >= deadline {
            return false;
        }
    }
}

/// Submit one signed payload with a bounded retry budget. The same
/// payload is resubmitted on every attempt; the blockhash bounds how
/// long it stays landable.
async fn submit_leg(
    rpc: &dyn LedgerRpc,
    leg_index: usize,
    payload: &VersionedTransaction,
    config: &SubmitterConfig,
) -> bool {
    for attempt in 1..=config.max_attempts {
        metrics::record_submission_attempt();
        match rpc.send_transaction(payload).await {
            Ok(signature) => {
                debug!(
                    "leg {} attempt {}/{} sent as {}",
                    leg_index, attempt, config.max_attempts, signature
                );
                if await_confirmation(rpc, &signature, config).await {
                    info!("leg {} confirmed as {}", leg_index, signature);
                    return true;
                }
                warn!(
                    "leg {} attempt {}/{} expired unconfirmed",
                    leg_index, attempt, config.max_attempts
                );
            }
            Err(e) => warn!(
                "leg {} attempt {}/{} send failed: {}",
                leg_index, attempt, config.max_attempts, e
            ),
        }
    }
    false
}

/// Drive every leg of a sent intent to a terminal status, then mark the
/// intent `Completed` regardless of individual outcomes.
pub async fn submit_intent(
    rpc: Arc<dyn LedgerRpc>,
    ledger: Arc<RwLock<IntentLedger>>,
    intent_id: Uuid,
    legs: Vec<VersionedTransaction>,
    config: SubmitterConfig,
) -> EngineResult<()> {
    let outcomes = join_all(legs.iter().enumerate().map(|(leg_index, payload)| {
        let rpc = Arc::clone(&rpc);
        async move { (leg_index, submit_leg(rpc.as_ref(), leg_index, payload, &config).await) }
    }))
    .await;

    {
        let mut ledger = ledger.write().await;
        for (leg_index, confirmed) in outcomes {
            ledger.record_leg_outcome(intent_id, leg_index, confirmed);
            if confirmed {
                metrics::record_leg_confirmed();
            } else {
                metrics::record_leg_failed();
            }
        }
        ledger.mark_completed(intent_id)?;
    }
    metrics::record_intent_completed();
    info!("intent {} completed", intent_id);
    Ok(())
}
