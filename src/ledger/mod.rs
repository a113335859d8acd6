//! Swap intent ledger
//!
//! Pure state machine over intents and their transaction legs, no I/O.
//! Intents are append-only (newest first); per-leg fields are mutated only
//! through the narrow contracts below, driven by the submission
//! coordinator. No transition reverses.

use crate::error::{EngineError, EngineResult};
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use uuid::Uuid;

/// Intent lifecycle.
///
/// `Completed` means "no longer pending", not "every leg succeeded":
/// it is reached even when some legs ended `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    Swapping,
    Processing,
    Sent,
    Completed,
    CreateFailed,
}

impl IntentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IntentStatus::Completed | IntentStatus::CreateFailed)
    }
}

/// Per-leg lifecycle; `Confirmed` and `Failed` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegStatus {
    Pending,
    Confirmed,
    Failed,
}

/// One transaction leg of an intent. Legs are independent: failure of one
/// never blocks or rolls back another.
#[derive(Debug, Clone)]
pub struct SwapTransactionInfo {
    pub input_token_address: String,
    pub in_amount: u64,
    pub payload: Option<VersionedTransaction>,
    pub status: LegStatus,
    pub signature: Option<Signature>,
}

/// What the confirm-time snapshot recorded for one leg
#[derive(Debug, Clone)]
pub struct LegSeed {
    pub input_token_address: String,
    pub in_amount: u64,
    pub out_amount: u64,
}

/// One atomic batch of swap legs, created the instant the user confirms
#[derive(Debug, Clone)]
pub struct SwapIntent {
    pub intent_id: Uuid,
    pub user_address: String,
    pub created_at: u64,
    pub output_token: String,
    /// Sum of the included quotes' output amounts
    pub total_out_amount: u64,
    pub transactions: Vec<SwapTransactionInfo>,
    pub status: IntentStatus,
}

/// Append-only intent history, newest first
#[derive(Debug, Clone, Default)]
pub struct IntentLedger {
    intents: Vec<SwapIntent>,
}

impl IntentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an intent from a snapshot of swappable legs.
    ///
    /// Returns `None` when no legs qualify; callers exclude unusable
    /// entries before calling, silently and without error.
    pub fn create_intent(
        &mut self,
        user_address: &str,
        output_token: &str,
        created_at: u64,
        legs: Vec<LegSeed>,
    ) -> Option<Uuid> {
        if legs.is_empty() {
            return None;
        }

        let intent_id = Uuid::new_v4();
        let total_out_amount = legs.iter().map(|leg| leg.out_amount).sum();
        let transactions = legs
            .into_iter()
            .map(|leg| SwapTransactionInfo {
                input_token_address: leg.input_token_address,
                in_amount: leg.in_amount,
                payload: None,
                status: LegStatus::Pending,
                signature: None,
            })
            .collect();

        self.intents.insert(
            0,
            SwapIntent {
                intent_id,
                user_address: user_address.to_string(),
                created_at,
                output_token: output_token.to_string(),
                total_out_amount,
                transactions,
                status: IntentStatus::Swapping,
            },
        );

        Some(intent_id)
    }

    /// Intent history, newest first
    pub fn intents(&self) -> &[SwapIntent] {
        &self.intents
    }

    pub fn intent(&self, intent_id: Uuid) -> Option<&SwapIntent> {
        self.intents.iter().find(|i| i.intent_id == intent_id)
    }

    fn intent_mut(&mut self, intent_id: Uuid) -> EngineResult<&mut SwapIntent> {
        self.intents
            .iter_mut()
            .find(|i| i.intent_id == intent_id)
            .ok_or_else(|| EngineError::IntentNotFound {
                intent_id: intent_id.to_string(),
            })
    }

    /// Record an assembled payload for one leg
    pub fn set_leg_payload(
        &mut self,
        intent_id: Uuid,
        leg_index: usize,
        payload: VersionedTransaction,
    ) -> EngineResult<()> {
        let intent = self.intent_mut(intent_id)?;
        if intent.status != IntentStatus::Swapping {
            return Err(invalid_transition(intent.status, "set payload"));
        }
        let leg = intent
            .transactions
            .get_mut(leg_index)
            .ok_or_else(|| EngineError::Internal(format!("no leg {}", leg_index)))?;
        leg.payload = Some(payload);
        Ok(())
    }

    /// Transition `Swapping -> Processing` exactly once, when every leg
    /// holds its built payload. Repeated arrivals of the all-ready
    /// condition return false and must not re-trigger submission.
    pub fn try_begin_processing(&mut self, intent_id: Uuid) -> bool {
        let Some(intent) = self.intents.iter_mut().find(|i| i.intent_id == intent_id) else {
            return false;
        };
        if intent.status != IntentStatus::Swapping {
            return false;
        }
        if intent.transactions.iter().any(|leg| leg.payload.is_none()) {
            return false;
        }
        intent.status = IntentStatus::Processing;
        true
    }

    /// Record the signed payloads' signatures and transition
    /// `Processing -> Sent`.
    pub fn mark_sent(&mut self, intent_id: Uuid, signatures: Vec<Signature>) -> EngineResult<()> {
        let intent = self.intent_mut(intent_id)?;
        if intent.status != IntentStatus::Processing {
            return Err(invalid_transition(intent.status, "Sent"));
        }
        for (leg, signature) in intent.transactions.iter_mut().zip(signatures) {
            leg.signature = Some(signature);
        }
        intent.status = IntentStatus::Sent;
        Ok(())
    }

    /// Transition `Sent -> Completed` once submission settled, regardless
    /// of individual leg outcomes.
    pub fn mark_completed(&mut self, intent_id: Uuid) -> EngineResult<()> {
        let intent = self.intent_mut(intent_id)?;
        if intent.status != IntentStatus::Sent {
            return Err(invalid_transition(intent.status, "Completed"));
        }
        intent.status = IntentStatus::Completed;
        Ok(())
    }

    /// Assembly or signing failed before reaching `Sent`
    pub fn mark_create_failed(&mut self, intent_id: Uuid) -> EngineResult<()> {
        let intent = self.intent_mut(intent_id)?;
        if !matches!(intent.status, IntentStatus::Swapping | IntentStatus::Processing) {
            return Err(invalid_transition(intent.status, "CreateFailed"));
        }
        intent.status = IntentStatus::CreateFailed;
        Ok(())
    }

    /// Terminal per-leg outcome; ignored if the leg already settled
    pub fn record_leg_outcome(&mut self, intent_id: Uuid, leg_index: usize, confirmed: bool) {
        if let Some(intent) = self.intents.iter_mut().find(|i| i.intent_id == intent_id) {
            if let Some(leg) = intent.transactions.get_mut(leg_index) {
                if leg.status == LegStatus::Pending {
                    leg.status = if confirmed {
                        LegStatus::Confirmed
                    } else {
                        LegStatus::Failed
                    };
                }
            }
        }
    }
}

fn invalid_transition(from: IntentStatus, to: &str) -> EngineError {
    EngineError::InvalidStateTransition {
        from: format!("{:?}", from),
        to: to.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::message::VersionedMessage;

    fn seeds(n: usize) -> Vec<LegSeed> {
        (0..n)
            .map(|i| LegSeed {
                input_token_address: format!("mint-{}", i),
                in_amount: 1_000 * (i as u64 + 1),
                out_amount: 500 * (i as u64 + 1),
            })
            .collect()
    }

    fn dummy_payload() -> VersionedTransaction {
        VersionedTransaction {
            signatures: vec![],
            message: VersionedMessage::Legacy(solana_sdk::message::Message::default()),
        }
    }

    fn ledger_with_intent(legs: usize) -> (IntentLedger, Uuid) {
        let mut ledger = IntentLedger::new();
        let id = ledger
            .create_intent("user", "out-mint", 1_000, seeds(legs))
            .unwrap();
        (ledger, id)
    }

    #[test]
    fn test_no_intent_without_qualifying_legs() {
        let mut ledger = IntentLedger::new();
        assert!(ledger.create_intent("user", "out-mint", 1_000, vec![]).is_none());
        assert!(ledger.intents().is_empty());
    }

    #[test]
    fn test_total_out_amount_sums_included_quotes() {
        let (ledger, id) = ledger_with_intent(3);
        assert_eq!(ledger.intent(id).unwrap().total_out_amount, 500 + 1_000 + 1_500);
    }

    #[test]
    fn test_intents_are_prepended() {
        let mut ledger = IntentLedger::new();
        let first = ledger.create_intent("user", "out", 1, seeds(1)).unwrap();
        let second = ledger.create_intent("user", "out", 2, seeds(1)).unwrap();
        assert_eq!(ledger.intents()[0].intent_id, second);
        assert_eq!(ledger.intents()[1].intent_id, first);
    }

    #[test]
    fn test_processing_requires_all_payloads_and_fires_once() {
        let (mut ledger, id) = ledger_with_intent(2);

        assert!(!ledger.try_begin_processing(id));

        ledger.set_leg_payload(id, 0, dummy_payload()).unwrap();
        assert!(!ledger.try_begin_processing(id));

        ledger.set_leg_payload(id, 1, dummy_payload()).unwrap();
        assert!(ledger.try_begin_processing(id));

        // The all-ready condition arriving again must not double-trigger
        assert!(!ledger.try_begin_processing(id));
        assert_eq!(ledger.intent(id).unwrap().status, IntentStatus::Processing);
    }

    #[test]
    fn test_full_lifecycle_to_completed() {
        let (mut ledger, id) = ledger_with_intent(1);
        ledger.set_leg_payload(id, 0, dummy_payload()).unwrap();
        assert!(ledger.try_begin_processing(id));
        ledger.mark_sent(id, vec![Signature::default()]).unwrap();
        ledger.mark_completed(id).unwrap();

        let intent = ledger.intent(id).unwrap();
        assert_eq!(intent.status, IntentStatus::Completed);
        assert!(intent.transactions[0].signature.is_some());
    }

    #[test]
    fn test_create_failed_only_before_sent() {
        let (mut ledger, id) = ledger_with_intent(1);
        ledger.set_leg_payload(id, 0, dummy_payload()).unwrap();
        assert!(ledger.try_begin_processing(id));
        ledger.mark_create_failed(id).unwrap();
        assert_eq!(ledger.intent(id).unwrap().status, IntentStatus::CreateFailed);

        let (mut ledger, id) = ledger_with_intent(1);
        ledger.set_leg_payload(id, 0, dummy_payload()).unwrap();
        ledger.try_begin_processing(id);
        ledger.mark_sent(id, vec![Signature::default()]).unwrap();
        assert!(ledger.mark_create_failed(id).is_err());
    }

    #[test]
    fn test_completed_requires_sent() {
        let (mut ledger, id) = ledger_with_intent(1);
        assert!(ledger.mark_completed(id).is_err());
    }

    #[test]
    fn test_leg_outcomes_are_independent() {
        let (mut ledger, id) = ledger_with_intent(3);

        ledger.record_leg_outcome(id, 1, false);
        let intent = ledger.intent(id).unwrap();
        assert_eq!(intent.transactions[0].status, LegStatus::Pending);
        assert_eq!(intent.transactions[1].status, LegStatus::Failed);
        assert_eq!(intent.transactions[2].status, LegStatus::Pending);

        // Siblings remain eligible to confirm
        ledger.record_leg_outcome(id, 0, true);
        ledger.record_leg_outcome(id, 2, true);
        let intent = ledger.intent(id).unwrap();
        assert_eq!(intent.transactions[0].status, LegStatus::Confirmed);
        assert_eq!(intent.transactions[2].status, LegStatus::Confirmed);
    }

    #[test]
    fn test_leg_outcome_is_terminal() {
        let (mut ledger, id) = ledger_with_intent(1);
        ledger.record_leg_outcome(id, 0, false);
        ledger.record_leg_outcome(id, 0, true);
        assert_eq!(
            ledger.intent(id).unwrap().transactions[0].status,
            LegStatus::Failed
        );
    }
}
