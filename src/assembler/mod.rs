//! Transaction assembly
//!
//! Turns one intent's swap-instruction bundles into unsigned v0
//! transactions: resolves address lookup tables in one batched call,
//! rewrites the compute budget, appends the fee-skim transfer where the
//! leg clears the value threshold and compiles everything against a
//! single shared blockhash. Any failure here aborts the whole intent.

use crate::chain::LedgerRpc;
use crate::config::FeeConfig;
use crate::error::{EngineError, EngineResult};
use crate::quote::{InstructionPayload, SwapInstructionsResponse};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use solana_sdk::address_lookup_table::state::AddressLookupTable;
use solana_sdk::address_lookup_table::AddressLookupTableAccount;
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::{v0, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use tracing::debug;

const MICRO_LAMPORTS_PER_LAMPORT: u64 = 1_000_000;

/// SetComputeUnitLimit discriminant in the compute budget program
const COMPUTE_UNIT_LIMIT_TAG: u8 = 2;

/// One leg's raw monetary context plus its instruction bundle
pub struct LegBundle {
    pub instructions: SwapInstructionsResponse,
    /// USD value of the leg's input amount, for the fee-skim threshold
    pub input_value_usd: f64,
}

/// Extract the aggregator's simulated compute unit limit from its
/// compute budget instructions. Absent limit means the bundle is not
/// usable as-is, so the whole assembly fails.
pub fn decode_compute_unit_limit(payloads: &[InstructionPayload]) -> EngineResult<u32> {
    for payload in payloads {
        let data = BASE64
            .decode(&payload.data)
            .map_err(|e| EngineError::Assembly(format!("compute budget data: {}", e)))?;
        if data.len() >= 5 && data[0] == COMPUTE_UNIT_LIMIT_TAG {
            let bytes: [u8; 4] = data[1..5]
                .try_into()
                .map_err(|_| EngineError::Assembly("compute unit limit truncated".to_string()))?;
            return Ok(u32::from_le_bytes(bytes));
        }
    }
    Err(EngineError::Assembly(
        "no compute unit limit instruction in bundle".to_string(),
    ))
}

/// Micro-lamports per compute unit to apply: the network estimate, but
/// never less than the price that pays the fast-lane minimum over the
/// whole budget.
pub fn compute_unit_price(network_estimate: u64, min_fast_lane_fee_lamports: u64, limit: u32) -> u64 {
    let limit = u64::from(limit.max(1));
    let floor =
        (min_fast_lane_fee_lamports * MICRO_LAMPORTS_PER_LAMPORT + limit - 1) / limit;
    network_estimate.max(floor)
}

fn parse_pubkey(value: &str, what: &str) -> EngineResult<Pubkey> {
    Pubkey::from_str(value).map_err(|e| EngineError::Assembly(format!("{} {}: {}", what, value, e)))
}

/// Resolve the union of every leg's lookup tables in one batched account
/// fetch. A table that cannot be fetched or decoded fails the assembly.
pub async fn resolve_lookup_tables(
    rpc: &dyn LedgerRpc,
    legs: &[LegBundle],
) -> EngineResult<HashMap<Pubkey, AddressLookupTableAccount>> {
    let mut keys = BTreeSet::new();
    for leg in legs {
        for address in &leg.instructions.address_lookup_table_addresses {
            keys.insert(parse_pubkey(address, "lookup table")?);
        }
    }
    let keys: Vec<Pubkey> = keys.into_iter().collect();
    if keys.is_empty() {
        return Ok(HashMap::new());
    }

    let accounts = rpc.multiple_accounts(&keys).await?;
    let mut tables = HashMap::with_capacity(keys.len());
    for (key, account) in keys.iter().zip(accounts) {
        let account = account
            .ok_or_else(|| EngineError::Assembly(format!("lookup table {} not found", key)))?;
        let table = AddressLookupTable::deserialize(&account.data)
            .map_err(|e| EngineError::Assembly(format!("lookup table {}: {}", key, e)))?;
        tables.insert(
            *key,
            AddressLookupTableAccount {
                key: *key,
                addresses: table.addresses.to_vec(),
            },
        );
    }
    Ok(tables)
}

/// Final instruction list for one leg, in submission order
pub fn build_leg_instructions(
    payer: &Pubkey,
    bundle: &LegBundle,
    network_estimate: u64,
    fee: &FeeConfig,
) -> EngineResult<Vec<Instruction>> {
    let simulated = decode_compute_unit_limit(&bundle.instructions.compute_budget_instructions)?;
    let limit = simulated.saturating_add(fee.compute_unit_margin);
    let price = compute_unit_price(network_estimate, fee.min_fast_lane_fee_lamports, limit);

    let mut instructions = Vec::with_capacity(bundle.instructions.setup_instructions.len() + 4);
    instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(limit));
    instructions.push(ComputeBudgetInstruction::set_compute_unit_price(price));
    for setup in &bundle.instructions.setup_instructions {
        instructions.push(setup.to_instruction()?);
    }
    instructions.push(bundle.instructions.swap_instruction.to_instruction()?);
    if let Some(cleanup) = &bundle.instructions.cleanup_instruction {
        instructions.push(cleanup.to_instruction()?);
    }

    if bundle.input_value_usd >= fee.min_skim_value_usd {
        let fee_wallet = parse_pubkey(&fee.fee_wallet, "fee wallet")?;
        instructions.push(system_instruction::transfer(
            payer,
            &fee_wallet,
            fee.fee_lamports,
        ));
    }

    Ok(instructions)
}

fn compile_leg(
    payer: &Pubkey,
    instructions: &[Instruction],
    tables: &HashMap<Pubkey, AddressLookupTableAccount>,
    table_addresses: &[String],
    blockhash: Hash,
) -> EngineResult<VersionedTransaction> {
    let mut leg_tables = Vec::with_capacity(table_addresses.len());
    for address in table_addresses {
        let key = parse_pubkey(address, "lookup table")?;
        let table = tables
            .get(&key)
            .ok_or_else(|| EngineError::Assembly(format!("lookup table {} not resolved", key)))?;
        leg_tables.push(table.clone());
    }

    let message = v0::Message::try_compile(payer, instructions, &leg_tables, blockhash)
        .map_err(|e| EngineError::Assembly(format!("message compile: {}", e)))?;
    let signatures =
        vec![Signature::default(); usize::from(message.header.num_required_signatures)];
    Ok(VersionedTransaction {
        signatures,
        message: VersionedMessage::V0(message),
    })
}

/// Assemble every leg of an intent into unsigned transactions sharing one
/// blockhash. Errors here are fatal to the intent.
pub async fn assemble_intent(
    rpc: &dyn LedgerRpc,
    payer: &Pubkey,
    legs: &[LegBundle],
    fee: &FeeConfig,
) -> EngineResult<Vec<VersionedTransaction>> {
    let tables = resolve_lookup_tables(rpc, legs).await?;
    let network_estimate = rpc.priority_fee_estimate().await?;
    let blockhash = rpc.latest_blockhash().await?;
    debug!(
        "assembling {} legs, {} lookup tables, priority fee {}",
        legs.len(),
        tables.len(),
        network_estimate
    );

    let mut transactions = Vec::with_capacity(legs.len());
    for bundle in legs {
        let instructions = build_leg_instructions(payer, bundle, network_estimate, fee)?;
        transactions.push(compile_leg(
            payer,
            &instructions,
            &tables,
            &bundle.instructions.address_lookup_table_addresses,
            blockhash,
        )?);
    }
    Ok(transactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::AccountMetaPayload;
    use async_trait::async_trait;
    use solana_sdk::account::Account;
    use solana_sdk::transaction::VersionedTransaction;
    use solana_transaction_status::TransactionConfirmationStatus;

    fn fee_config() -> FeeConfig {
        FeeConfig {
            fee_wallet: Pubkey::new_unique().to_string(),
            fee_lamports: 1_000_000,
            min_skim_value_usd: 20.0,
            compute_unit_margin: 1_000,
            min_fast_lane_fee_lamports: 100_000,
        }
    }

    fn budget_payload(limit: u32) -> InstructionPayload {
        let mut data = vec![COMPUTE_UNIT_LIMIT_TAG];
        data.extend_from_slice(&limit.to_le_bytes());
        InstructionPayload {
            program_id: solana_sdk::compute_budget::id().to_string(),
            accounts: vec![],
            data: BASE64.encode(data),
        }
    }

    fn transfer_like_payload(program_id: Pubkey, writable: Pubkey) -> InstructionPayload {
        InstructionPayload {
            program_id: program_id.to_string(),
            accounts: vec![AccountMetaPayload {
                pubkey: writable.to_string(),
                is_signer: false,
                is_writable: true,
            }],
            data: BASE64.encode([7u8, 0, 0, 0]),
        }
    }

    fn bundle(limit: u32, input_value_usd: f64) -> LegBundle {
        LegBundle {
            instructions: SwapInstructionsResponse {
                compute_budget_instructions: vec![budget_payload(limit)],
                setup_instructions: vec![transfer_like_payload(
                    Pubkey::new_unique(),
                    Pubkey::new_unique(),
                )],
                swap_instruction: transfer_like_payload(
                    Pubkey::new_unique(),
                    Pubkey::new_unique(),
                ),
                cleanup_instruction: None,
                address_lookup_table_addresses: vec![],
            },
            input_value_usd,
        }
    }

    struct FakeRpc {
        accounts: HashMap<Pubkey, Account>,
    }

    #[async_trait]
    impl LedgerRpc for FakeRpc {
        async fn latest_blockhash(&self) -> EngineResult<Hash> {
            Ok(Hash::new_unique())
        }

        async fn multiple_accounts(
            &self,
            pubkeys: &[Pubkey],
        ) -> EngineResult<Vec<Option<Account>>> {
            Ok(pubkeys
                .iter()
                .map(|key| self.accounts.get(key).cloned())
                .collect())
        }

        async fn send_transaction(
            &self,
            _transaction: &VersionedTransaction,
        ) -> EngineResult<Signature> {
            Ok(Signature::default())
        }

        async fn signature_status(
            &self,
            _signature: &Signature,
        ) -> EngineResult<Option<TransactionConfirmationStatus>> {
            Ok(None)
        }

        async fn priority_fee_estimate(&self) -> EngineResult<u64> {
            Ok(50_000)
        }
    }

    #[test]
    fn test_compute_unit_limit_decoded_from_bundle() {
        let payloads = vec![budget_payload(240_000)];
        assert_eq!(decode_compute_unit_limit(&payloads).unwrap(), 240_000);
    }

    #[test]
    fn test_missing_compute_unit_limit_is_fatal() {
        let unrelated = InstructionPayload {
            program_id: solana_sdk::compute_budget::id().to_string(),
            accounts: vec![],
            data: BASE64.encode([3u8, 0, 0, 0, 0, 0, 0, 0, 0]),
        };
        assert!(decode_compute_unit_limit(&[unrelated]).is_err());
        assert!(decode_compute_unit_limit(&[]).is_err());
    }

    #[test]
    fn test_compute_unit_price_takes_the_larger_of_both() {
        // floor = ceil(100_000 * 1e6 / 200_000) = 500_000
        assert_eq!(compute_unit_price(50_000, 100_000, 200_000), 500_000);
        assert_eq!(compute_unit_price(750_000, 100_000, 200_000), 750_000);
        // rounding up, not truncating
        assert_eq!(compute_unit_price(0, 1, 3_000_000), 1);
    }

    #[test]
    fn test_leg_instruction_order_and_margin() {
        let payer = Pubkey::new_unique();
        let fee = fee_config();
        let bundle = bundle(200_000, 0.0);

        let instructions = build_leg_instructions(&payer, &bundle, 50_000, &fee).unwrap();
        // budget limit, budget price, setup, swap; below threshold so no skim
        assert_eq!(instructions.len(), 4);
        assert_eq!(instructions[0].program_id, solana_sdk::compute_budget::id());
        assert_eq!(instructions[0].data[0], COMPUTE_UNIT_LIMIT_TAG);
        let applied = u32::from_le_bytes(instructions[0].data[1..5].try_into().unwrap());
        assert_eq!(applied, 201_000);
        assert_eq!(instructions[1].program_id, solana_sdk::compute_budget::id());
    }

    #[test]
    fn test_fee_skim_threshold_boundary() {
        let payer = Pubkey::new_unique();
        let fee = fee_config();

        let at_threshold = build_leg_instructions(&payer, &bundle(200_000, 20.0), 0, &fee).unwrap();
        assert_eq!(
            at_threshold.last().unwrap().program_id,
            solana_sdk::system_program::id()
        );

        let below = build_leg_instructions(&payer, &bundle(200_000, 19.99), 0, &fee).unwrap();
        assert_ne!(
            below.last().unwrap().program_id,
            solana_sdk::system_program::id()
        );
        assert_eq!(at_threshold.len(), below.len() + 1);
    }

    #[tokio::test]
    async fn test_missing_lookup_table_fails_assembly() {
        let rpc = FakeRpc {
            accounts: HashMap::new(),
        };
        let mut leg = bundle(200_000, 0.0);
        leg.instructions.address_lookup_table_addresses =
            vec![Pubkey::new_unique().to_string()];

        let payer = Pubkey::new_unique();
        let result = assemble_intent(&rpc, &payer, &[leg], &fee_config()).await;
        assert!(matches!(result, Err(EngineError::Assembly(_))));
    }

    #[tokio::test]
    async fn test_assemble_without_tables_compiles_v0_payloads() {
        let rpc = FakeRpc {
            accounts: HashMap::new(),
        };
        let payer = Pubkey::new_unique();
        let legs = vec![bundle(200_000, 25.0), bundle(180_000, 1.0)];

        let txs = assemble_intent(&rpc, &payer, &legs, &fee_config()).await.unwrap();
        assert_eq!(txs.len(), 2);
        for tx in &txs {
            assert!(matches!(tx.message, VersionedMessage::V0(_)));
            assert_eq!(
                tx.signatures.len(),
                usize::from(tx.message.header().num_required_signatures)
            );
            // unsigned until the wallet signs
            assert_eq!(tx.signatures[0], Signature::default());
        }
        // both legs share one blockhash
        assert_eq!(
            txs[0].message.recent_blockhash(),
            txs[1].message.recent_blockhash()
        );
    }
}
