//! Swap engine
//!
//! Owns all mutable state (catalog sources, the input basket, user
//! settings, the intent ledger) behind `RwLock`s and exposes the
//! user-intent surface presentation calls into. External collaborators
//! sit behind the seam traits so everything here runs against in-memory
//! fakes in tests.
//!
//! All entry mutation and route fetching is suppressed until the
//! catalog has merged at least once.

pub mod signer;

pub use signer::{KeypairSigner, WalletSigner};

use crate::assembler::{self, LegBundle};
use crate::assets::AssetSource;
use crate::chain::LedgerRpc;
use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{IntentLedger, LegSeed};
use crate::metrics;
use crate::quote::{QuoteRequest, QuoteSource, Slippage, SwapInstructionsRequest};
use crate::route::engine::Basket;
use crate::route::InputTokenEntry;
use crate::settings::GlobalSettings;
use crate::submitter::{self, SubmitterConfig};
use crate::token::{
    self, convert_natural_to_raw, convert_raw_to_natural, CatalogSources, Token, TokenCatalog,
};

use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// A leg snapshot taken at confirm time, before any async work
struct LegSnapshot {
    token_address: String,
    in_amount: u64,
    input_value_usd: f64,
    quote: crate::quote::QuoteResponse,
}

pub struct SwapEngine {
    config: Settings,
    settings_path: PathBuf,

    quote_source: Arc<dyn QuoteSource>,
    rpc: Arc<dyn LedgerRpc>,
    assets: Arc<dyn AssetSource>,
    signer: Arc<dyn WalletSigner>,

    basket: RwLock<Basket>,
    sources: RwLock<CatalogSources>,
    catalog: RwLock<Option<TokenCatalog>>,
    settings: RwLock<GlobalSettings>,
    ledger: Arc<RwLock<IntentLedger>>,

    shutdown: Arc<RwLock<bool>>,
}

impl SwapEngine {
    pub fn new(
        config: Settings,
        quote_source: Arc<dyn QuoteSource>,
        rpc: Arc<dyn LedgerRpc>,
        assets: Arc<dyn AssetSource>,
        signer: Arc<dyn WalletSigner>,
    ) -> EngineResult<Self> {
        let settings_path = PathBuf::from(&config.user_settings.path);
        let settings = GlobalSettings::load(&settings_path)?;
        let basket = Basket::new(&config.engine.quote_token_mint);

        Ok(Self {
            config,
            settings_path,
            quote_source,
            rpc,
            assets,
            signer,
            basket: RwLock::new(basket),
            sources: RwLock::new(CatalogSources::default()),
            catalog: RwLock::new(None),
            settings: RwLock::new(settings),
            ledger: Arc::new(RwLock::new(IntentLedger::new())),
            shutdown: Arc::new(RwLock::new(false)),
        })
    }

    pub fn ledger(&self) -> Arc<RwLock<IntentLedger>> {
        Arc::clone(&self.ledger)
    }

    pub async fn shutdown(&self) {
        *self.shutdown.write().await = true;
    }

    // ---- catalog -----------------------------------------------------

    /// Rebuild the catalog from the current sources. A not-yet-ready
    /// source set leaves the catalog `None`.
    async fn rebuild_catalog(&self) {
        let allow_untrusted = self.settings.read().await.allow_untrusted_tokens;
        let sources = self.sources.read().await;
        let protocol = [token::sol_token(), token::usdc_token()];
        let merged = token::catalog::merge(&sources, &protocol, allow_untrusted);
        drop(sources);

        if let Some(catalog) = &merged {
            debug!("catalog rebuilt with {} tokens", catalog.len());
        }
        *self.catalog.write().await = merged;
    }

    pub async fn refresh_wallet_assets(&self) -> EngineResult<()> {
        let owner = self.signer.pubkey();
        let assets = self.assets.wallet_assets(&owner).await?;
        self.sources.write().await.wallet_assets = Some(assets);
        self.rebuild_catalog().await;
        Ok(())
    }

    pub async fn refresh_registry(&self) -> EngineResult<()> {
        let registry = self.assets.token_registry().await?;
        self.sources.write().await.registry = Some(registry);
        self.rebuild_catalog().await;
        Ok(())
    }

    /// Catalog snapshot for rendering, `None` until all sources reported
    pub async fn catalog(&self) -> Option<TokenCatalog> {
        self.catalog.read().await.clone()
    }

    async fn catalog_token(&self, address: &str) -> EngineResult<Token> {
        let catalog = self.catalog.read().await;
        let catalog = catalog.as_ref().ok_or(EngineError::CatalogNotReady)?;
        catalog
            .get(address)
            .cloned()
            .ok_or_else(|| EngineError::Internal(format!("unknown token {}", address)))
    }

    // ---- user settings -----------------------------------------------

    pub async fn settings(&self) -> GlobalSettings {
        *self.settings.read().await
    }

    /// Persist new settings; a toggled trust filter rebuilds the catalog
    pub async fn update_settings(&self, new: GlobalSettings) -> EngineResult<()> {
        let changed_trust = {
            let mut settings = self.settings.write().await;
            let changed = settings.allow_untrusted_tokens != new.allow_untrusted_tokens;
            *settings = new;
            new.save(&self.settings_path)?;
            changed
        };
        if changed_trust {
            self.rebuild_catalog().await;
        }
        Ok(())
    }

    // ---- basket edits ------------------------------------------------

    pub async fn basket(&self) -> Basket {
        self.basket.read().await.clone()
    }

    pub async fn add_input_token(&self, token_address: &str) -> EngineResult<()> {
        self.catalog_token(token_address).await?;
        self.basket
            .write()
            .await
            .add_entry(InputTokenEntry::new(token_address, "", 0));
        self.route_pass().await;
        Ok(())
    }

    /// Append every dust holding as an input entry at its full balance
    pub async fn add_dust_input_tokens(&self) -> EngineResult<()> {
        let dust_ceiling = self.config.engine.dust_max_value_usd;
        let catalog = self
            .catalog
            .read()
            .await
            .clone()
            .ok_or(EngineError::CatalogNotReady)?;

        let mut basket = self.basket.write().await;
        for token in catalog.iter() {
            if !token.is_dust(dust_ceiling)
                || token.address == basket.output_token
                || basket.contains(&token.address)
            {
                continue;
            }
            let balance = token.balance.unwrap_or(0);
            let natural = convert_raw_to_natural(token.decimals, balance);
            basket.add_entry(InputTokenEntry::new(
                &token.address,
                &natural.to_string(),
                balance,
            ));
        }
        drop(basket);

        self.route_pass().await;
        Ok(())
    }

    pub async fn set_input_token_amount(
        &self,
        token_address: &str,
        natural_amount: &str,
    ) -> EngineResult<()> {
        let token = self.catalog_token(token_address).await?;
        let amount = convert_natural_to_raw(token.decimals, natural_amount);
        self.basket
            .write()
            .await
            .set_amount(token_address, natural_amount, amount);
        self.route_pass().await;
        Ok(())
    }

    /// Set every entry to a percentage of its held balance
    pub async fn set_input_tokens_percentage_amount(&self, percentage: f64) -> EngineResult<()> {
        let catalog = self
            .catalog
            .read()
            .await
            .clone()
            .ok_or(EngineError::CatalogNotReady)?;
        let fraction = (percentage / 100.0).clamp(0.0, 1.0);

        let mut basket = self.basket.write().await;
        let addresses: Vec<String> =
            basket.entries.iter().map(|e| e.token_address.clone()).collect();
        for address in addresses {
            let Some(token) = catalog.get(&address) else {
                continue;
            };
            let amount = (token.balance.unwrap_or(0) as f64 * fraction) as u64;
            let natural = convert_raw_to_natural(token.decimals, amount);
            basket.set_amount(&address, &natural.to_string(), amount);
        }
        drop(basket);

        self.route_pass().await;
        Ok(())
    }

    pub async fn remove_input_token(&self, token_address: &str) {
        self.basket.write().await.remove_entry(token_address);
        self.route_pass().await;
    }

    pub async fn clear_input_tokens(&self) {
        self.basket.write().await.clear();
    }

    pub async fn set_output_token(&self, token_address: &str) -> EngineResult<()> {
        self.catalog_token(token_address).await?;
        self.basket.write().await.set_output_token(token_address);
        self.route_pass().await;
        Ok(())
    }

    // ---- routing -----------------------------------------------------

    async fn slippage(&self) -> Slippage {
        let settings = self.settings.read().await;
        if settings.auto_slippage {
            Slippage::Auto {
                max_bps: settings.max_auto_slippage_bps,
            }
        } else {
            Slippage::Fixed {
                bps: settings.max_slippage_bps,
            }
        }
    }

    /// One routing pass: plan, dispatch concurrently, write back guarded
    pub async fn route_pass(&self) {
        if self.catalog.read().await.is_none() {
            return;
        }

        let jobs = {
            let mut basket = self.basket.write().await;
            basket.plan_routing_pass(now_ms(), self.config.engine.min_route_refetch_interval_ms)
        };
        if jobs.is_empty() {
            return;
        }

        let slippage = self.slippage().await;
        let max_accounts = self.config.quote_max_accounts();

        let results = join_all(jobs.into_iter().map(|job| {
            let quote_source = Arc::clone(&self.quote_source);
            async move {
                let request = QuoteRequest {
                    input_mint: job.input_mint.clone(),
                    output_mint: job.output_mint.clone(),
                    amount: job.amount,
                    slippage,
                    max_accounts,
                };
                let started = std::time::Instant::now();
                let result = quote_source.quote(&request).await;
                metrics::record_quote_latency(started.elapsed().as_secs_f64());
                metrics::record_quote_outcome(match &result {
                    Ok(_) => "ok",
                    Err(crate::quote::QuoteError::NoRoute) => "no_route",
                    Err(_) => "error",
                });
                (job, result)
            }
        }))
        .await;

        let mut basket = self.basket.write().await;
        for (job, result) in results {
            basket.apply_quote_result(&job, result);
        }
    }

    // ---- swapping ----------------------------------------------------

    /// Confirm-time snapshot of every entry with a usable quote
    async fn snapshot_swappable(&self) -> EngineResult<Vec<LegSnapshot>> {
        let catalog = self.catalog.read().await;
        let catalog = catalog.as_ref().ok_or(EngineError::CatalogNotReady)?;

        let basket = self.basket.read().await;
        let mut snapshots = Vec::new();
        for entry in basket.swappable_entries() {
            let Some(quote) = entry.usable_quote() else {
                continue;
            };
            let price = catalog
                .get(&entry.token_address)
                .and_then(|t| t.price)
                .unwrap_or(0.0);
            let natural: f64 = entry.natural_amount.parse().unwrap_or(0.0);
            snapshots.push(LegSnapshot {
                token_address: entry.token_address.clone(),
                in_amount: entry.amount,
                input_value_usd: natural * price,
                quote: quote.clone(),
            });
        }
        Ok(snapshots)
    }

    /// Swap everything swappable in one user action.
    ///
    /// Entries without a usable quote are silently excluded. Returns the
    /// intent id, or `None` when nothing qualified. Failures after the
    /// intent exists surface as `CreateFailed` on the intent, not as an
    /// error from this method.
    pub async fn swap_all_routes(&self) -> EngineResult<Option<Uuid>> {
        let snapshots = self.snapshot_swappable().await?;
        let output_token = self.basket.read().await.output_token.clone();

        let mut seeds = Vec::with_capacity(snapshots.len());
        for snapshot in &snapshots {
            seeds.push(LegSeed {
                input_token_address: snapshot.token_address.clone(),
                in_amount: snapshot.in_amount,
                out_amount: snapshot.quote.out_amount_raw()?,
            });
        }

        let user = self.signer.pubkey();
        let intent_id = {
            let mut ledger = self.ledger.write().await;
            ledger.create_intent(&user.to_string(), &output_token, now_ms(), seeds)
        };
        let Some(intent_id) = intent_id else {
            debug!("no swappable entries, no intent created");
            return Ok(None);
        };
        metrics::record_intent_created();
        info!("intent {} created with {} legs", intent_id, snapshots.len());

        if let Err(e) = self.build_and_submit(intent_id, snapshots).await {
            error!("intent {} failed before submission: {}", intent_id, e);
            let mut ledger = self.ledger.write().await;
            if let Err(transition) = ledger.mark_create_failed(intent_id) {
                warn!("intent {}: {}", intent_id, transition);
            } else {
                metrics::record_intent_create_failed();
            }
        }

        Ok(Some(intent_id))
    }

    /// Build, sign and hand the intent to the submitter. Any error here
    /// is fatal to the intent.
    async fn build_and_submit(
        &self,
        intent_id: Uuid,
        snapshots: Vec<LegSnapshot>,
    ) -> EngineResult<()> {
        let user = self.signer.pubkey();

        // Instruction bundles for every leg
        let mut bundles = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let request = SwapInstructionsRequest::new(&user, snapshot.quote);
            let instructions = self
                .quote_source
                .swap_instructions(&request)
                .await
                .map_err(|e| EngineError::Assembly(e.to_string()))?;
            bundles.push(LegBundle {
                instructions,
                input_value_usd: snapshot.input_value_usd,
            });
        }

        let unsigned =
            assembler::assemble_intent(self.rpc.as_ref(), &user, &bundles, &self.config.fee)
                .await?;

        {
            let mut ledger = self.ledger.write().await;
            for (leg_index, payload) in unsigned.iter().enumerate() {
                ledger.set_leg_payload(intent_id, leg_index, payload.clone())?;
            }
            if !ledger.try_begin_processing(intent_id) {
                return Err(EngineError::Internal(format!(
                    "intent {} not ready for processing",
                    intent_id
                )));
            }
        }

        let signed = self.signer.sign_all_transactions(unsigned).await?;
        let signatures = signed.iter().map(|tx| tx.signatures[0]).collect();
        self.ledger
            .write()
            .await
            .mark_sent(intent_id, signatures)?;
        info!("intent {} signed and sent to submitter", intent_id);

        let rpc = Arc::clone(&self.rpc);
        let ledger = Arc::clone(&self.ledger);
        let config = SubmitterConfig::from(&self.config.engine);
        tokio::spawn(async move {
            if let Err(e) = submitter::submit_intent(rpc, ledger, intent_id, signed, config).await {
                error!("intent {} submission: {}", intent_id, e);
            }
        });

        Ok(())
    }

    // ---- main loop ---------------------------------------------------

    /// Drive periodic route and asset refreshes until shutdown
    pub async fn run(self: Arc<Self>) -> EngineResult<()> {
        let mut route_tick =
            interval(Duration::from_millis(self.config.engine.route_refresh_interval_ms));
        let mut asset_tick =
            interval(Duration::from_millis(self.config.engine.asset_refresh_interval_ms));

        info!("swap engine started");

        loop {
            if *self.shutdown.read().await {
                break;
            }

            tokio::select! {
                _ = route_tick.tick() => {
                    self.route_pass().await;
                }

                _ = asset_tick.tick() => {
                    if let Err(e) = self.refresh_wallet_assets().await {
                        error!("wallet asset refresh: {}", e);
                    }
                    if let Err(e) = self.refresh_registry().await {
                        error!("registry refresh: {}", e);
                    }
                }
            }
        }

        info!("swap engine stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::{
        QuoteError, QuoteResponse, SwapInstructionsResponse,
    };
    use crate::route::RoutingStatus;
    use crate::token::{TokenTag, USDC_MINT, WRAPPED_SOL_MINT};
    use async_trait::async_trait;
    use serde_json::json;
    use solana_sdk::account::Account;
    use solana_sdk::hash::Hash;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::{Keypair, Signature};
    use solana_sdk::transaction::VersionedTransaction;
    use solana_transaction_status::TransactionConfirmationStatus;
    use std::collections::BTreeSet;

    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    fn quote_json(input: &str, amount: u64, out: u64) -> QuoteResponse {
        serde_json::from_value(json!({
            "inputMint": input,
            "inAmount": amount.to_string(),
            "outputMint": USDC_MINT,
            "outAmount": out.to_string(),
            "priceImpactPct": "0.01",
        }))
        .unwrap()
    }

    struct FakeQuoteSource {
        fail_with: Option<QuoteError>,
    }

    #[async_trait]
    impl QuoteSource for FakeQuoteSource {
        async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, QuoteError> {
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(quote_json(&request.input_mint, request.amount, request.amount / 2)),
            }
        }

        async fn swap_instructions(
            &self,
            request: &SwapInstructionsRequest,
        ) -> Result<SwapInstructionsResponse, QuoteError> {
            let _ = request;
            let mut data = vec![2u8];
            data.extend_from_slice(&200_000u32.to_le_bytes());
            Ok(serde_json::from_value(json!({
                "computeBudgetInstructions": [{
                    "programId": solana_sdk::compute_budget::id().to_string(),
                    "accounts": [],
                    "data": base64::Engine::encode(
                        &base64::engine::general_purpose::STANDARD, &data),
                }],
                "setupInstructions": [],
                "swapInstruction": {
                    "programId": Pubkey::new_unique().to_string(),
                    "accounts": [{
                        "pubkey": Pubkey::new_unique().to_string(),
                        "isSigner": false,
                        "isWritable": true
                    }],
                    "data": base64::Engine::encode(
                        &base64::engine::general_purpose::STANDARD, [1u8, 2, 3]),
                },
                "addressLookupTableAddresses": [],
            }))
            .unwrap())
        }
    }

    struct FakeRpc;

    #[async_trait]
    impl LedgerRpc for FakeRpc {
        async fn latest_blockhash(&self) -> EngineResult<Hash> {
            Ok(Hash::new_unique())
        }

        async fn multiple_accounts(
            &self,
            _pubkeys: &[Pubkey],
        ) -> EngineResult<Vec<Option<Account>>> {
            Ok(vec![])
        }

        async fn send_transaction(
            &self,
            _transaction: &VersionedTransaction,
        ) -> EngineResult<Signature> {
            Ok(Signature::from([9u8; 64]))
        }

        async fn signature_status(
            &self,
            _signature: &Signature,
        ) -> EngineResult<Option<TransactionConfirmationStatus>> {
            Ok(Some(TransactionConfirmationStatus::Confirmed))
        }

        async fn priority_fee_estimate(&self) -> EngineResult<u64> {
            Ok(10_000)
        }
    }

    struct FakeAssets;

    #[async_trait]
    impl AssetSource for FakeAssets {
        async fn wallet_assets(&self, _owner: &Pubkey) -> EngineResult<Vec<Token>> {
            Ok(vec![Token {
                address: BONK.to_string(),
                decimals: 5,
                symbol: "BONK".to_string(),
                name: "Bonk".to_string(),
                logo_uri: None,
                tags: BTreeSet::from([TokenTag::WalletHeld]),
                price: Some(0.00002),
                balance: Some(10_000_000),
            }])
        }

        async fn token_registry(&self) -> EngineResult<Vec<Token>> {
            Ok(vec![])
        }
    }

    fn test_config(dir: &std::path::Path) -> Settings {
        let mut settings = crate::config::tests::test_settings();
        settings.user_settings.path = dir
            .join("settings.json")
            .to_string_lossy()
            .to_string();
        // the submitter sleeps a full poll interval before its first
        // status check; production timings would outlast the test's
        // polling window
        settings.engine.confirm_poll_interval_ms = 1;
        settings.engine.confirm_timeout_ms = 50;
        settings
    }

    async fn engine(fail_with: Option<QuoteError>) -> (Arc<SwapEngine>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let engine = SwapEngine::new(
            test_config(dir.path()),
            Arc::new(FakeQuoteSource { fail_with }),
            Arc::new(FakeRpc),
            Arc::new(FakeAssets),
            Arc::new(KeypairSigner::new(Keypair::new())),
        )
        .unwrap();
        let engine = Arc::new(engine);
        engine.refresh_wallet_assets().await.unwrap();
        engine.refresh_registry().await.unwrap();
        (engine, dir)
    }

    #[tokio::test]
    async fn test_mutations_rejected_until_catalog_ready() {
        let dir = tempfile::tempdir().unwrap();
        let engine = SwapEngine::new(
            test_config(dir.path()),
            Arc::new(FakeQuoteSource { fail_with: None }),
            Arc::new(FakeRpc),
            Arc::new(FakeAssets),
            Arc::new(KeypairSigner::new(Keypair::new())),
        )
        .unwrap();

        assert!(matches!(
            engine.add_input_token(WRAPPED_SOL_MINT).await,
            Err(EngineError::CatalogNotReady)
        ));
        assert!(engine.catalog().await.is_none());

        // one source is not enough
        engine.refresh_wallet_assets().await.unwrap();
        assert!(engine.catalog().await.is_none());

        engine.refresh_registry().await.unwrap();
        assert!(engine.catalog().await.is_some());
        engine.add_input_token(WRAPPED_SOL_MINT).await.unwrap();
    }

    #[tokio::test]
    async fn test_edit_triggers_quote_and_entry_becomes_swappable() {
        let (engine, _dir) = engine(None).await;
        engine.add_input_token(BONK).await.unwrap();
        engine.set_input_token_amount(BONK, "10").await.unwrap();

        let basket = engine.basket().await;
        let entry = basket.entry(BONK).unwrap();
        assert_eq!(entry.amount, 1_000_000);
        assert_eq!(entry.status, RoutingStatus::Routing);
        assert!(entry.usable_quote().is_some());
    }

    #[tokio::test]
    async fn test_quote_failure_lands_as_entry_status() {
        let (engine, _dir) = engine(Some(QuoteError::NoRoute)).await;
        engine.add_input_token(BONK).await.unwrap();
        engine.set_input_token_amount(BONK, "10").await.unwrap();

        let basket = engine.basket().await;
        assert_eq!(basket.entry(BONK).unwrap().status, RoutingStatus::NoRoute);
        // failure stays local, a swap attempt simply finds nothing
        assert_eq!(engine.swap_all_routes().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_swap_all_routes_builds_signs_and_completes() {
        let (engine, _dir) = engine(None).await;
        engine.add_input_token(BONK).await.unwrap();
        engine.set_input_token_amount(BONK, "10").await.unwrap();

        let intent_id = engine.swap_all_routes().await.unwrap().unwrap();

        // submitter runs on a spawned task
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let ledger = engine.ledger();
            let ledger = ledger.read().await;
            let intent = ledger.intent(intent_id).unwrap();
            if intent.status == crate::ledger::IntentStatus::Completed {
                assert_eq!(intent.total_out_amount, 500_000);
                assert!(intent.transactions[0].signature.is_some());
                return;
            }
        }
        panic!("intent never completed");
    }

    #[tokio::test]
    async fn test_dust_tokens_added_at_full_balance() {
        let (engine, _dir) = engine(None).await;
        // BONK holding is worth 100 * 0.00002 = far below the 5 USD ceiling
        engine.add_dust_input_tokens().await.unwrap();

        let basket = engine.basket().await;
        let entry = basket.entry(BONK).unwrap();
        assert_eq!(entry.amount, 10_000_000);
    }

    #[tokio::test]
    async fn test_trust_toggle_rebuilds_catalog() {
        let (engine, _dir) = engine(None).await;
        let before = engine.catalog().await.unwrap().len();

        let mut settings = engine.settings().await;
        settings.allow_untrusted_tokens = true;
        engine.update_settings(settings).await.unwrap();

        // wallet-held and protocol tokens were already trusted
        assert_eq!(engine.catalog().await.unwrap().len(), before);
        assert!(engine.settings().await.allow_untrusted_tokens);
    }
}
