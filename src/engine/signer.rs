//! Wallet signing boundary

use crate::error::{EngineError, EngineResult};

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::keypair::read_keypair_file;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::VersionedTransaction;
use std::path::Path;

/// The signing wallet. Kept behind a trait so tests can sign with a
/// throwaway keypair and other wallet backends can slot in.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    /// Sign every transaction of one intent as a single user action
    async fn sign_all_transactions(
        &self,
        transactions: Vec<VersionedTransaction>,
    ) -> EngineResult<Vec<VersionedTransaction>>;
}

/// Local file-backed keypair signer
pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let keypair = read_keypair_file(path)
            .map_err(|e| EngineError::Wallet(format!("keypair file {:?}: {}", path, e)))?;
        Ok(Self { keypair })
    }
}

#[async_trait]
impl WalletSigner for KeypairSigner {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_all_transactions(
        &self,
        transactions: Vec<VersionedTransaction>,
    ) -> EngineResult<Vec<VersionedTransaction>> {
        transactions
            .into_iter()
            .map(|tx| {
                VersionedTransaction::try_new(tx.message, &[&self.keypair])
                    .map_err(|e| EngineError::Wallet(e.to_string()))
            })
            .collect()
    }
}
