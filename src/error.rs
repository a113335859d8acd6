//! Error types for the swap engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Quote transport error: {0}")]
    QuoteTransport(String),

    #[error("Assembly error: {0}")]
    Assembly(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Token catalog not ready")]
    CatalogNotReady,

    #[error("Intent {intent_id} not found")]
    IntentNotFound { intent_id: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Settings persistence error: {0}")]
    Settings(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Rpc(_) | EngineError::QuoteTransport(_) | EngineError::Timeout { .. }
        )
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::QuoteTransport(e.to_string())
    }
}

impl From<solana_client::client_error::ClientError> for EngineError {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        EngineError::Rpc(e.to_string())
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
