//! Placer Engine - Solana swap orchestration
//!
//! Keeps an always-fresh view of what a wallet can swap (catalog +
//! quoted routes) and turns a single confirmation into assembled, signed
//! and independently-submitted transactions, one per input token.

pub mod assembler;
pub mod assets;
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod quote;
pub mod route;
pub mod settings;
pub mod submitter;
pub mod token;

pub use engine::SwapEngine;
pub use error::{EngineError, EngineResult};
