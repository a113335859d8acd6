//! User-facing global settings
//!
//! Read by the route engine (slippage parameters) and the catalog merge
//! (untrusted-token toggle); mutated only by user action. Persisted as a
//! small JSON file so they survive sessions.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Let the aggregator pick slippage, capped by `max_auto_slippage_bps`
    pub auto_slippage: bool,
    pub max_auto_slippage_bps: u32,
    /// Fixed slippage used when `auto_slippage` is off
    pub max_slippage_bps: u32,
    /// Include tokens outside the strict registry set in the catalog
    pub allow_untrusted_tokens: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            auto_slippage: true,
            max_auto_slippage_bps: 300,
            max_slippage_bps: 50,
            allow_untrusted_tokens: false,
        }
    }
}

impl GlobalSettings {
    /// Load persisted settings, falling back to defaults when the file is
    /// missing. A corrupt file is an error rather than a silent reset.
    pub fn load(path: &Path) -> EngineResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| EngineError::Settings(format!("corrupt settings file: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(EngineError::Settings(e.to_string())),
        }
    }

    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Settings(e.to_string()))?;
        std::fs::write(path, contents).map_err(|e| EngineError::Settings(e.to_string()))
    }
}
