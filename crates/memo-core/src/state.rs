//! Application state for study memos.
//!
//! Holds the shared services handed to every caller.

use crate::config::{self, Config};
use crate::services::MemoService;
use crate::Result;

/// Application state shared across callers.
#[derive(Clone)]
pub struct AppState {
    /// Tiered memo persistence.
    pub memo: MemoService,
}

impl AppState {
    /// Create the application state from the global configuration.
    pub fn new() -> Result<Self> {
        Self::from_config(config::config())
    }

    /// Create the application state from an explicit configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let memo = MemoService::new(config)?;
        tracing::debug!("Memo service ready");
        Ok(Self { memo })
    }
}
