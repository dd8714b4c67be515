//! Outcome types returned to callers of the memo service.

use serde::{Deserialize, Serialize};

/// Result of a save, reporting which tier took the write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub success: bool,
    pub remote_saved: bool,
    pub local_saved: bool,
    pub message: String,
}

impl SaveOutcome {
    pub fn remote(message: impl Into<String>) -> Self {
        Self {
            success: true,
            remote_saved: true,
            local_saved: false,
            message: message.into(),
        }
    }

    pub fn local(message: impl Into<String>) -> Self {
        Self {
            success: true,
            remote_saved: false,
            local_saved: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            remote_saved: false,
            local_saved: false,
            message: message.into(),
        }
    }
}

/// Which tier answered a load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemoSource {
    Remote,
    Local,
    NotFound,
}

impl MemoSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoSource::Remote => "remote",
            MemoSource::Local => "local",
            MemoSource::NotFound => "not_found",
        }
    }
}

/// Result of a load, with provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOutcome {
    pub memo: Option<String>,
    pub source: MemoSource,
    pub message: String,
}

impl LoadOutcome {
    pub fn remote(memo: String, message: impl Into<String>) -> Self {
        Self {
            memo: Some(memo),
            source: MemoSource::Remote,
            message: message.into(),
        }
    }

    /// Outcome of consulting the local tier: `local` when a memo was found,
    /// `not_found` otherwise.
    pub fn from_local(memo: Option<String>) -> Self {
        match memo {
            Some(memo) => Self {
                memo: Some(memo),
                source: MemoSource::Local,
                message: "Memo loaded from local backup".to_string(),
            },
            None => Self::not_found("No memo in local backup"),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            memo: None,
            source: MemoSource::NotFound,
            message: message.into(),
        }
    }

    /// Whether a non-blank memo was returned.
    pub fn has_memo(&self) -> bool {
        self.memo.as_deref().is_some_and(|m| !m.trim().is_empty())
    }
}

/// Reachability of the remote catalog, for display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Checking,
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Checking => "checking",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

impl From<bool> for ConnectionStatus {
    fn from(reachable: bool) -> Self {
        if reachable {
            Self::Connected
        } else {
            Self::Disconnected
        }
    }
}
