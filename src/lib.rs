//! # Mailmirror
//!
//! Incremental IMAP-to-SQLite mirroring engine: folder normalization,
//! watermark downloads, orphan reconciliation and single-message mutations.

pub mod db;
pub mod mail;
pub mod sync;

use serde::{Deserialize, Serialize};

pub use db::{Database, MailStore};
pub use mail::{AsyncImapConnector, MailError, MailSession, SessionConnector};
pub use sync::{AccountSyncResult, MailMutator, SyncConfig, SyncManager};

/// Result wrapper for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}
