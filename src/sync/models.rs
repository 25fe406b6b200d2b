//! Sync Data Models
//!
//! Configuration, per-run state and results of mailbox synchronization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// UIDs downloaded per FETCH
    pub batch_size: usize,
    /// Refresh storage quota after each account run
    pub check_quota: bool,
    /// Account pipelines running at the same time
    pub max_concurrent_accounts: usize,
    /// Mailbox whose quota root is queried
    pub quota_mailbox: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            check_quota: true,
            max_concurrent_accounts: 4,
            quota_mailbox: "INBOX".to_string(),
        }
    }
}

impl SyncConfig {
    pub const ENV_BATCH_SIZE: &'static str = "MAILMIRROR_BATCH_SIZE";
    pub const ENV_CHECK_QUOTA: &'static str = "MAILMIRROR_CHECK_QUOTA";
    pub const ENV_MAX_CONCURRENT_ACCOUNTS: &'static str = "MAILMIRROR_MAX_CONCURRENT_ACCOUNTS";

    /// Load from environment variables, keeping defaults for missing or invalid values
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(Self::ENV_BATCH_SIZE) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.batch_size = n,
                _ => log::warn!("Ignoring invalid {}={}", Self::ENV_BATCH_SIZE, raw),
            }
        }

        if let Some(raw) = lookup(Self::ENV_CHECK_QUOTA) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.check_quota = true,
                "0" | "false" | "no" | "off" => config.check_quota = false,
                _ => log::warn!("Ignoring invalid {}={}", Self::ENV_CHECK_QUOTA, raw),
            }
        }

        if let Some(raw) = lookup(Self::ENV_MAX_CONCURRENT_ACCOUNTS) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.max_concurrent_accounts = n,
                _ => log::warn!("Ignoring invalid {}={}", Self::ENV_MAX_CONCURRENT_ACCOUNTS, raw),
            }
        }

        config
    }

    pub(crate) fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

/// Phases of one account run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncPhase {
    #[default]
    Idle,
    Connecting,
    Connected,
    Failed,
    MappingFolders,
    Fetching,
    Downloading,
    Reconciling,
    QuotaCheck,
    Done,
}

impl SyncPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Failed | SyncPhase::Done)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Idle => "IDLE",
            SyncPhase::Connecting => "CONNECTING",
            SyncPhase::Connected => "CONNECTED",
            SyncPhase::Failed => "FAILED",
            SyncPhase::MappingFolders => "MAPPING_FOLDERS",
            SyncPhase::Fetching => "FETCHING",
            SyncPhase::Downloading => "DOWNLOADING",
            SyncPhase::Reconciling => "RECONCILING",
            SyncPhase::QuotaCheck => "QUOTA_CHECK",
            SyncPhase::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Storage quota in KB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    pub used_kb: i64,
    pub total_kb: i64,
}

/// Outcome of a message batch download
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadReport {
    /// Genuinely parsed and stored messages
    pub saved: usize,
    /// Placeholder records written for unretrievable messages
    pub placeholders: usize,
    /// The batch request itself failed
    pub batch_failed: bool,
}

/// Outcome of one folder sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSyncReport {
    pub remote_folder: String,
    pub local_folder: String,
    pub new_messages: usize,
    pub placeholders: usize,
    pub flags_updated: usize,
    pub orphans_removed: usize,
    /// False when the remote listing was incomplete and deletion was skipped
    pub reconciled: bool,
}

/// Result of an account sync, as reported to callers
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSyncResult {
    pub account_id: i64,
    pub success: bool,
    pub count: usize,
    /// Phase the run ended in
    pub phase: SyncPhase,
    pub error: Option<String>,
    /// Folder-level failures that did not abort the run
    pub errors: Vec<String>,
    pub folders: Vec<FolderSyncReport>,
    pub quota: Option<QuotaSnapshot>,
}

impl AccountSyncResult {
    pub fn failed(account_id: i64, error: impl Into<String>) -> Self {
        Self {
            account_id,
            success: false,
            phase: SyncPhase::Failed,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn has_folder_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
