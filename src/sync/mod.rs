//! Sync Module - Mailbox Mirroring
//!
//! Keeps the local store consistent with each account's IMAP mailboxes:
//! - Folder mapping to canonical local names (Posteingang, Gesendet, ...)
//! - Incremental download above a per-folder UID watermark
//! - Placeholders for messages whose source cannot be retrieved
//! - Orphan removal against a complete remote UID listing
//! - Best-effort storage quota
//! - Single-message delete and flag mutations

pub mod download;
pub mod fetch;
pub mod folders;
pub mod manager;
pub mod migrate;
pub mod models;
pub mod mutate;
pub mod quota;
pub mod reconcile;

#[cfg(test)]
pub(crate) mod testing;


// Re-export commonly used types
pub use download::{download_message_batch, placeholder_email};
pub use fetch::{fetch_uid_batch, HeaderRecord, UidBatch};
pub use folders::{build_folder_map, resolve_remote_folder, sync_targets, FolderMap, FolderMatcher, SyncTarget};
pub use manager::{SyncError, SyncManager, SyncResult};
pub use migrate::migrate_folders;
pub use models::{
    AccountSyncResult, DownloadReport, FolderSyncReport, QuotaSnapshot, SyncConfig, SyncPhase,
};
pub use mutate::{parse_uid, MailMutator};
pub use quota::check_account_quota;
pub use reconcile::reconcile_orphans;
