//! Sync Manager - Orchestrates mailbox synchronization
//!
//! Mirrors IMAP accounts into the local store. Handles:
//! - One session per account run, folders processed strictly in sequence
//! - Folder mapping and migration of stored labels
//! - Watermark-based download of new messages in bounded batches, reset on UIDVALIDITY change
//! - Flag refresh and orphan removal from a complete remote listing
//! - Best-effort quota refresh
//! - Concurrent runs across independent accounts

use super::download::download_message_batch;
use super::fetch::{fetch_uid_batch, UidBatch};
use super::folders::{build_folder_map, sync_targets};
use super::migrate::migrate_folders;
use super::models::{AccountSyncResult, FolderSyncReport, SyncConfig, SyncPhase};
use super::quota::check_account_quota;
use super::reconcile::reconcile_orphans;
use crate::db::{Account, DbError, FlagUpdate, MailStore};
use crate::mail::connection::open_session;
use crate::mail::{MailError, MailSession, MailboxLock, SessionConnector};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tracks and logs the state machine of one account run
struct PhaseTracker {
    account_id: i64,
    phase: SyncPhase,
}

impl PhaseTracker {
    fn new(account_id: i64) -> Self {
        Self {
            account_id,
            phase: SyncPhase::Idle,
        }
    }

    fn advance(&mut self, next: SyncPhase) {
        log::debug!("Account {}: {} -> {}", self.account_id, self.phase, next);
        self.phase = next;
    }
}

/// Sync manager - main orchestrator
#[derive(Clone)]
pub struct SyncManager {
    connector: Arc<dyn SessionConnector>,
    store: Arc<dyn MailStore>,
    config: Arc<RwLock<SyncConfig>>,
}

impl SyncManager {
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        store: Arc<dyn MailStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            connector,
            store,
            config: Arc::new(RwLock::new(config)),
        }
    }

    pub async fn get_config(&self) -> SyncConfig {
        self.config.read().await.clone()
    }

    pub async fn update_config(&self, config: SyncConfig) {
        *self.config.write().await = config;
    }

    // ========================================================================
    // Folder sync
    // ========================================================================

    /// Sync one remote mailbox into `local_folder`
    pub async fn sync_folder_messages(
        &self,
        session: &mut dyn MailSession,
        account: &Account,
        remote_folder: &str,
        local_folder: &str,
    ) -> SyncResult<FolderSyncReport> {
        let config = self.get_config().await;
        let mut tracker = PhaseTracker::new(account.id);
        self.run_folder(session, account, remote_folder, local_folder, &config, &mut tracker)
            .await
    }

    async fn run_folder(
        &self,
        session: &mut dyn MailSession,
        account: &Account,
        remote_folder: &str,
        local_folder: &str,
        config: &SyncConfig,
        tracker: &mut PhaseTracker,
    ) -> SyncResult<FolderSyncReport> {
        let store = self.store.as_ref();
        let mut report = FolderSyncReport {
            remote_folder: remote_folder.to_string(),
            local_folder: local_folder.to_string(),
            ..Default::default()
        };

        let mut lock = MailboxLock::acquire(session, remote_folder).await?;
        let status = lock.status();
        let exists = status.exists;

        if let Some(uid_validity) = status.uid_validity {
            match store.get_folder_uid_validity(account.id, local_folder)? {
                Some(stored) if stored == uid_validity => {}
                Some(stored) => {
                    let dropped = store.reset_folder(account.id, local_folder, uid_validity)?;
                    log::warn!(
                        "Account {}: UIDVALIDITY of {} changed ({} -> {}), dropped {} stored messages",
                        account.id,
                        remote_folder,
                        stored,
                        uid_validity,
                        dropped
                    );
                }
                None => store.set_folder_uid_validity(account.id, local_folder, uid_validity)?,
            }
        }

        let watermark = store.get_max_uid_for_folder(account.id, local_folder)?;

        tracker.advance(SyncPhase::Fetching);
        let listing = if exists == 0 {
            UidBatch::empty()
        } else {
            fetch_uid_batch(&mut *lock, &format!("1:{}", exists)).await?
        };
        let complete = listing.complete && listing.uids.len() == exists as usize;

        tracker.advance(SyncPhase::Downloading);
        let mut new_uids: Vec<u32> = listing
            .uids
            .iter()
            .copied()
            .filter(|uid| watermark.map_or(true, |w| *uid > w))
            .collect();
        new_uids.sort_unstable();
        new_uids.dedup();

        for batch in new_uids.chunks(config.effective_batch_size()) {
            let result = download_message_batch(&mut *lock, store, account, batch, local_folder).await;
            report.new_messages += result.saved;
            report.placeholders += result.placeholders;

            if result.batch_failed {
                // Later batches would move the watermark past this one
                log::warn!(
                    "Account {}: stopping downloads in {} after failed batch starting at UID {}",
                    account.id,
                    remote_folder,
                    batch[0]
                );
                break;
            }
        }

        tracker.advance(SyncPhase::Reconciling);
        if let Some(watermark) = watermark {
            let updates: Vec<FlagUpdate> = listing
                .headers
                .iter()
                .filter(|h| h.uid <= watermark)
                .map(|h| FlagUpdate {
                    uid: h.uid,
                    is_read: h.flags.is_seen(),
                    is_flagged: h.flags.is_flagged(),
                })
                .collect();
            report.flags_updated = store.refresh_email_flags(account.id, local_folder, &updates)?;
        }

        if complete {
            let local = store.get_all_uids_for_folder(account.id, local_folder)?;
            let remote: HashSet<u32> = listing.uids.iter().copied().collect();
            report.orphans_removed = reconcile_orphans(store, account.id, local_folder, &local, &remote)?;
            report.reconciled = true;
        } else {
            log::warn!(
                "Account {}: listing of {} incomplete ({} of {} UIDs), skipping orphan removal",
                account.id,
                remote_folder,
                listing.uids.len(),
                exists
            );
        }

        drop(lock);

        log::info!(
            "Account {}: {} -> {}: {} new, {} placeholders, {} removed",
            account.id,
            remote_folder,
            local_folder,
            report.new_messages,
            report.placeholders,
            report.orphans_removed
        );
        Ok(report)
    }

    // ========================================================================
    // Account sync
    // ========================================================================

    /// Run the full pipeline for one account. Never fails; see the result.
    pub async fn sync_account(&self, account: &Account) -> AccountSyncResult {
        let config = self.get_config().await;
        let store = self.store.as_ref();
        let mut tracker = PhaseTracker::new(account.id);

        tracker.advance(SyncPhase::Connecting);
        let mut session = match open_session(self.connector.as_ref(), account).await {
            Ok(session) => session,
            Err(e) => {
                tracker.advance(SyncPhase::Failed);
                log::error!("Account {}: connection failed: {}", account.id, e);
                return AccountSyncResult::failed(account.id, e.to_string());
            }
        };
        tracker.advance(SyncPhase::Connected);

        let mut result = AccountSyncResult {
            account_id: account.id,
            success: true,
            ..Default::default()
        };

        tracker.advance(SyncPhase::MappingFolders);
        let mailboxes = match session.list().await {
            Ok(mailboxes) => mailboxes,
            Err(e) => {
                log::warn!("Account {}: mailbox listing failed: {}", account.id, e);
                result.errors.push(format!("LIST: {}", e));
                Vec::new()
            }
        };
        let map = build_folder_map(&mailboxes);
        migrate_folders(store, account.id, &map);

        for target in sync_targets(&mailboxes, &map) {
            match self
                .run_folder(session.as_mut(), account, &target.remote, &target.local, &config, &mut tracker)
                .await
            {
                Ok(report) => {
                    result.count += report.new_messages;
                    result.folders.push(report);
                }
                Err(e) => {
                    log::warn!("Account {}: folder {} failed: {}", account.id, target.remote, e);
                    result.errors.push(format!("{}: {}", target.remote, e));
                }
            }
        }

        if config.check_quota {
            tracker.advance(SyncPhase::QuotaCheck);
            result.quota = check_account_quota(session.as_mut(), account.id, &config.quota_mailbox).await;
            if let Some(quota) = result.quota {
                if let Err(e) = store.update_account_quota(account.id, quota.used_kb, quota.total_kb) {
                    log::warn!("Account {}: failed to store quota: {}", account.id, e);
                }
            }
        }

        if let Err(e) = store.update_account_sync(account.id, &chrono::Utc::now().to_rfc3339()) {
            log::warn!("Account {}: failed to record sync time: {}", account.id, e);
            result.errors.push(format!("last sync: {}", e));
        }

        if let Err(e) = session.logout().await {
            log::warn!("Account {}: logout failed: {}", account.id, e);
        }

        tracker.advance(SyncPhase::Done);
        result.phase = tracker.phase;

        log::info!(
            "Account {}: sync done, {} new messages in {} folders ({} errors)",
            account.id,
            result.count,
            result.folders.len(),
            result.errors.len()
        );
        result
    }

    /// Load an account and sync it
    pub async fn sync_account_by_id(&self, account_id: i64) -> AccountSyncResult {
        match self.store.get_account(account_id) {
            Ok(account) => self.sync_account(&account).await,
            Err(e) => AccountSyncResult::failed(account_id, e.to_string()),
        }
    }

    /// Sync every active account, several at a time
    pub async fn sync_all_accounts(&self) -> SyncResult<Vec<AccountSyncResult>> {
        let limit = self.get_config().await.max_concurrent_accounts.max(1);
        let accounts: Vec<Account> = self
            .store
            .get_accounts()?
            .into_iter()
            .filter(|account| account.is_active)
            .collect();

        log::info!("Syncing {} active accounts ({} at a time)", accounts.len(), limit);

        let this = self;
        let results = futures::stream::iter(accounts)
            .map(move |account| async move { this.sync_account(&account).await })
            .buffer_unordered(limit)
            .collect::<Vec<_>>()
            .await;

        Ok(results)
    }
}

/// Sync errors
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Mail(#[from] MailError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub type SyncResult<T> = Result<T, SyncError>;
