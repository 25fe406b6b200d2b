//! Single-message mutations: delete and flag set/clear
//!
//! Both operations validate the UID before any I/O, resolve the local
//! folder to a remote mailbox, apply the change on the server, then mirror
//! it into the local store.

use super::folders::resolve_remote_folder;
use crate::db::{Account, MailStore};
use crate::mail::connection::open_session;
use crate::mail::{FlagSet, MailError, MailResult, MailSession, MailboxLock, SessionConnector};
use crate::ApiResult;
use serde_json::Value;
use std::sync::Arc;

pub const NO_UID: &str = "No UID";

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Validate a UID argument as received from a caller
pub fn parse_uid(value: &Value) -> Result<u32, String> {
    if is_falsy(value) {
        return Err(NO_UID.to_string());
    }

    let uid = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };

    uid.filter(|uid| *uid > 0)
        .ok_or_else(|| MailError::InvalidUid(value.to_string()).to_string())
}

/// Normalize `Seen`/`\seen` style names to the IMAP system flag token
fn normalize_flag(flag: &str) -> String {
    let bare = flag.trim().trim_start_matches('\\');
    for system in [FlagSet::SEEN, FlagSet::FLAGGED, FlagSet::DELETED, "\\Answered", "\\Draft"] {
        if system[1..].eq_ignore_ascii_case(bare) {
            return system.to_string();
        }
    }
    flag.trim().to_string()
}

#[derive(Debug, Clone)]
enum Mutation {
    Delete,
    Flag { flag: String, value: bool },
}

/// Applies deletes and flag changes to one account's mailboxes
pub struct MailMutator {
    connector: Arc<dyn SessionConnector>,
    store: Arc<dyn MailStore>,
}

impl MailMutator {
    pub fn new(connector: Arc<dyn SessionConnector>, store: Arc<dyn MailStore>) -> Self {
        Self { connector, store }
    }

    /// Delete a message from the server and the local mirror
    pub async fn delete_email(&self, account: &Account, uid: &Value, folder: &str) -> ApiResult<()> {
        self.run(account, uid, folder, Mutation::Delete).await
    }

    /// Add (`value = true`) or remove a flag such as `\Seen` or `\Flagged`
    pub async fn set_email_flag(
        &self,
        account: &Account,
        uid: &Value,
        folder: &str,
        flag: &str,
        value: bool,
    ) -> ApiResult<()> {
        let flag = normalize_flag(flag);
        if flag.is_empty() {
            return ApiResult::err("No flag");
        }
        self.run(account, uid, folder, Mutation::Flag { flag, value }).await
    }

    async fn run(&self, account: &Account, uid: &Value, folder: &str, mutation: Mutation) -> ApiResult<()> {
        let uid = match parse_uid(uid) {
            Ok(uid) => uid,
            Err(e) => return ApiResult::err(e),
        };

        let mut session = match open_session(self.connector.as_ref(), account).await {
            Ok(session) => session,
            Err(e) => {
                log::warn!("Account {}: connect for mutation failed: {}", account.id, e);
                return ApiResult::err(e.to_string());
            }
        };

        let outcome = apply_remote(session.as_mut(), uid, folder, &mutation).await;

        if let Err(e) = session.logout().await {
            log::warn!("Logout after mutation failed for account {}: {}", account.id, e);
        }

        match outcome {
            Ok(remote) => {
                log::info!("Account {}: {:?} UID {} in {}", account.id, mutation, uid, remote);
                self.mirror_locally(account.id, folder, uid, &mutation);
                ApiResult::ok(())
            }
            Err(e) => {
                log::warn!("Account {}: {:?} UID {} in {} failed: {}", account.id, mutation, uid, folder, e);
                ApiResult::err(e.to_string())
            }
        }
    }

    fn mirror_locally(&self, account_id: i64, folder: &str, uid: u32, mutation: &Mutation) {
        let result = match mutation {
            Mutation::Delete => self
                .store
                .delete_emails_by_uid(account_id, &[uid], folder)
                .map(|_| ()),
            Mutation::Flag { flag, value } => {
                let (is_read, is_flagged) = if flag == FlagSet::SEEN {
                    (Some(*value), None)
                } else if flag == FlagSet::FLAGGED {
                    (None, Some(*value))
                } else {
                    return;
                };
                self.store
                    .update_email_flags_by_uid(account_id, folder, uid, is_read, is_flagged)
                    .map(|_| ())
            }
        };

        if let Err(e) = result {
            log::error!("Local mirror of UID {} in {} failed: {}", uid, folder, e);
        }
    }
}

/// Resolve the mailbox and apply the change; returns the remote path used
async fn apply_remote(
    session: &mut dyn MailSession,
    uid: u32,
    folder: &str,
    mutation: &Mutation,
) -> MailResult<String> {
    let mailboxes = session.list().await?;
    let remote = resolve_remote_folder(folder, &mailboxes);

    let mut lock = MailboxLock::acquire(session, &remote).await?;
    match mutation {
        Mutation::Delete => lock.delete_message(uid).await?,
        Mutation::Flag { flag, value } => {
            let flags: FlagSet = std::iter::once(flag.as_str()).collect();
            if *value {
                lock.add_flags(uid, &flags).await?
            } else {
                lock.remove_flags(uid, &flags).await?
            }
        }
    }
    drop(lock);

    Ok(remote)
}
