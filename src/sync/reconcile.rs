//! Orphan reconciliation: drop local messages the server no longer has

use crate::db::{DbResult, MailStore};
use std::collections::HashSet;

/// Delete every local UID of `folder` that is absent from `remote`.
///
/// `remote` must be the complete listing of the mailbox; an empty set
/// removes everything stored for the folder.
pub fn reconcile_orphans(
    store: &dyn MailStore,
    account_id: i64,
    folder: &str,
    local: &[u32],
    remote: &HashSet<u32>,
) -> DbResult<usize> {
    let orphans: Vec<u32> = local
        .iter()
        .copied()
        .filter(|uid| !remote.contains(uid))
        .collect();

    if orphans.is_empty() {
        return Ok(0);
    }

    let deleted = store.delete_emails_by_uid(account_id, &orphans, folder)?;
    log::info!(
        "Removed {} orphaned messages from {} (account {})",
        deleted,
        folder,
        account_id
    );
    Ok(deleted)
}
