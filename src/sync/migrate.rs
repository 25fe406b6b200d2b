//! Folder migration: relabel stored messages to their canonical folder

use super::folders::FolderMap;
use crate::db::MailStore;

/// Relabel messages stored under a remote path to the name the map now
/// gives it. Failures are logged per entry; returns the relabelled count.
pub fn migrate_folders(store: &dyn MailStore, account_id: i64, map: &FolderMap) -> usize {
    let mut moved = 0;

    for (remote, local) in map.iter().filter(|(remote, local)| remote != local) {
        match store.migrate_folder(account_id, remote, local) {
            Ok(0) => {}
            Ok(n) => {
                log::info!("Account {}: migrated {} messages {} -> {}", account_id, n, remote, local);
                moved += n;
            }
            Err(e) => {
                log::warn!("Account {}: failed to migrate {} -> {}: {}", account_id, remote, local, e);
            }
        }
    }

    moved
}
