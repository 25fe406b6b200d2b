//! Folder normalization
//!
//! Maps provider mailbox paths onto the canonical local folder names and
//! resolves canonical names back to remote paths for mutations.

use crate::mail::MailboxInfo;
use std::collections::{BTreeMap, HashSet};

pub const INBOX: &str = "INBOX";
pub const LOCAL_INBOX: &str = "Posteingang";
pub const LOCAL_SENT: &str = "Gesendet";
pub const LOCAL_TRASH: &str = "Papierkorb";
pub const LOCAL_JUNK: &str = "Spam";

/// Remote mailbox path -> canonical local folder
pub type FolderMap = BTreeMap<String, String>;

/// A canonical special folder and how providers spell it
struct SpecialFolder {
    local: &'static str,
    special_use: &'static str,
    /// Lowercase needle matched against the specialUse attribute
    needle: &'static str,
    aliases: &'static [&'static str],
}

const SPECIAL_FOLDERS: [SpecialFolder; 3] = [
    SpecialFolder {
        local: LOCAL_SENT,
        special_use: "\\Sent",
        needle: "sent",
        aliases: &["sent", "gesendet"],
    },
    SpecialFolder {
        local: LOCAL_TRASH,
        special_use: "\\Trash",
        needle: "trash",
        aliases: &["trash", "papierkorb"],
    },
    SpecialFolder {
        local: LOCAL_JUNK,
        special_use: "\\Junk",
        needle: "junk",
        aliases: &["junk", "spam"],
    },
];

fn special_by_use(special_use: &str) -> Option<&'static SpecialFolder> {
    let lower = special_use.to_lowercase();
    SPECIAL_FOLDERS.iter().find(|s| lower.contains(s.needle))
}

fn special_by_alias(name: &str) -> Option<&'static SpecialFolder> {
    let lower = name.trim().to_lowercase();
    SPECIAL_FOLDERS.iter().find(|s| s.aliases.contains(&lower.as_str()))
}

/// Canonical name for an INBOX descendant, e.g. `INBOX.Amazon` -> `Posteingang/Amazon`
fn inbox_descendant(mailbox: &MailboxInfo) -> Option<String> {
    let upper = mailbox.path.to_uppercase();
    if !upper.starts_with(INBOX) || upper == INBOX {
        return None;
    }

    let mut segments: Vec<&str> = mailbox.path.split(mailbox.delimiter_or_default()).collect();
    if let Some(first) = segments.first_mut() {
        if first.eq_ignore_ascii_case(INBOX) {
            *first = LOCAL_INBOX;
        }
    }

    Some(segments.join("/"))
}

/// Canonical local folder for one mailbox, None if it is left to name heuristics
pub fn canonical_folder(mailbox: &MailboxInfo) -> Option<String> {
    if let Some(special) = mailbox.special_use.as_deref().and_then(special_by_use) {
        return Some(special.local.to_string());
    }

    inbox_descendant(mailbox)
}

/// Build the remote -> local mapping for a mailbox listing
pub fn build_folder_map(mailboxes: &[MailboxInfo]) -> FolderMap {
    let mut map = FolderMap::new();
    map.insert(INBOX.to_string(), LOCAL_INBOX.to_string());

    for mailbox in mailboxes {
        if let Some(local) = canonical_folder(mailbox) {
            map.insert(mailbox.path.clone(), local);
        }
    }

    map
}

/// Remote/local pair the orchestrator syncs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub remote: String,
    pub local: String,
}

/// Folders to sync: the map entries, plus name-matched special folders
/// for canonical names no specialUse mailbox claimed. Each local folder
/// is fed by a single remote mailbox; INBOX comes first.
pub fn sync_targets(mailboxes: &[MailboxInfo], map: &FolderMap) -> Vec<SyncTarget> {
    let mut candidates: Vec<SyncTarget> = map
        .iter()
        .map(|(remote, local)| SyncTarget {
            remote: remote.clone(),
            local: local.clone(),
        })
        .collect();

    for mailbox in mailboxes {
        if map.contains_key(&mailbox.path) || mailbox.is_inbox() {
            continue;
        }
        if let Some(special) = special_by_alias(&mailbox.name) {
            if !map.values().any(|local| local == special.local) {
                candidates.push(SyncTarget {
                    remote: mailbox.path.clone(),
                    local: special.local.to_string(),
                });
            }
        }
    }

    candidates.sort_by_key(|t| (t.local != LOCAL_INBOX, t.remote.clone()));

    let mut claimed = HashSet::new();
    candidates
        .into_iter()
        .filter(|target| {
            let fresh = claimed.insert(target.local.clone());
            if !fresh {
                log::warn!(
                    "Skipping {}: local folder {} is already synced from another mailbox",
                    target.remote,
                    target.local
                );
            }
            fresh
        })
        .collect()
}

/// Ordered strategies for turning a local folder back into a remote path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderMatcher {
    /// Local folder is one the orchestrator syncs; use the same remote mailbox
    SyncTarget,
    /// Gesendet/Papierkorb/Spam -> mailbox carrying \Sent/\Trash/\Junk
    SpecialUse,
    /// Gesendet/Sent/... -> mailbox literally named like one of the aliases
    LiteralName,
    /// Posteingang/A/B -> INBOX<d>A<d>B
    InboxSubfolder,
    /// Folder argument is itself a listed remote path
    ExactPath,
}

impl FolderMatcher {
    pub const PRIORITY: [FolderMatcher; 5] = [
        FolderMatcher::SyncTarget,
        FolderMatcher::SpecialUse,
        FolderMatcher::LiteralName,
        FolderMatcher::InboxSubfolder,
        FolderMatcher::ExactPath,
    ];

    fn resolve(&self, folder: &str, mailboxes: &[MailboxInfo]) -> Option<String> {
        match self {
            FolderMatcher::SyncTarget => {
                let map = build_folder_map(mailboxes);
                sync_targets(mailboxes, &map)
                    .into_iter()
                    .find(|t| t.local == folder)
                    .map(|t| t.remote)
            }
            FolderMatcher::SpecialUse => {
                let special = SPECIAL_FOLDERS.iter().find(|s| s.local == folder)?;
                mailboxes
                    .iter()
                    .find(|mb| {
                        mb.special_use
                            .as_deref()
                            .is_some_and(|u| u.eq_ignore_ascii_case(special.special_use))
                    })
                    .map(|mb| mb.path.clone())
            }
            FolderMatcher::LiteralName => {
                let special = special_by_alias(folder)
                    .or_else(|| SPECIAL_FOLDERS.iter().find(|s| s.local == folder))?;
                mailboxes
                    .iter()
                    .find(|mb| special.aliases.contains(&mb.name.to_lowercase().as_str()))
                    .map(|mb| mb.path.clone())
            }
            FolderMatcher::InboxSubfolder => {
                let rest = folder.strip_prefix(LOCAL_INBOX)?.strip_prefix('/')?;
                if rest.is_empty() {
                    return None;
                }

                if let Some(mb) = mailboxes
                    .iter()
                    .find(|mb| inbox_descendant(mb).as_deref() == Some(folder))
                {
                    return Some(mb.path.clone());
                }

                let inbox = mailboxes.iter().find(|mb| mb.is_inbox());
                let delimiter = inbox.map(|mb| mb.delimiter_or_default()).unwrap_or("/");
                let root = inbox.map(|mb| mb.path.as_str()).unwrap_or(INBOX);
                let mut path = root.to_string();
                for segment in rest.split('/') {
                    path.push_str(delimiter);
                    path.push_str(segment);
                }
                Some(path)
            }
            FolderMatcher::ExactPath => mailboxes
                .iter()
                .find(|mb| mb.path == folder)
                .map(|mb| mb.path.clone()),
        }
    }
}

/// Resolve a canonical local folder to a remote mailbox path.
///
/// Falls back to the account's INBOX when no matcher applies.
pub fn resolve_remote_folder(folder: &str, mailboxes: &[MailboxInfo]) -> String {
    let folder = folder.trim();

    for matcher in FolderMatcher::PRIORITY {
        if let Some(path) = matcher.resolve(folder, mailboxes) {
            log::debug!("Resolved folder {} -> {} via {:?}", folder, path, matcher);
            return path;
        }
    }

    mailboxes
        .iter()
        .find(|mb| mb.is_inbox())
        .map(|mb| mb.path.clone())
        .unwrap_or_else(|| INBOX.to_string())
}
