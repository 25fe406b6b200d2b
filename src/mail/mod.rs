//! # Mailmirror - Mail Module
//!
//! Protocol-session boundary: the types and traits the sync engine uses to
//! talk to an IMAP server, plus the production `async-imap` session.

pub mod async_imap;
pub mod config;
pub mod connection;
pub mod parser;
pub mod providers;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::ops::{Deref, DerefMut};

// Re-export commonly used types
pub use self::async_imap::{AsyncImapConnector, AsyncImapSession};
pub use config::{ImapConfig, SecurityType};
pub use connection::{login_identity, test_connection};
pub use parser::{parse_message, ParsedAttachment, ParsedMessage};
pub use providers::{preset, provider_for_email, ProviderPreset};

/// Result type alias for mail operations
pub type MailResult<T> = Result<T, MailError>;

/// Unified error type for mail operations
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid UID: {0}")]
    InvalidUid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mailbox descriptor as returned by LIST
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxInfo {
    pub name: String,
    pub path: String,
    pub delimiter: Option<String>,
    pub special_use: Option<String>,
}

impl MailboxInfo {
    pub fn new(path: &str, delimiter: Option<&str>, special_use: Option<&str>) -> Self {
        let name = match delimiter {
            Some(d) if !d.is_empty() => path.rsplit(d).next().unwrap_or(path),
            _ => path,
        };

        Self {
            name: name.to_string(),
            path: path.to_string(),
            delimiter: delimiter.map(str::to_string),
            special_use: special_use.map(str::to_string),
        }
    }

    /// Hierarchy delimiter, `/` when the server did not report one
    pub fn delimiter_or_default(&self) -> &str {
        match self.delimiter.as_deref() {
            Some(d) if !d.is_empty() => d,
            _ => "/",
        }
    }

    pub fn is_inbox(&self) -> bool {
        self.path.eq_ignore_ascii_case("INBOX")
    }
}

/// Set of IMAP flag tokens (`\Seen`, `\Flagged`, keywords)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSet(BTreeSet<String>);

impl FlagSet {
    pub const SEEN: &'static str = "\\Seen";
    pub const FLAGGED: &'static str = "\\Flagged";
    pub const DELETED: &'static str = "\\Deleted";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, flag: impl Into<String>) -> bool {
        self.0.insert(flag.into())
    }

    /// Membership test; system flags compare case-insensitively
    pub fn contains(&self, flag: &str) -> bool {
        self.0.contains(flag) || self.0.iter().any(|f| f.eq_ignore_ascii_case(flag))
    }

    pub fn is_seen(&self) -> bool {
        self.contains(Self::SEEN)
    }

    pub fn is_flagged(&self) -> bool {
        self.contains(Self::FLAGGED)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Render as an IMAP flag list body, e.g. `\Seen \Flagged`
    pub fn to_imap_list(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(" ")
    }
}

impl<S: Into<String>> FromIterator<S> for FlagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Server capabilities, stored uppercased
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet(HashSet<String>);

impl CapabilitySet {
    pub fn insert(&mut self, capability: &str) {
        self.0.insert(capability.to_ascii_uppercase());
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.0.contains(&capability.to_ascii_uppercase())
    }
}

impl<'a> FromIterator<&'a str> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = Self::default();
        for capability in iter {
            set.insert(capability);
        }
        set
    }
}

/// Storage usage reported by GETQUOTAROOT, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageQuota {
    pub used: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaInfo {
    pub storage: Option<StorageQuota>,
}

/// State of a mailbox right after it was selected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    pub exists: u32,
    pub uid_validity: Option<u32>,
}

/// What a FETCH should return
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchQuery {
    /// Request the raw RFC 5322 source (`BODY.PEEK[]`)
    pub source: bool,
    /// Interpret the set as UIDs (`UID FETCH`) instead of sequence numbers
    pub by_uid: bool,
}

impl FetchQuery {
    pub fn headers_by_seq() -> Self {
        Self { source: false, by_uid: false }
    }

    pub fn sources_by_uid() -> Self {
        Self { source: true, by_uid: true }
    }
}

/// One FETCH response item
#[derive(Debug, Clone, Default)]
pub struct FetchedMessage {
    pub seq: u32,
    pub uid: Option<u32>,
    pub flags: FlagSet,
    pub source: Option<Vec<u8>>,
}

/// Lazy, finite, single-pass sequence of FETCH items
pub type FetchStream<'a> = BoxStream<'a, MailResult<FetchedMessage>>;

/// An authenticated protocol session
#[async_trait]
pub trait MailSession: Send {
    async fn logout(&mut self) -> MailResult<()>;

    async fn list(&mut self) -> MailResult<Vec<MailboxInfo>>;

    /// Select `path` for subsequent commands. Pair with [`MailSession::release_mailbox`],
    /// normally through [`MailboxLock`].
    async fn lock_mailbox(&mut self, path: &str) -> MailResult<MailboxStatus>;

    fn release_mailbox(&mut self, path: &str);

    async fn fetch<'a>(&'a mut self, set: &str, query: FetchQuery) -> MailResult<FetchStream<'a>>;

    async fn add_flags(&mut self, uid: u32, flags: &FlagSet) -> MailResult<()>;

    async fn remove_flags(&mut self, uid: u32, flags: &FlagSet) -> MailResult<()>;

    /// Flag `\Deleted` and expunge a single UID
    async fn delete_message(&mut self, uid: u32) -> MailResult<()>;

    async fn capabilities(&mut self) -> MailResult<CapabilitySet>;

    async fn get_quota(&mut self, mailbox: &str) -> MailResult<Option<QuotaInfo>>;
}

/// Opens sessions from an [`ImapConfig`]
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, config: &ImapConfig) -> MailResult<Box<dyn MailSession>>;
}

/// Scoped mailbox lease; released when dropped
pub struct MailboxLock<'a> {
    session: &'a mut dyn MailSession,
    path: String,
    status: MailboxStatus,
}

impl<'a> MailboxLock<'a> {
    pub async fn acquire(session: &'a mut dyn MailSession, path: &str) -> MailResult<MailboxLock<'a>> {
        let status = session.lock_mailbox(path).await?;
        log::debug!("Mailbox locked: {} ({} messages)", path, status.exists);

        Ok(Self {
            session,
            path: path.to_string(),
            status,
        })
    }

    pub fn status(&self) -> MailboxStatus {
        self.status
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl<'a> Deref for MailboxLock<'a> {
    type Target = dyn MailSession + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.session
    }
}

impl<'a> DerefMut for MailboxLock<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.session
    }
}

impl Drop for MailboxLock<'_> {
    fn drop(&mut self) {
        self.session.release_mailbox(&self.path);
        log::debug!("Mailbox released: {}", self.path);
    }
}
