//! Scripted in-memory IMAP server for tests
//!
//! `MockServer` holds the remote state and a call log; `MockConnector`
//! hands out `MockSession`s bound to it.

use crate::mail::{
    CapabilitySet, FetchQuery, FetchStream, FetchedMessage, FlagSet, ImapConfig, MailError,
    MailResult, MailSession, MailboxInfo, MailboxStatus, QuotaInfo, SessionConnector,
    StorageQuota,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct MockMessage {
    uid: u32,
    flags: FlagSet,
    source: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
struct MockMailbox {
    info: MailboxInfo,
    uid_validity: u32,
    messages: Vec<MockMessage>,
}

#[derive(Debug, Default)]
struct State {
    mailboxes: Vec<MockMailbox>,
    calls: Vec<String>,
    logins: Vec<String>,
    reject_logins: bool,
    fail_list: bool,
    capabilities: Vec<String>,
    quota: Option<QuotaInfo>,
    quota_error: bool,
    fail_source_fetch: bool,
    listing_error_after: Option<usize>,
    unselectable: HashSet<String>,
    held_locks: Vec<String>,
}

/// Shared remote state; clones observe the same server
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    state: Arc<Mutex<State>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }

    pub fn add_mailbox(&self, info: MailboxInfo) -> &Self {
        self.state().mailboxes.push(MockMailbox {
            info,
            uid_validity: 1,
            messages: Vec::new(),
        });
        self
    }

    /// Add a message; `source: None` simulates a message whose body cannot be retrieved
    pub fn add_message(&self, path: &str, uid: u32, flags: &[&str], source: Option<Vec<u8>>) {
        let mut state = self.state();
        let mailbox = state
            .mailboxes
            .iter_mut()
            .find(|mb| mb.info.path == path)
            .unwrap_or_else(|| panic!("no mailbox {}", path));
        mailbox.messages.push(MockMessage {
            uid,
            flags: flags.iter().copied().collect(),
            source,
        });
        mailbox.messages.sort_by_key(|m| m.uid);
    }

    pub fn remove_message(&self, path: &str, uid: u32) {
        let mut state = self.state();
        if let Some(mailbox) = state.mailboxes.iter_mut().find(|mb| mb.info.path == path) {
            mailbox.messages.retain(|m| m.uid != uid);
        }
    }

    pub fn set_uid_validity(&self, path: &str, uid_validity: u32) {
        let mut state = self.state();
        if let Some(mailbox) = state.mailboxes.iter_mut().find(|mb| mb.info.path == path) {
            mailbox.uid_validity = uid_validity;
        }
    }

    pub fn set_flags(&self, path: &str, uid: u32, flags: &[&str]) {
        let mut state = self.state();
        if let Some(message) = state
            .mailboxes
            .iter_mut()
            .find(|mb| mb.info.path == path)
            .and_then(|mb| mb.messages.iter_mut().find(|m| m.uid == uid))
        {
            message.flags = flags.iter().copied().collect();
        }
    }

    pub fn uids(&self, path: &str) -> Vec<u32> {
        self.state()
            .mailboxes
            .iter()
            .find(|mb| mb.info.path == path)
            .map(|mb| mb.messages.iter().map(|m| m.uid).collect())
            .unwrap_or_default()
    }

    pub fn flags(&self, path: &str, uid: u32) -> FlagSet {
        self.state()
            .mailboxes
            .iter()
            .find(|mb| mb.info.path == path)
            .and_then(|mb| mb.messages.iter().find(|m| m.uid == uid))
            .map(|m| m.flags.clone())
            .unwrap_or_default()
    }

    pub fn reject_logins(&self) {
        self.state().reject_logins = true;
    }

    pub fn fail_list(&self) {
        self.state().fail_list = true;
    }

    pub fn set_capabilities(&self, capabilities: &[&str]) {
        self.state().capabilities = capabilities.iter().map(|c| c.to_string()).collect();
    }

    /// Quota in bytes, as the session reports it
    pub fn set_quota(&self, used: u64, limit: u64) {
        self.state().quota = Some(QuotaInfo {
            storage: Some(StorageQuota { used, limit }),
        });
    }

    pub fn set_quota_info(&self, quota: Option<QuotaInfo>) {
        self.state().quota = quota;
    }

    pub fn fail_quota(&self) {
        self.state().quota_error = true;
    }

    /// Reject every FETCH that asks for message sources
    pub fn fail_source_fetch(&self) {
        self.state().fail_source_fetch = true;
    }

    /// Header listings yield `n` items, then a stream error
    pub fn fail_listing_after(&self, n: usize) {
        self.state().listing_error_after = Some(n);
    }

    pub fn make_unselectable(&self, path: &str) {
        self.state().unselectable.insert(path.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Number of logged calls starting with `prefix`
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn logins(&self) -> Vec<String> {
        self.state().logins.clone()
    }

    /// Mailboxes locked and not yet released
    pub fn held_locks(&self) -> Vec<String> {
        self.state().held_locks.clone()
    }
}

/// Parse an IMAP sequence set (`1:5,7,9:*`) against the known numbers
fn parse_set(set: &str, known: &[u32]) -> MailResult<Vec<u32>> {
    let max = known.iter().copied().max().unwrap_or(0);
    let bound = |token: &str| -> MailResult<u32> {
        if token == "*" {
            return Ok(max);
        }
        token
            .parse::<u32>()
            .map_err(|_| MailError::Imap(format!("bad sequence set: {}", set)))
    };

    let mut wanted = Vec::new();
    for part in set.split(',').filter(|p| !p.is_empty()) {
        match part.split_once(':') {
            Some((a, b)) => {
                let (a, b) = (bound(a)?, bound(b)?);
                let (lo, hi) = (a.min(b), a.max(b));
                wanted.extend(known.iter().copied().filter(|n| *n >= lo && *n <= hi));
            }
            None => {
                let n = bound(part)?;
                if known.contains(&n) {
                    wanted.push(n);
                }
            }
        }
    }
    wanted.sort_unstable();
    wanted.dedup();
    Ok(wanted)
}

/// Session bound to a [`MockServer`]
pub struct MockSession {
    server: MockServer,
    selected: Option<String>,
}

impl MockSession {
    fn selected(&self) -> MailResult<String> {
        self.selected
            .clone()
            .ok_or_else(|| MailError::Imap("No mailbox selected".to_string()))
    }
}

#[async_trait]
impl MailSession for MockSession {
    async fn logout(&mut self) -> MailResult<()> {
        self.server.record("logout".to_string());
        Ok(())
    }

    async fn list(&mut self) -> MailResult<Vec<MailboxInfo>> {
        self.server.record("list".to_string());
        let state = self.server.state();
        if state.fail_list {
            return Err(MailError::Imap("LIST failed".to_string()));
        }
        Ok(state.mailboxes.iter().map(|mb| mb.info.clone()).collect())
    }

    async fn lock_mailbox(&mut self, path: &str) -> MailResult<MailboxStatus> {
        self.server.record(format!("lock:{}", path));
        let mut state = self.server.state();
        if state.unselectable.contains(path) {
            return Err(MailError::Imap(format!("SELECT {} failed", path)));
        }
        let (exists, uid_validity) = state
            .mailboxes
            .iter()
            .find(|mb| mb.info.path == path)
            .map(|mb| (mb.messages.len() as u32, mb.uid_validity))
            .ok_or_else(|| MailError::NotFound(path.to_string()))?;

        state.held_locks.push(path.to_string());
        self.selected = Some(path.to_string());
        Ok(MailboxStatus {
            exists,
            uid_validity: Some(uid_validity),
        })
    }

    fn release_mailbox(&mut self, path: &str) {
        self.server.record(format!("release:{}", path));
        let mut state = self.server.state();
        if let Some(pos) = state.held_locks.iter().position(|p| p == path) {
            state.held_locks.remove(pos);
        }
        if self.selected.as_deref() == Some(path) {
            self.selected = None;
        }
    }

    async fn fetch<'a>(&'a mut self, set: &str, query: FetchQuery) -> MailResult<FetchStream<'a>> {
        let kind = if query.by_uid { "uid_fetch" } else { "fetch" };
        self.server.record(format!("{}:{}:{}", kind, set, if query.source { "source" } else { "flags" }));

        let path = self.selected()?;
        let state = self.server.state();
        if query.source && state.fail_source_fetch {
            return Err(MailError::Connection("connection reset".to_string()));
        }

        let messages = state
            .mailboxes
            .iter()
            .find(|mb| mb.info.path == path)
            .map(|mb| mb.messages.clone())
            .unwrap_or_default();

        // Sequence numbers are 1-based positions in UID order
        let numbered: Vec<(u32, MockMessage)> = messages
            .into_iter()
            .enumerate()
            .map(|(i, m)| (i as u32 + 1, m))
            .collect();
        let keys: Vec<u32> = numbered
            .iter()
            .map(|(seq, m)| if query.by_uid { m.uid } else { *seq })
            .collect();
        let wanted = parse_set(set, &keys)?;

        let mut items: Vec<MailResult<FetchedMessage>> = numbered
            .into_iter()
            .filter(|(seq, m)| wanted.contains(if query.by_uid { &m.uid } else { seq }))
            .map(|(seq, m)| {
                Ok(FetchedMessage {
                    seq,
                    uid: Some(m.uid),
                    flags: m.flags,
                    source: if query.source { m.source } else { None },
                })
            })
            .collect();

        if let (false, Some(n)) = (query.source, state.listing_error_after) {
            items.truncate(n);
            items.push(Err(MailError::Connection("stream interrupted".to_string())));
        }

        Ok(futures::stream::iter(items).boxed())
    }

    async fn add_flags(&mut self, uid: u32, flags: &FlagSet) -> MailResult<()> {
        self.server.record(format!("add_flags:{}:{}", uid, flags.to_imap_list()));
        let path = self.selected()?;
        let mut state = self.server.state();
        let message = state
            .mailboxes
            .iter_mut()
            .find(|mb| mb.info.path == path)
            .and_then(|mb| mb.messages.iter_mut().find(|m| m.uid == uid))
            .ok_or_else(|| MailError::NotFound(format!("UID {}", uid)))?;
        for flag in flags.iter() {
            message.flags.insert(flag);
        }
        Ok(())
    }

    async fn remove_flags(&mut self, uid: u32, flags: &FlagSet) -> MailResult<()> {
        self.server.record(format!("remove_flags:{}:{}", uid, flags.to_imap_list()));
        let path = self.selected()?;
        let mut state = self.server.state();
        let message = state
            .mailboxes
            .iter_mut()
            .find(|mb| mb.info.path == path)
            .and_then(|mb| mb.messages.iter_mut().find(|m| m.uid == uid))
            .ok_or_else(|| MailError::NotFound(format!("UID {}", uid)))?;
        message.flags = message.flags.iter().filter(|f| !flags.contains(f)).collect();
        Ok(())
    }

    async fn delete_message(&mut self, uid: u32) -> MailResult<()> {
        self.server.record(format!("delete:{}", uid));
        let path = self.selected()?;
        let mut state = self.server.state();
        let mailbox = state
            .mailboxes
            .iter_mut()
            .find(|mb| mb.info.path == path)
            .ok_or_else(|| MailError::NotFound(path.clone()))?;
        let before = mailbox.messages.len();
        mailbox.messages.retain(|m| m.uid != uid);
        if mailbox.messages.len() == before {
            return Err(MailError::NotFound(format!("UID {}", uid)));
        }
        Ok(())
    }

    async fn capabilities(&mut self) -> MailResult<CapabilitySet> {
        self.server.record("capabilities".to_string());
        let state = self.server.state();
        Ok(state.capabilities.iter().map(String::as_str).collect())
    }

    async fn get_quota(&mut self, mailbox: &str) -> MailResult<Option<QuotaInfo>> {
        self.server.record(format!("get_quota:{}", mailbox));
        let state = self.server.state();
        if state.quota_error {
            return Err(MailError::Imap("GETQUOTAROOT failed".to_string()));
        }
        Ok(state.quota.clone())
    }
}

/// Connector handing out [`MockSession`]s
#[derive(Debug, Clone)]
pub struct MockConnector {
    server: MockServer,
}

impl MockConnector {
    pub fn new(server: MockServer) -> Self {
        Self { server }
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn connect(&self, config: &ImapConfig) -> MailResult<Box<dyn MailSession>> {
        self.server.record(format!("connect:{}", config.username));
        {
            let mut state = self.server.state();
            if state.reject_logins {
                return Err(MailError::Authentication("invalid credentials".to_string()));
            }
            state.logins.push(config.username.clone());
        }

        Ok(Box::new(MockSession {
            server: self.server.clone(),
            selected: None,
        }))
    }
}

/// Minimal RFC 5322 message
pub fn message_source(subject: &str) -> Vec<u8> {
    format!(
        "From: Alice Example <alice@example.com>\r\n\
         To: bob@example.com\r\n\
         Subject: {}\r\n\
         Date: Tue, 1 Oct 2024 12:00:00 +0000\r\n\
         Message-ID: <{}@example.com>\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         Hello Bob\r\n",
        subject,
        subject.replace(' ', "-")
    )
    .into_bytes()
}

/// Server with INBOX (`/` delimiter) holding the given UIDs
pub fn server_with_inbox(uids: &[u32]) -> MockServer {
    let server = MockServer::new();
    server.add_mailbox(MailboxInfo::new("INBOX", Some("/"), None));
    for uid in uids {
        server.add_message("INBOX", *uid, &[], Some(message_source(&format!("Message {}", uid))));
    }
    server
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set() {
        let known = [1, 2, 3, 10, 20];
        assert_eq!(parse_set("1:3", &known).unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_set("3,20", &known).unwrap(), vec![3, 20]);
        assert_eq!(parse_set("10:*", &known).unwrap(), vec![10, 20]);
        assert_eq!(parse_set("4,5", &known).unwrap(), Vec::<u32>::new());
        assert!(parse_set("a:b", &known).is_err());
    }
}
