//! Async IMAP Session Implementation using async-imap
//!
//! Production [`MailSession`] over implicit TLS.

use super::{
    CapabilitySet, FetchQuery, FetchStream, FetchedMessage, FlagSet, ImapConfig, MailError,
    MailResult, MailSession, MailboxInfo, MailboxStatus, QuotaInfo, SecurityType, SessionConnector,
    StorageQuota,
};
use ::async_imap::types::{Fetch, Flag, NameAttribute, QuotaResourceName};
use ::async_imap::Session;
use async_trait::async_trait;
use futures::{pin_mut, StreamExt, TryStreamExt};
use tokio_util::compat::TokioAsyncReadCompatExt;

type TlsStream = async_native_tls::TlsStream<tokio_util::compat::Compat<tokio::net::TcpStream>>;

/// Capabilities the engine cares about
const KNOWN_CAPABILITIES: [&str; 6] = ["QUOTA", "UIDPLUS", "IMAP4REV2", "MOVE", "IDLE", "SPECIAL-USE"];

/// UID EXPUNGE is part of UIDPLUS and of IMAP4rev2
fn supports_uid_expunge(capabilities: &CapabilitySet) -> bool {
    capabilities.contains("UIDPLUS") || capabilities.contains("IMAP4rev2")
}

/// SECURITY: Sanitize folder name for IMAP operations
fn sanitize_folder_name(folder: &str) -> String {
    folder
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\0' | '"' | '\\'))
        .collect()
}

fn imap_err(e: ::async_imap::error::Error) -> MailError {
    MailError::Imap(e.to_string())
}

fn flag_token(flag: &Flag<'_>) -> String {
    match flag {
        Flag::Seen => "\\Seen".to_string(),
        Flag::Answered => "\\Answered".to_string(),
        Flag::Flagged => "\\Flagged".to_string(),
        Flag::Deleted => "\\Deleted".to_string(),
        Flag::Draft => "\\Draft".to_string(),
        Flag::Recent => "\\Recent".to_string(),
        Flag::MayCreate => "\\*".to_string(),
        Flag::Custom(name) => name.to_string(),
    }
}

fn special_use_of(attributes: &[NameAttribute<'_>]) -> Option<String> {
    attributes.iter().find_map(|attr| match attr {
        NameAttribute::Sent => Some("\\Sent".to_string()),
        NameAttribute::Trash => Some("\\Trash".to_string()),
        NameAttribute::Junk => Some("\\Junk".to_string()),
        NameAttribute::Drafts => Some("\\Drafts".to_string()),
        NameAttribute::Archive => Some("\\Archive".to_string()),
        NameAttribute::All => Some("\\All".to_string()),
        NameAttribute::Flagged => Some("\\Flagged".to_string()),
        NameAttribute::Extension(label) => {
            let lower = label.to_ascii_lowercase();
            ["\\sent", "\\trash", "\\junk", "\\spam"]
                .iter()
                .any(|s| lower == *s)
                .then(|| label.to_string())
        }
        _ => None,
    })
}

fn to_fetched(fetch: &Fetch) -> FetchedMessage {
    FetchedMessage {
        seq: fetch.message,
        uid: fetch.uid,
        flags: fetch.flags().map(|f| flag_token(&f)).collect(),
        source: fetch.body().map(<[u8]>::to_vec),
    }
}

/// Authenticated async-imap session
pub struct AsyncImapSession {
    session: Session<TlsStream>,
    selected: Option<String>,
}

impl AsyncImapSession {
    /// Connect to the IMAP server and log in
    pub async fn connect(config: &ImapConfig) -> MailResult<Self> {
        if let Err(errors) = config.validate() {
            return Err(MailError::Config(errors.join(", ")));
        }

        let port = match config.security {
            SecurityType::SSL => config.port,
            SecurityType::STARTTLS => {
                // For STARTTLS, fallback to SSL on port 993
                log::info!("STARTTLS requested for {}, using implicit TLS on 993", config.host);
                993
            }
            SecurityType::NONE => {
                return Err(MailError::Config(
                    "Unencrypted connections are not supported. Please use SSL/TLS or STARTTLS."
                        .to_string(),
                ));
            }
        };

        // Configure TLS based on account settings
        let tls = if config.accept_invalid_certs {
            log::warn!("⚠️  Accepting invalid SSL certificates for {}", config.host);
            async_native_tls::TlsConnector::new().danger_accept_invalid_certs(true)
        } else {
            async_native_tls::TlsConnector::new()
        };

        let address = format!("{}:{}", config.host, port);
        let stream = tokio::net::TcpStream::connect(&address)
            .await
            .map_err(|e| MailError::Connection(e.to_string()))?;

        let tls_stream = tls
            .connect(&config.host, stream.compat())
            .await
            .map_err(|e| MailError::Connection(e.to_string()))?;

        let client = ::async_imap::Client::new(tls_stream);
        let session = client
            .login(&config.username, &config.password)
            .await
            .map_err(|e| MailError::Authentication(e.0.to_string()))?;

        log::info!("Async IMAP connected to: {}", config.host);
        Ok(Self {
            session,
            selected: None,
        })
    }

    async fn store(&mut self, uid: u32, command: String) -> MailResult<()> {
        let stream = self
            .session
            .uid_store(uid.to_string(), &command)
            .await
            .map_err(imap_err)?;
        pin_mut!(stream);
        while let Some(item) = stream.next().await {
            item.map_err(imap_err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl MailSession for AsyncImapSession {
    async fn logout(&mut self) -> MailResult<()> {
        self.selected = None;
        self.session.logout().await.map_err(imap_err)
    }

    async fn list(&mut self) -> MailResult<Vec<MailboxInfo>> {
        let names: Vec<_> = self
            .session
            .list(Some(""), Some("*"))
            .await
            .map_err(imap_err)?
            .try_collect()
            .await
            .map_err(imap_err)?;

        let mailboxes = names
            .iter()
            .filter(|name| {
                !name
                    .attributes()
                    .iter()
                    .any(|a| matches!(a, NameAttribute::NoSelect))
            })
            .map(|name| {
                MailboxInfo::new(
                    name.name(),
                    name.delimiter(),
                    special_use_of(name.attributes()).as_deref(),
                )
            })
            .collect::<Vec<_>>();

        log::info!("Listed {} selectable mailboxes", mailboxes.len());
        Ok(mailboxes)
    }

    async fn lock_mailbox(&mut self, path: &str) -> MailResult<MailboxStatus> {
        let safe_folder = sanitize_folder_name(path);
        if let Some(current) = &self.selected {
            log::warn!("Mailbox {} still locked while selecting {}", current, safe_folder);
        }

        let mailbox = self.session.select(&safe_folder).await.map_err(|e| {
            log::error!("Failed to select folder {}: {}", safe_folder, e);
            imap_err(e)
        })?;

        self.selected = Some(safe_folder);
        Ok(MailboxStatus {
            exists: mailbox.exists,
            uid_validity: mailbox.uid_validity,
        })
    }

    fn release_mailbox(&mut self, path: &str) {
        if self.selected.as_deref() == Some(sanitize_folder_name(path).as_str()) {
            self.selected = None;
        }
    }

    async fn fetch<'a>(&'a mut self, set: &str, query: FetchQuery) -> MailResult<FetchStream<'a>> {
        let items = if query.source {
            "(UID FLAGS BODY.PEEK[])"
        } else {
            "(UID FLAGS)"
        };

        let stream = if query.by_uid {
            self.session.uid_fetch(set, items).await.map_err(imap_err)?.boxed()
        } else {
            self.session.fetch(set, items).await.map_err(imap_err)?.boxed()
        };

        Ok(stream
            .map(|item| item.map(|fetch| to_fetched(&fetch)).map_err(imap_err))
            .boxed())
    }

    async fn add_flags(&mut self, uid: u32, flags: &FlagSet) -> MailResult<()> {
        self.store(uid, format!("+FLAGS ({})", flags.to_imap_list())).await
    }

    async fn remove_flags(&mut self, uid: u32, flags: &FlagSet) -> MailResult<()> {
        self.store(uid, format!("-FLAGS ({})", flags.to_imap_list())).await
    }

    async fn delete_message(&mut self, uid: u32) -> MailResult<()> {
        self.store(uid, format!("+FLAGS ({})", FlagSet::DELETED)).await?;

        let capabilities = self.capabilities().await?;
        let stream = if supports_uid_expunge(&capabilities) {
            self.session.uid_expunge(uid.to_string()).await.map_err(imap_err)?.boxed()
        } else {
            // Plain EXPUNGE also removes every other \Deleted message in the mailbox
            log::warn!(
                "Server lacks UIDPLUS, expunging all deleted messages in {}",
                self.selected.as_deref().unwrap_or("the selected mailbox")
            );
            self.session.expunge().await.map_err(imap_err)?.boxed()
        };

        pin_mut!(stream);
        while let Some(item) = stream.next().await {
            item.map_err(imap_err)?;
        }

        Ok(())
    }

    async fn capabilities(&mut self) -> MailResult<CapabilitySet> {
        let caps = self.session.capabilities().await.map_err(imap_err)?;
        Ok(KNOWN_CAPABILITIES
            .iter()
            .copied()
            .filter(|name| caps.has_str(*name))
            .collect())
    }

    async fn get_quota(&mut self, mailbox: &str) -> MailResult<Option<QuotaInfo>> {
        let (_roots, quotas) = self
            .session
            .get_quota_root(&sanitize_folder_name(mailbox))
            .await
            .map_err(imap_err)?;

        // RFC 9208 reports STORAGE in units of 1024 octets
        let storage = quotas
            .iter()
            .flat_map(|quota| quota.resources.iter())
            .find(|resource| matches!(resource.name, QuotaResourceName::Storage))
            .map(|resource| StorageQuota {
                used: resource.usage.saturating_mul(1024),
                limit: resource.limit.saturating_mul(1024),
            });

        if quotas.is_empty() {
            return Ok(None);
        }
        Ok(Some(QuotaInfo { storage }))
    }
}

/// Connector that opens [`AsyncImapSession`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncImapConnector;

#[async_trait]
impl SessionConnector for AsyncImapConnector {
    async fn connect(&self, config: &ImapConfig) -> MailResult<Box<dyn MailSession>> {
        let session = AsyncImapSession::connect(config).await?;
        Ok(Box::new(session))
    }
}
