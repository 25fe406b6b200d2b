//! Email Configuration Module

use super::connection::login_identity;
use super::providers;
use super::{MailError, MailResult};
use crate::db::Account;
use serde::{Deserialize, Serialize};

/// Security type for email connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurityType {
    #[default]
    SSL,
    STARTTLS,
    NONE,
}

impl SecurityType {
    pub fn default_imap_port(&self) -> u16 {
        match self {
            SecurityType::SSL => 993,
            SecurityType::STARTTLS => 143,
            SecurityType::NONE => 143,
        }
    }

    /// Parse the stored column value, defaulting to SSL
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "STARTTLS" => SecurityType::STARTTLS,
            "NONE" | "PLAIN" => SecurityType::NONE,
            _ => SecurityType::SSL,
        }
    }
}

/// IMAP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub security: SecurityType,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 993,
            security: SecurityType::SSL,
            username: String::new(),
            password: String::new(),
            accept_invalid_certs: false, // Secure by default
        }
    }
}

impl ImapConfig {
    /// Build the session config for a stored account.
    ///
    /// An empty host falls back to the account's provider preset. The login
    /// identity is the explicit username when set, otherwise the email.
    pub fn for_account(account: &Account) -> MailResult<Self> {
        let preset = account.provider.as_deref().and_then(providers::preset);

        let (host, port, security) = if !account.imap_host.trim().is_empty() {
            let security = SecurityType::parse(&account.imap_security);
            let port = u16::try_from(account.imap_port)
                .ok()
                .filter(|p| *p > 0)
                .unwrap_or_else(|| security.default_imap_port());
            (account.imap_host.trim().to_string(), port, security)
        } else if let Some(preset) = preset {
            let security = if preset.secure { SecurityType::SSL } else { SecurityType::STARTTLS };
            (preset.host.to_string(), preset.port, security)
        } else {
            return Err(MailError::Config(format!(
                "No IMAP host configured for account {}",
                account.id
            )));
        };

        Ok(Self {
            host,
            port,
            security,
            username: login_identity(account).to_string(),
            password: account.password.clone(),
            accept_invalid_certs: account.accept_invalid_certs,
        })
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("IMAP host is required".to_string());
        }
        if self.username.is_empty() {
            errors.push("Username is required".to_string());
        }
        if self.port == 0 {
            errors.push("IMAP port is required".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
