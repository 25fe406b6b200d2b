//! Connection management: one authenticated session per account operation

use super::{ImapConfig, MailResult, MailSession, SessionConnector};
use crate::db::Account;
use crate::ApiResult;

/// Login identity: explicit username when present, otherwise the email
pub fn login_identity(account: &Account) -> &str {
    match account.username.as_deref().map(str::trim) {
        Some(username) if !username.is_empty() => username,
        _ => account.email.as_str(),
    }
}

/// Open an authenticated session for `account`
pub async fn open_session(
    connector: &dyn SessionConnector,
    account: &Account,
) -> MailResult<Box<dyn MailSession>> {
    let config = ImapConfig::for_account(account)?;
    log::info!(
        "Connecting account {} to {}:{} as {}",
        account.id,
        config.host,
        config.port,
        config.username
    );
    connector.connect(&config).await
}

/// Check that the account's credentials open a session, then close it again
pub async fn test_connection(connector: &dyn SessionConnector, account: &Account) -> ApiResult<()> {
    match open_session(connector, account).await {
        Ok(mut session) => {
            if let Err(e) = session.logout().await {
                log::warn!("Logout after connection test failed for account {}: {}", account.id, e);
            }
            log::info!("Connection test succeeded for account {}", account.id);
            ApiResult::ok(())
        }
        Err(e) => {
            log::warn!("Connection test failed for account {}: {}", account.id, e);
            ApiResult::err(e.to_string())
        }
    }
}
