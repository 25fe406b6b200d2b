//! Best-effort storage quota

use super::models::QuotaSnapshot;
use crate::mail::{MailSession, QuotaInfo};

/// Convert a byte quota to rounded KB. None without a usable storage limit.
pub fn to_snapshot(quota: &QuotaInfo) -> Option<QuotaSnapshot> {
    let storage = quota.storage?;
    if storage.limit == 0 {
        return None;
    }

    let to_kb = |bytes: u64| (bytes as f64 / 1024.0).round() as i64;
    Some(QuotaSnapshot {
        used_kb: to_kb(storage.used),
        total_kb: to_kb(storage.limit),
    })
}

/// Query the quota of `mailbox`. Absence and failure both yield None.
pub async fn check_account_quota(
    session: &mut dyn MailSession,
    account_id: i64,
    mailbox: &str,
) -> Option<QuotaSnapshot> {
    match session.capabilities().await {
        Ok(caps) if caps.contains("QUOTA") => {}
        Ok(_) => {
            log::debug!("Account {}: server does not advertise QUOTA", account_id);
            return None;
        }
        Err(e) => {
            log::debug!("Account {}: capability check failed: {}", account_id, e);
            return None;
        }
    }

    match session.get_quota(mailbox).await {
        Ok(Some(quota)) => {
            let snapshot = to_snapshot(&quota);
            if let Some(s) = snapshot {
                log::info!("Account {}: quota {} / {} KB", account_id, s.used_kb, s.total_kb);
            }
            snapshot
        }
        Ok(None) => None,
        Err(e) => {
            log::debug!("Account {}: quota lookup failed: {}", account_id, e);
            None
        }
    }
}
