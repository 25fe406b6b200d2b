//! Message download: raw source -> parsed record -> local store

use super::models::DownloadReport;
use crate::db::{Account, MailStore, NewAttachment, NewEmail};
use crate::mail::{parse_message, FetchQuery, FlagSet, MailSession};
use futures::StreamExt;
use std::collections::BTreeSet;

pub use crate::db::PLACEHOLDER_CATEGORY;

pub const PLACEHOLDER_SENDER: &str = "System Error";
pub const PLACEHOLDER_SENDER_EMAIL: &str = "error@local";

/// Visible stand-in for a message whose source could not be retrieved or parsed
pub fn placeholder_email(account_id: i64, folder: &str, uid: u32) -> NewEmail {
    NewEmail {
        account_id,
        uid,
        folder: folder.to_string(),
        sender: PLACEHOLDER_SENDER.to_string(),
        sender_email: PLACEHOLDER_SENDER_EMAIL.to_string(),
        subject: format!("Empty Body UID {}", uid),
        body: None,
        body_html: None,
        date: chrono::Utc::now().to_rfc3339(),
        is_read: true,
        is_flagged: false,
        smart_category: Some(PLACEHOLDER_CATEGORY.to_string()),
        has_attachments: false,
        attachments: Vec::new(),
    }
}

/// Build the stored record from a raw source, None if it does not parse
fn email_from_source(
    account_id: i64,
    folder: &str,
    uid: u32,
    flags: &FlagSet,
    source: &[u8],
) -> Option<NewEmail> {
    let parsed = parse_message(source)?;

    let attachments: Vec<NewAttachment> = parsed
        .attachments
        .iter()
        .map(|a| NewAttachment {
            filename: a.filename.clone(),
            content_type: a.content_type.clone(),
            data: a.data.clone(),
        })
        .collect();

    Some(NewEmail {
        account_id,
        uid,
        folder: folder.to_string(),
        sender: parsed.sender().to_string(),
        sender_email: parsed.from_address.clone(),
        subject: parsed.subject,
        body: parsed.body_text,
        body_html: parsed.body_html,
        date: parsed.date.unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
        is_read: flags.is_seen(),
        is_flagged: flags.is_flagged(),
        smart_category: None,
        has_attachments: !attachments.is_empty(),
        attachments,
    })
}

fn save_placeholder(store: &dyn MailStore, account_id: i64, folder: &str, uid: u32) -> bool {
    match store.save_email(&placeholder_email(account_id, folder, uid)) {
        Ok(_) => true,
        Err(e) => {
            log::error!("Failed to store placeholder for UID {} in {}: {}", uid, folder, e);
            false
        }
    }
}

/// Download `uids` from the selected mailbox into `folder`.
///
/// Messages without a usable source become placeholders. A rejected
/// batch request stores nothing and sets `batch_failed`.
pub async fn download_message_batch(
    session: &mut dyn MailSession,
    store: &dyn MailStore,
    account: &Account,
    uids: &[u32],
    folder: &str,
) -> DownloadReport {
    let mut report = DownloadReport::default();
    let mut pending: BTreeSet<u32> = uids.iter().copied().collect();
    if pending.is_empty() {
        return report;
    }

    let set = pending
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");

    let mut stream = match session.fetch(&set, FetchQuery::sources_by_uid()).await {
        Ok(stream) => stream,
        Err(e) => {
            log::warn!(
                "Batch fetch of {} UIDs in {} failed: {}",
                pending.len(),
                folder,
                e
            );
            report.batch_failed = true;
            return report;
        }
    };

    while let Some(item) = stream.next().await {
        let message = match item {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Batch fetch in {} interrupted: {}", folder, e);
                report.batch_failed = true;
                return report;
            }
        };

        let Some(uid) = message.uid.filter(|uid| pending.remove(uid)) else {
            continue;
        };

        let email = message
            .source
            .as_deref()
            .and_then(|source| email_from_source(account.id, folder, uid, &message.flags, source));

        match email {
            Some(email) => match store.save_email(&email) {
                Ok(_) => report.saved += 1,
                Err(e) => {
                    log::error!("Failed to store UID {} in {}: {}", uid, folder, e);
                    if save_placeholder(store, account.id, folder, uid) {
                        report.placeholders += 1;
                    }
                }
            },
            None => {
                log::warn!("UID {} in {} has no usable source, storing placeholder", uid, folder);
                if save_placeholder(store, account.id, folder, uid) {
                    report.placeholders += 1;
                }
            }
        }
    }

    // Requested but never returned by the server
    for uid in pending {
        log::warn!("UID {} missing from fetch response in {}, storing placeholder", uid, folder);
        if save_placeholder(store, account.id, folder, uid) {
            report.placeholders += 1;
        }
    }

    log::debug!(
        "Batch in {}: {} saved, {} placeholders",
        folder,
        report.saved,
        report.placeholders
    );
    report
}
