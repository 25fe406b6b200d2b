//! UID discovery: cheap header-only listing of a selected mailbox

use crate::mail::{FetchQuery, FlagSet, MailResult, MailSession};
use futures::StreamExt;

/// UID and flags of one listed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    pub uid: u32,
    pub flags: FlagSet,
}

#[derive(Debug, Clone, Default)]
pub struct UidBatch {
    pub uids: Vec<u32>,
    pub headers: Vec<HeaderRecord>,
    /// The stream was drained to its end without an error
    pub complete: bool,
}

impl UidBatch {
    pub fn empty() -> Self {
        Self {
            complete: true,
            ..Default::default()
        }
    }
}

/// List UIDs and flags for a sequence range such as `1:50`.
///
/// Never requests message sources. An error in the middle of the stream
/// keeps what was received so far and marks the batch incomplete.
pub async fn fetch_uid_batch(session: &mut dyn MailSession, range: &str) -> MailResult<UidBatch> {
    let range = range.trim();
    if range.is_empty() {
        return Ok(UidBatch::empty());
    }

    let mut stream = session.fetch(range, FetchQuery::headers_by_seq()).await?;
    let mut batch = UidBatch::default();

    while let Some(item) = stream.next().await {
        match item {
            Ok(message) => {
                let Some(uid) = message.uid else {
                    log::debug!("Skipping seq {} without UID", message.seq);
                    continue;
                };
                batch.uids.push(uid);
                batch.headers.push(HeaderRecord {
                    uid,
                    flags: message.flags,
                });
            }
            Err(e) => {
                log::warn!(
                    "UID listing {} interrupted after {} messages: {}",
                    range,
                    batch.uids.len(),
                    e
                );
                return Ok(batch);
            }
        }
    }

    batch.complete = true;
    Ok(batch)
}
