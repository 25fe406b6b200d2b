//! Raw message parsing backed by `mail-parser`

use mail_parser::{MessageParser, MimeHeaders};

/// Attachment extracted from a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Headers, bodies and attachments of a raw RFC 5322 message
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    pub subject: String,
    pub from_name: Option<String>,
    pub from_address: String,
    /// RFC 3339, None when the Date header is missing or unparsable
    pub date: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub attachments: Vec<ParsedAttachment>,
}

impl ParsedMessage {
    /// Display sender: the name when present, otherwise the address
    pub fn sender(&self) -> &str {
        match self.from_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.from_address,
        }
    }
}

/// Parse a raw message source. Returns None for empty or unparsable input.
pub fn parse_message(raw: &[u8]) -> Option<ParsedMessage> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    let message = MessageParser::default().parse(raw)?;

    let from = message.from().and_then(|addrs| addrs.first());
    let from_address = from
        .and_then(|addr| addr.address())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string());
    let from_name = from.and_then(|addr| addr.name()).map(str::to_string);

    let subject = message
        .subject()
        .map(str::to_string)
        .unwrap_or_else(|| "(No subject)".to_string());

    let date = message.date().map(|d| d.to_rfc3339());

    let body_text = message.body_text(0).map(|s| s.to_string());
    let body_html = message.body_html(0).map(|s| s.to_string());

    let attachments = message
        .attachments()
        .enumerate()
        .map(|(index, part)| {
            let content_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());

            ParsedAttachment {
                filename: part
                    .attachment_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("attachment-{}", index + 1)),
                content_type,
                data: part.contents().to_vec(),
            }
        })
        .collect();

    Some(ParsedMessage {
        subject,
        from_name,
        from_address,
        date,
        body_text,
        body_html,
        attachments,
    })
}
