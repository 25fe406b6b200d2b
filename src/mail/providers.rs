//! Known provider connection presets

use serde::Serialize;

/// IMAP endpoint for a known provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderPreset {
    pub host: &'static str,
    pub port: u16,
    pub secure: bool,
}

const fn implicit_tls(host: &'static str) -> ProviderPreset {
    ProviderPreset {
        host,
        port: 993,
        secure: true,
    }
}

/// Look up a provider by key (`gmail`, `outlook`, `gmx`, ...)
pub fn preset(provider: &str) -> Option<ProviderPreset> {
    let preset = match provider.trim().to_ascii_lowercase().as_str() {
        "gmail" | "google" => implicit_tls("imap.gmail.com"),
        "outlook" | "hotmail" | "microsoft" => implicit_tls("outlook.office365.com"),
        "yahoo" => implicit_tls("imap.mail.yahoo.com"),
        "icloud" => implicit_tls("imap.mail.me.com"),
        "gmx" => implicit_tls("imap.gmx.net"),
        "webde" | "web.de" => implicit_tls("imap.web.de"),
        "t-online" | "telekom" => implicit_tls("secureimap.t-online.de"),
        "ionos" | "1und1" => implicit_tls("imap.ionos.de"),
        "posteo" => implicit_tls("posteo.de"),
        "mailbox" => implicit_tls("imap.mailbox.org"),
        "yandex" => implicit_tls("imap.yandex.com"),
        _ => return None,
    };

    Some(preset)
}

/// Guess the provider key from an email address domain
pub fn provider_for_email(email: &str) -> Option<&'static str> {
    let domain = email.rsplit_once('@')?.1.to_ascii_lowercase();

    let key = match domain.as_str() {
        "gmail.com" | "googlemail.com" => "gmail",
        d if d.ends_with("outlook.com")
            || d.ends_with("hotmail.com")
            || d.ends_with("live.com") =>
        {
            "outlook"
        }
        d if d.ends_with("yahoo.com") => "yahoo",
        "icloud.com" | "me.com" | "mac.com" => "icloud",
        "gmx.de" | "gmx.net" | "gmx.at" | "gmx.ch" => "gmx",
        "web.de" => "webde",
        "t-online.de" => "t-online",
        "ionos.de" | "online.de" => "ionos",
        "posteo.de" | "posteo.net" => "posteo",
        "mailbox.org" => "mailbox",
        d if d.ends_with("yandex.com") || d.ends_with("yandex.ru") => "yandex",
        _ => return None,
    };

    Some(key)
}
