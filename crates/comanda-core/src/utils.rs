//! Utility helpers — path resolution, address formatting, string manipulation.

use std::path::PathBuf;

/// Domain suffix for individual WhatsApp addresses.
pub const USER_JID_SUFFIX: &str = "@s.whatsapp.net";

/// Get the Comanda data directory (e.g. `~/.comanda/`).
pub fn get_data_path() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".comanda")
}

/// Phone-like identifier of an address: everything before the first `@`.
pub fn phone_from_jid(jid: &str) -> &str {
    jid.split('@').next().unwrap_or(jid)
}

/// Build a user address from a free-form phone number, keeping digits only.
///
/// Returns `None` when the input has no digits.
pub fn jid_from_number(number: &str) -> Option<String> {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("{digits}{USER_JID_SUFFIX}"))
    }
}

/// Truncate a string to `max_len` characters, adding "..." if truncated.
/// Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}
