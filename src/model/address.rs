//! Email addresses as delivered in an IMAP ENVELOPE structure.

/// A sender or recipient address.
///
/// IMAP hands addresses over pre-split (`name`, `mailbox`, `host`), so no
/// RFC 5322 string parsing is needed here.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (`user@domain`).
    pub address: String,
}

impl EmailAddress {
    /// Build an address from ENVELOPE parts.
    ///
    /// A missing host yields the bare mailbox (group syntax markers carry
    /// no host). Returns `None` when there is nothing usable at all.
    pub fn from_parts(name: Option<&str>, mailbox: Option<&str>, host: Option<&str>) -> Option<Self> {
        let mailbox = mailbox.map(str::trim).unwrap_or_default();
        let host = host.map(str::trim).unwrap_or_default();
        let address = match (mailbox.is_empty(), host.is_empty()) {
            (false, false) => format!("{mailbox}@{host}"),
            (false, true) => mailbox.to_string(),
            (true, _) => String::new(),
        };
        let display_name = strip_quotes(name.unwrap_or_default());

        if address.is_empty() && display_name.is_empty() {
            return None;
        }
        Some(Self {
            display_name,
            address,
        })
    }

    /// Format for display: `"Display Name <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        if self.display_name.is_empty() {
            self.address.clone()
        } else if self.address.is_empty() {
            self.display_name.clone()
        } else {
            format!("{} <{}>", self.display_name, self.address)
        }
    }
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
