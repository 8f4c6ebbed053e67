//! The in-memory form of one retrieved message.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::address::EmailAddress;

/// Header-level metadata of a message, taken from the IMAP ENVELOPE.
///
/// Every field is optional on the wire; absent values become empty strings
/// or empty lists, and `date` stays `None` when the header is missing or
/// cannot be parsed.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct MessageMetadata {
    /// Decoded subject line (RFC 2047 encoded-words resolved).
    pub subject: String,
    /// The `Date:` header exactly as sent.
    pub raw_date: String,
    /// Parsed `Date:` header.
    pub date: Option<DateTime<Utc>>,
    /// The `Message-ID` header value, angle brackets included.
    pub message_id: String,
    /// The `In-Reply-To` header value, if present.
    pub in_reply_to: Option<String>,
    pub from: Vec<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
}

/// One retrieved message, ready for the queue.
///
/// Only [`MessageEnvelope::new`] builds these, and it demands both the
/// UID and the metadata block; the body may be empty when its section
/// could not be read.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MessageEnvelope {
    /// Owning mailbox.
    pub mailbox: String,
    /// Message sequence number at fetch time.
    pub seq: u32,
    /// Unique identifier within the mailbox.
    pub uid: u32,
    pub metadata: MessageMetadata,
    /// Raw text of the fetched body section.
    pub body: String,
    /// Hex SHA-256 over subject + body, when hashing is enabled.
    pub content_hash: Option<String>,
}

impl MessageEnvelope {
    pub fn new(
        mailbox: impl Into<String>,
        seq: u32,
        uid: u32,
        metadata: MessageMetadata,
        body: String,
    ) -> Self {
        Self {
            mailbox: mailbox.into(),
            seq,
            uid,
            metadata,
            body,
            content_hash: None,
        }
    }

    /// Fill in `content_hash` from the current subject and body.
    pub fn with_content_hash(mut self) -> Self {
        self.content_hash = Some(content_hash(&self.metadata.subject, &self.body));
        self
    }
}

/// Hex-encoded SHA-256 of `subject` followed by `body`.
pub fn content_hash(subject: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject.as_bytes());
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}
