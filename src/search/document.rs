//! Mapping from message envelopes to search documents.

use serde::Serialize;
use thiserror::Error;

use crate::model::{EmailAddress, MessageEnvelope};

/// A message could not be turned into a document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    /// No Message-ID, no content hash, and UID 0 (never valid), so there is nothing to key `_id` on.
    #[error("message {mailbox}/{uid} has no Message-ID, no content hash and no valid UID")]
    MissingIdentifier { mailbox: String, uid: u32 },
}

/// One record of a bulk-ingest request.
///
/// `_id` and `@timestamp` are the primary fields the backend keys and
/// sorts on; both come from the message's own headers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    /// RFC 3339 form of the `Date:` header; omitted when it did not parse.
    #[serde(rename = "@timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub mailbox: String,
    pub uid: u32,
    pub seq: u32,
    pub subject: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    /// The `Date:` header as sent.
    pub date: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Convert `envelope` into a [`Document`].
///
/// The id is the Message-ID, falling back to the content hash, then to
/// `mailbox/uid`.
pub fn to_document(envelope: &MessageEnvelope) -> Result<Document, ConversionError> {
    let meta = &envelope.metadata;

    let id = if !meta.message_id.is_empty() {
        meta.message_id.clone()
    } else if let Some(hash) = envelope.content_hash.as_ref() {
        hash.clone()
    } else if envelope.uid != 0 {
        format!("{}/{}", envelope.mailbox, envelope.uid)
    } else {
        return Err(ConversionError::MissingIdentifier {
            mailbox: envelope.mailbox.clone(),
            uid: envelope.uid,
        });
    };

    Ok(Document {
        id,
        timestamp: meta.date.map(|d| d.to_rfc3339()),
        mailbox: envelope.mailbox.clone(),
        uid: envelope.uid,
        seq: envelope.seq,
        subject: meta.subject.clone(),
        from: display_all(&meta.from),
        to: display_all(&meta.to),
        cc: display_all(&meta.cc),
        message_id: meta.message_id.clone(),
        in_reply_to: meta.in_reply_to.clone(),
        date: meta.raw_date.clone(),
        body: envelope.body.clone(),
        hash: envelope.content_hash.clone(),
    })
}

fn display_all(addresses: &[EmailAddress]) -> Vec<String> {
    addresses.iter().map(EmailAddress::display).collect()
}
