//! Core data model types: mailboxes, message envelopes, and addresses.

pub mod address;
pub mod envelope;
pub mod mailbox;

pub use address::EmailAddress;
pub use envelope::{MessageEnvelope, MessageMetadata};
pub use mailbox::{Mailbox, MailboxPattern};
