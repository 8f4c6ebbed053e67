//! Mail server access.
//!
//! The pipeline only talks to the traits defined here. [`imap::ImapConnector`]
//! is the production implementation; tests plug in an in-memory server.

pub mod decode;
pub mod imap;

use crate::error::Result;
use crate::model::{Mailbox, MailboxPattern, MessageMetadata};

/// Opens authenticated sessions.
///
/// Shared by reference across worker threads; every call to
/// [`connect`](MailConnector::connect) must produce an independent session
/// because a session's protocol state cannot be used concurrently.
pub trait MailConnector: Sync {
    type Session: MailSession;

    /// Connect and authenticate.
    fn connect(&self) -> Result<Self::Session>;
}

/// One authenticated connection.
pub trait MailSession {
    /// List the mailboxes matching `pattern` together with their message counts.
    fn list_mailboxes(&mut self, pattern: &MailboxPattern) -> Result<Vec<Mailbox>>;

    /// Select `mailbox` read-only and return its current message count.
    fn select(&mut self, mailbox: &str) -> Result<u32>;

    /// Fetch sequence numbers `start..=end` with UID, metadata and body.
    ///
    /// Messages are handed to `sink` in server order. Returning `false` from
    /// the sink stops delivery early.
    fn fetch_range(
        &mut self,
        start: u32,
        end: u32,
        sink: &mut dyn FnMut(FetchedMessage) -> bool,
    ) -> Result<()>;

    /// Close the session.
    fn logout(&mut self) -> Result<()>;
}

/// One data item of a FETCH response.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchItem {
    Uid(u32),
    Metadata(MessageMetadata),
    /// The body section, or why it could not be read.
    BodySection(std::result::Result<Vec<u8>, String>),
}

/// All items the server returned for one sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMessage {
    pub seq: u32,
    pub items: Vec<FetchItem>,
}
