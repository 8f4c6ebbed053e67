//! IMAP transport over implicit TLS, built on the `imap` crate.

use std::net::TcpStream;

use imap::types::{NameAttribute, StatusAttribute, UnsolicitedResponse};
use imap_proto::types::{Address, Envelope};
use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, warn};

use super::decode::{decode_bytes, decode_header_value, normalize_message_id, parse_date};
use super::{FetchItem, FetchedMessage, MailConnector, MailSession};
use crate::config::ImapConfig;
use crate::error::{IndexerError, Result};
use crate::model::{EmailAddress, Mailbox, MailboxPattern, MessageMetadata};

/// FETCH attributes requested per message. `BODY.PEEK[]` keeps `\Seen` untouched.
const FETCH_QUERY: &str = "(UID ENVELOPE BODY.PEEK[])";

/// Messages per FETCH command. The `imap` crate buffers a whole response,
/// so this bounds what a worker holds before handing messages on.
const FETCH_WINDOW: u32 = 100;

/// Opens one TLS session per [`connect`](MailConnector::connect) call.
pub struct ImapConnector {
    host: String,
    port: u16,
    username: String,
    password: String,
    tls: TlsConnector,
}

impl ImapConnector {
    pub fn new(config: &ImapConfig) -> Result<Self> {
        let (host, port) = config.host_and_port()?;
        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| IndexerError::connection(&config.address, e))?;

        Ok(Self {
            host,
            port,
            username: config.username.clone(),
            password: config.password.clone(),
            tls,
        })
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for ImapConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConnector")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish()
    }
}

impl MailConnector for ImapConnector {
    type Session = ImapSession;

    fn connect(&self) -> Result<ImapSession> {
        let client = imap::connect((self.host.as_str(), self.port), &self.host, &self.tls)
            .map_err(|e| IndexerError::connection(self.address(), e))?;

        let session = client
            .login(&self.username, &self.password)
            .map_err(|(e, _client)| IndexerError::Authentication {
                username: self.username.clone(),
                reason: e.to_string(),
            })?;

        debug!(address = %self.address(), "IMAP session established");
        Ok(ImapSession {
            inner: session,
            selected: None,
        })
    }
}

/// An authenticated IMAP session.
pub struct ImapSession {
    inner: imap::Session<TlsStream<TcpStream>>,
    selected: Option<String>,
}

impl MailSession for ImapSession {
    fn list_mailboxes(&mut self, pattern: &MailboxPattern) -> Result<Vec<Mailbox>> {
        let names = self
            .inner
            .list(Some(""), Some(pattern.as_str()))
            .map_err(|e| IndexerError::Discovery(format!("LIST {pattern}: {e}")))?;

        let mut mailboxes = Vec::with_capacity(names.len());
        for name in names.iter() {
            if name.attributes().contains(&NameAttribute::NoSelect) {
                debug!(mailbox = name.name(), "Skipping \\Noselect mailbox");
                continue;
            }
            let delimiter = name.delimiter().and_then(|d| d.chars().next());
            if !pattern.matches(name.name(), delimiter) {
                debug!(mailbox = name.name(), "Server returned mailbox outside pattern");
                continue;
            }

            let count = self.message_count(name.name())?;
            mailboxes.push(Mailbox::new(name.name(), count));
        }

        Ok(mailboxes)
    }

    fn select(&mut self, mailbox: &str) -> Result<u32> {
        let info = self
            .inner
            .examine(mailbox)
            .map_err(|e| IndexerError::select(mailbox, e))?;
        self.selected = Some(mailbox.to_string());
        Ok(info.exists)
    }

    fn fetch_range(
        &mut self,
        start: u32,
        end: u32,
        sink: &mut dyn FnMut(FetchedMessage) -> bool,
    ) -> Result<()> {
        for (first, last) in fetch_windows(start, end, FETCH_WINDOW) {
            let fetches = self
                .inner
                .fetch(format!("{first}:{last}"), FETCH_QUERY)
                .map_err(|e| {
                    IndexerError::Protocol(format!(
                        "FETCH {first}:{last} in '{}': {e}",
                        self.selected.as_deref().unwrap_or("<none>")
                    ))
                })?;

            for fetch in fetches.iter() {
                let message = fetched_message(fetch.message, fetch.uid, fetch.envelope(), fetch.body());
                if !sink(message) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn logout(&mut self) -> Result<()> {
        self.inner
            .logout()
            .map_err(|e| IndexerError::Protocol(format!("LOGOUT: {e}")))
    }
}

impl ImapSession {
    /// `STATUS <mailbox> (MESSAGES)`.
    ///
    /// The `imap` crate delivers the STATUS data as an unsolicited response,
    /// so the count is read back from that channel, which is drained here.
    fn message_count(&mut self, mailbox: &str) -> Result<u32> {
        self.inner
            .status(mailbox, "(MESSAGES)")
            .map_err(|e| IndexerError::Discovery(format!("STATUS {mailbox}: {e}")))?;

        let responses: Vec<_> = self.inner.unsolicited_responses.try_iter().collect();
        match status_messages(mailbox, responses) {
            Some(count) => Ok(count),
            None => {
                warn!(mailbox, "No MESSAGES count in STATUS response, assuming 0");
                Ok(0)
            }
        }
    }
}

/// Pick the `MESSAGES` attribute of the STATUS response for `mailbox`.
fn status_messages(
    mailbox: &str,
    responses: impl IntoIterator<Item = UnsolicitedResponse>,
) -> Option<u32> {
    let mut count = None;
    for response in responses {
        let UnsolicitedResponse::Status { mailbox: name, attributes } = response else {
            continue;
        };
        if !same_mailbox(&name, mailbox) {
            debug!(expected = mailbox, got = %name, "Ignoring STATUS for another mailbox");
            continue;
        }
        for attribute in attributes {
            if let StatusAttribute::Messages(n) = attribute {
                count = Some(n);
            }
        }
    }
    count
}

fn same_mailbox(a: &str, b: &str) -> bool {
    a == b || (a.eq_ignore_ascii_case("INBOX") && b.eq_ignore_ascii_case("INBOX"))
}

/// Split `start..=end` into consecutive inclusive ranges of at most `size` messages.
fn fetch_windows(start: u32, end: u32, size: u32) -> impl Iterator<Item = (u32, u32)> {
    let size = size.max(1);
    let first = start.max(1);
    let mut next = Some(first).filter(|&s| s <= end);
    std::iter::from_fn(move || {
        let lo = next?;
        let hi = lo.saturating_add(size - 1).min(end);
        next = hi.checked_add(1).filter(|&n| n <= end);
        Some((lo, hi))
    })
}

/// Translate one FETCH response into the transport-neutral item list.
fn fetched_message(
    seq: u32,
    uid: Option<u32>,
    envelope: Option<&Envelope<'_>>,
    body: Option<&[u8]>,
) -> FetchedMessage {
    let mut items = Vec::with_capacity(3);

    if let Some(uid) = uid {
        items.push(FetchItem::Uid(uid));
    }

    if let Some(envelope) = envelope {
        items.push(FetchItem::Metadata(metadata_from_envelope(envelope)));
    }

    match body {
        Some(body) => items.push(FetchItem::BodySection(Ok(body.to_vec()))),
        None => {
            warn!(seq, "FETCH response carried no body section");
            items.push(FetchItem::BodySection(Err(
                "server returned no BODY[] data".to_string(),
            )));
        }
    }

    FetchedMessage { seq, items }
}

fn metadata_from_envelope(envelope: &Envelope<'_>) -> MessageMetadata {
    let raw_date = envelope.date.map(decode_bytes).unwrap_or_default();
    MessageMetadata {
        subject: envelope.subject.map(decode_header_value).unwrap_or_default(),
        date: parse_date(&raw_date),
        raw_date,
        message_id: envelope.message_id.map(normalize_message_id).unwrap_or_default(),
        in_reply_to: envelope
            .in_reply_to
            .map(normalize_message_id)
            .filter(|id| !id.is_empty()),
        from: addresses(envelope.from.as_deref()),
        to: addresses(envelope.to.as_deref()),
        cc: addresses(envelope.cc.as_deref()),
    }
}

fn addresses(list: Option<&[Address<'_>]>) -> Vec<EmailAddress> {
    list.unwrap_or_default()
        .iter()
        .filter_map(|addr| {
            let name = addr.name.map(decode_header_value);
            let mailbox = addr.mailbox.map(decode_bytes);
            let host = addr.host.map(decode_bytes);
            EmailAddress::from_parts(name.as_deref(), mailbox.as_deref(), host.as_deref())
        })
        .collect()
}
