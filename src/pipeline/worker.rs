//! Fetch worker: retrieves every message of one mailbox onto the queue.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::queue::QueueSender;
use crate::mail::decode::decode_bytes;
use crate::mail::{FetchItem, FetchedMessage, MailConnector, MailSession};
use crate::model::{Mailbox, MessageEnvelope, MessageMetadata};
use crate::progress::ProgressSink;

/// Per-message options applied by every worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Attach a content hash to every envelope.
    pub use_hash: bool,
}

/// How a worker ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum WorkerOutcome {
    /// The whole selected range was fetched.
    Completed,
    /// The worker gave up on its mailbox (connect, login, select or fetch failure).
    Abandoned(String),
    /// The indexer stopped reading; nothing more could be delivered.
    QueueClosed,
}

/// What one worker did with its mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub mailbox: String,
    /// Message count at selection time (discovery count if never selected).
    pub expected: u32,
    /// Envelopes pushed onto the queue.
    pub emitted: u32,
    /// Envelopes emitted with an empty body because the section could not be read.
    pub body_failures: u32,
    /// Responses dropped because they lacked a UID or metadata.
    pub skipped: u32,
    /// Sum of body sizes pushed onto the queue.
    pub body_bytes: u64,
    pub outcome: WorkerOutcome,
}

impl WorkerReport {
    fn new(mailbox: &Mailbox) -> Self {
        Self {
            mailbox: mailbox.name.clone(),
            expected: mailbox.message_count,
            emitted: 0,
            body_failures: 0,
            skipped: 0,
            body_bytes: 0,
            outcome: WorkerOutcome::Completed,
        }
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self.outcome, WorkerOutcome::Abandoned(_))
    }
}

/// Fetches mailboxes through its own connection per call to [`run`](Self::run).
pub struct FetchWorker<'a, C: MailConnector> {
    connector: &'a C,
    options: FetchOptions,
    progress: &'a dyn ProgressSink,
}

impl<'a, C: MailConnector> FetchWorker<'a, C> {
    pub fn new(connector: &'a C, options: FetchOptions, progress: &'a dyn ProgressSink) -> Self {
        Self {
            connector,
            options,
            progress,
        }
    }

    /// Retrieve every message of `mailbox` and push it onto `queue`.
    ///
    /// Never fails: problems are logged and recorded in the report.
    pub fn run(&self, mailbox: &Mailbox, queue: &QueueSender) -> WorkerReport {
        let mut report = WorkerReport::new(mailbox);
        self.fetch_into(mailbox, queue, &mut report);

        match &report.outcome {
            WorkerOutcome::Completed => info!(
                mailbox = %mailbox.name,
                total = report.expected,
                parsed = report.emitted,
                "Mailbox done"
            ),
            WorkerOutcome::Abandoned(reason) => error!(
                mailbox = %mailbox.name,
                parsed = report.emitted,
                error = %reason,
                "Abandoning mailbox"
            ),
            WorkerOutcome::QueueClosed => warn!(
                mailbox = %mailbox.name,
                parsed = report.emitted,
                "Indexer stopped, abandoning mailbox"
            ),
        }
        self.settle_progress(mailbox, &report);
        self.progress.mailbox_finished(&mailbox.name);
        report
    }

    /// Discovery announced `message_count` units for this mailbox; correct
    /// the total to what was actually pushed onto the queue.
    fn settle_progress(&self, mailbox: &Mailbox, report: &WorkerReport) {
        let announced = u64::from(mailbox.message_count);
        let emitted = u64::from(report.emitted);
        if emitted < announced {
            self.progress.withdraw_work(announced - emitted);
        } else if emitted > announced {
            self.progress.add_work(emitted - announced);
        }
    }

    fn fetch_into(&self, mailbox: &Mailbox, queue: &QueueSender, report: &mut WorkerReport) {
        let mut session = match self.connector.connect() {
            Ok(s) => s,
            Err(e) => {
                report.outcome = WorkerOutcome::Abandoned(e.to_string());
                return;
            }
        };
        debug!(mailbox = %mailbox.name, "Parsing mailbox");

        match session.select(&mailbox.name) {
            Ok(count) => {
                report.expected = count;
                if count > 0 {
                    let result = session.fetch_range(1, count, &mut |fetched| {
                        self.deliver(mailbox, fetched, queue, report)
                    });
                    if let Err(e) = result {
                        report.outcome = WorkerOutcome::Abandoned(e.to_string());
                    }
                }
            }
            Err(e) => report.outcome = WorkerOutcome::Abandoned(e.to_string()),
        }

        if let Err(e) = session.logout() {
            debug!(mailbox = %mailbox.name, error = %e, "Logout failed");
        }
    }

    /// Assemble one envelope and push it. Returns `false` to stop the fetch.
    fn deliver(
        &self,
        mailbox: &Mailbox,
        fetched: FetchedMessage,
        queue: &QueueSender,
        report: &mut WorkerReport,
    ) -> bool {
        let Some(envelope) = assemble(&mailbox.name, fetched, report) else {
            report.skipped += 1;
            return true;
        };
        let envelope = if self.options.use_hash {
            envelope.with_content_hash()
        } else {
            envelope
        };

        debug!(
            mailbox = %mailbox.name,
            uid = envelope.uid,
            subject = %envelope.metadata.subject,
            "Got message"
        );
        let body_len = envelope.body.len() as u64;
        if queue.send(envelope).is_err() {
            report.outcome = WorkerOutcome::QueueClosed;
            return false;
        }
        report.emitted += 1;
        report.body_bytes += body_len;
        true
    }
}

/// Build an envelope from the fetch items of one message.
///
/// Returns `None` (logged) when the server sent no UID or no metadata;
/// an unreadable body only degrades the body to empty.
fn assemble(mailbox: &str, fetched: FetchedMessage, report: &mut WorkerReport) -> Option<MessageEnvelope> {
    let mut uid: Option<u32> = None;
    let mut metadata: Option<MessageMetadata> = None;
    let mut body = String::new();

    for item in fetched.items {
        match item {
            FetchItem::Uid(u) => uid = Some(u),
            FetchItem::Metadata(m) => metadata = Some(m),
            FetchItem::BodySection(Ok(bytes)) => body = decode_bytes(&bytes),
            FetchItem::BodySection(Err(reason)) => {
                error!(mailbox, seq = fetched.seq, error = %reason, "Failed to read body section");
                report.body_failures += 1;
            }
        }
    }

    match (uid, metadata) {
        (Some(uid), Some(metadata)) => Some(MessageEnvelope::new(mailbox, fetched.seq, uid, metadata, body)),
        (uid, metadata) => {
            warn!(
                mailbox,
                seq = fetched.seq,
                has_uid = uid.is_some(),
                has_metadata = metadata.is_some(),
                "Incomplete FETCH response, skipping message"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> WorkerReport {
        WorkerReport::new(&Mailbox::new("INBOX", 1))
    }

    #[test]
    fn test_assemble_complete_message() {
        let fetched = FetchedMessage {
            seq: 7,
            items: vec![
                FetchItem::BodySection(Ok(b"hello".to_vec())),
                FetchItem::Uid(99),
                FetchItem::Metadata(MessageMetadata {
                    subject: "hi".into(),
                    ..Default::default()
                }),
            ],
        };
        let mut rep = report();
        let env = assemble("INBOX", fetched, &mut rep).unwrap();
        assert_eq!((env.seq, env.uid), (7, 99));
        assert_eq!(env.body, "hello");
        assert_eq!(env.metadata.subject, "hi");
        assert_eq!(rep.body_failures, 0);
    }

    #[test]
    fn test_assemble_body_failure_keeps_message() {
        let fetched = FetchedMessage {
            seq: 1,
            items: vec![
                FetchItem::Uid(5),
                FetchItem::Metadata(MessageMetadata::default()),
                FetchItem::BodySection(Err("connection reset".into())),
            ],
        };
        let mut rep = report();
        let env = assemble("INBOX", fetched, &mut rep).unwrap();
        assert!(env.body.is_empty());
        assert_eq!(rep.body_failures, 1);
    }

    #[test]
    fn test_assemble_requires_uid_and_metadata() {
        let mut rep = report();
        let no_uid = FetchedMessage {
            seq: 1,
            items: vec![FetchItem::Metadata(MessageMetadata::default())],
        };
        assert!(assemble("INBOX", no_uid, &mut rep).is_none());

        let no_meta = FetchedMessage {
            seq: 2,
            items: vec![FetchItem::Uid(2), FetchItem::BodySection(Ok(Vec::new()))],
        };
        assert!(assemble("INBOX", no_meta, &mut rep).is_none());
    }
}
