//! In-memory collaborators for pipeline tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::StatusCode;

use imapindexer::error::{IndexerError, Result};
use imapindexer::mail::{FetchItem, FetchedMessage, MailConnector, MailSession};
use imapindexer::model::{Mailbox, MailboxPattern, MessageMetadata};
use imapindexer::pipeline::{FetchOptions, PipelineSettings};
use imapindexer::progress::ProgressSink;
use imapindexer::search::{BulkResponse, Document, SearchBackend, SearchError};

/// One stored message.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub uid: u32,
    pub subject: String,
    pub message_id: String,
    pub body: Option<Vec<u8>>,
}

impl StoredMessage {
    pub fn new(uid: u32, mailbox: &str) -> Self {
        Self {
            uid,
            subject: format!("{mailbox} #{uid}"),
            message_id: format!("<{uid}.{}@example.com>", mailbox.replace('/', ".")),
            body: Some(format!("body of {mailbox} #{uid}").into_bytes()),
        }
    }
}

#[derive(Default)]
struct Shared {
    mailboxes: Vec<(String, Vec<StoredMessage>)>,
    /// Connections numbered from 1; these ones are refused.
    refuse_connections: HashSet<usize>,
    refuse_select: HashSet<String>,
    fail_list: bool,
    fetch_delay: Duration,
    connects: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    selected: Mutex<Vec<String>>,
}

/// A mail server living in memory. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryServer {
    shared: Arc<Shared>,
}

/// Builder for [`MemoryServer`].
#[derive(Default)]
pub struct MemoryServerBuilder {
    shared: Shared,
}

impl MemoryServerBuilder {
    /// Add a mailbox with `count` generated messages (UIDs start at 100).
    pub fn mailbox(mut self, name: &str, count: u32) -> Self {
        let messages = (0..count)
            .map(|i| StoredMessage::new(100 + i, name))
            .collect();
        self.shared.mailboxes.push((name.to_string(), messages));
        self
    }

    pub fn mailbox_with(mut self, name: &str, messages: Vec<StoredMessage>) -> Self {
        self.shared.mailboxes.push((name.to_string(), messages));
        self
    }

    pub fn refuse_connection(mut self, nth: usize) -> Self {
        self.shared.refuse_connections.insert(nth);
        self
    }

    pub fn refuse_select(mut self, mailbox: &str) -> Self {
        self.shared.refuse_select.insert(mailbox.to_string());
        self
    }

    pub fn fail_list(mut self) -> Self {
        self.shared.fail_list = true;
        self
    }

    pub fn fetch_delay(mut self, delay: Duration) -> Self {
        self.shared.fetch_delay = delay;
        self
    }

    pub fn build(self) -> MemoryServer {
        MemoryServer {
            shared: Arc::new(self.shared),
        }
    }
}

impl MemoryServer {
    pub fn builder() -> MemoryServerBuilder {
        MemoryServerBuilder::default()
    }

    /// Connections opened, discovery included.
    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open connections.
    pub fn peak(&self) -> usize {
        self.shared.peak.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Mailboxes selected, in selection order.
    pub fn selected(&self) -> Vec<String> {
        self.shared.selected.lock().unwrap().clone()
    }
}

impl MailConnector for MemoryServer {
    type Session = MemorySession;

    fn connect(&self) -> Result<MemorySession> {
        let n = self.shared.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if self.shared.refuse_connections.contains(&n) {
            return Err(IndexerError::connection("memory:993", "connection refused"));
        }
        let now = self.shared.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.peak.fetch_max(now, Ordering::SeqCst);
        Ok(MemorySession {
            shared: Arc::clone(&self.shared),
            selected: None,
        })
    }
}

pub struct MemorySession {
    shared: Arc<Shared>,
    selected: Option<usize>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.shared.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MailSession for MemorySession {
    fn list_mailboxes(&mut self, pattern: &MailboxPattern) -> Result<Vec<Mailbox>> {
        if self.shared.fail_list {
            return Err(IndexerError::Discovery("LIST rejected".into()));
        }
        Ok(self
            .shared
            .mailboxes
            .iter()
            .filter(|(name, _)| pattern.matches(name, Some('/')))
            .map(|(name, msgs)| Mailbox::new(name.clone(), msgs.len() as u32))
            .collect())
    }

    fn select(&mut self, mailbox: &str) -> Result<u32> {
        if self.shared.refuse_select.contains(mailbox) {
            return Err(IndexerError::select(mailbox, "NO access denied"));
        }
        let idx = self
            .shared
            .mailboxes
            .iter()
            .position(|(name, _)| name == mailbox)
            .ok_or_else(|| IndexerError::select(mailbox, "NO no such mailbox"))?;
        self.selected = Some(idx);
        self.shared.selected.lock().unwrap().push(mailbox.to_string());
        Ok(self.shared.mailboxes[idx].1.len() as u32)
    }

    fn fetch_range(
        &mut self,
        start: u32,
        end: u32,
        sink: &mut dyn FnMut(FetchedMessage) -> bool,
    ) -> Result<()> {
        let idx = self
            .selected
            .ok_or_else(|| IndexerError::Protocol("FETCH without SELECT".into()))?;
        let messages = &self.shared.mailboxes[idx].1;

        for seq in start..=end {
            let Some(msg) = messages.get(seq as usize - 1) else {
                break;
            };
            if !self.shared.fetch_delay.is_zero() {
                std::thread::sleep(self.shared.fetch_delay);
            }
            let body = match &msg.body {
                Some(b) => FetchItem::BodySection(Ok(b.clone())),
                None => FetchItem::BodySection(Err("literal truncated".into())),
            };
            let fetched = FetchedMessage {
                seq,
                items: vec![
                    FetchItem::Uid(msg.uid),
                    FetchItem::Metadata(MessageMetadata {
                        subject: msg.subject.clone(),
                        message_id: msg.message_id.clone(),
                        ..Default::default()
                    }),
                    body,
                ],
            };
            if !sink(fetched) {
                break;
            }
        }
        Ok(())
    }

    fn logout(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Backend that keeps every batch; calls listed in `fail_calls` (1-based) fail.
#[derive(Default)]
pub struct RecordingBackend {
    pub batches: Mutex<Vec<Vec<Document>>>,
    pub fail_calls: HashSet<usize>,
    pub delay: Duration,
}

impl RecordingBackend {
    pub fn failing(calls: &[usize]) -> Self {
        Self {
            fail_calls: calls.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }
}

impl SearchBackend for RecordingBackend {
    fn bulk_ingest(&self, _index: &str, documents: &[Document]) -> std::result::Result<BulkResponse, SearchError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let mut batches = self.batches.lock().unwrap();
        batches.push(documents.to_vec());
        if self.fail_calls.contains(&batches.len()) {
            return Err(SearchError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "shard failure".into(),
            });
        }
        Ok(BulkResponse {
            accepted: documents.len(),
        })
    }
}

/// Progress sink that counts what it is told.
#[derive(Default)]
pub struct CountingProgress {
    pub work: AtomicUsize,
    pub completed: AtomicUsize,
    pub withdrawn: AtomicUsize,
    pub mailboxes: AtomicUsize,
    pub finished_mailboxes: AtomicUsize,
}

impl ProgressSink for CountingProgress {
    fn add_work(&self, units: u64) {
        self.work.fetch_add(units as usize, Ordering::SeqCst);
    }

    fn complete(&self, units: u64) {
        self.completed.fetch_add(units as usize, Ordering::SeqCst);
    }

    fn withdraw_work(&self, units: u64) {
        self.withdrawn.fetch_add(units as usize, Ordering::SeqCst);
    }

    fn mailboxes_discovered(&self, count: u64) {
        self.mailboxes.fetch_add(count as usize, Ordering::SeqCst);
    }

    fn mailbox_finished(&self, _mailbox: &str) {
        self.finished_mailboxes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn settings(workers: usize, batch: usize) -> PipelineSettings {
    PipelineSettings {
        pattern: MailboxPattern::new("*"),
        workers,
        buffer: 8,
        batch,
        index: "mail_index".into(),
        fetch: FetchOptions::default(),
    }
}
