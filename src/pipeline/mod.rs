//! The fetch-and-index pipeline.
//!
//! ```text
//! discovery ─▶ Scheduler ─▶ FetchWorker × W ─▶ bounded queue ─▶ BatchIndexer ─▶ backend
//! ```
//!
//! Discovery runs on the calling thread over the first connection of the
//! run; its failure is the only fatal error. The indexer runs on its own
//! thread for the whole run while the scheduler launches worker waves.

pub mod consumer;
pub mod queue;
pub mod scheduler;
pub mod worker;

use std::sync::atomic::AtomicBool;
use std::thread;

use serde::Serialize;
use tracing::{debug, info, warn};

pub use consumer::{BatchIndexer, IndexStats};
pub use scheduler::{plan_waves, ScheduleReport, Scheduler};
pub use worker::{FetchOptions, FetchWorker, WorkerOutcome, WorkerReport};

use crate::error::{IndexerError, Result};
use crate::mail::{MailConnector, MailSession};
use crate::model::{Mailbox, MailboxPattern};
use crate::progress::ProgressSink;
use crate::search::SearchBackend;

/// Everything a run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub pattern: MailboxPattern,
    pub workers: usize,
    pub buffer: usize,
    pub batch: usize,
    pub index: String,
    pub fetch: FetchOptions,
}

impl PipelineSettings {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            pattern: MailboxPattern::new(config.imap.mailbox.clone()),
            workers: config.indexer.workers,
            buffer: config.indexer.buffer,
            batch: config.indexer.batch,
            index: config.zinc.index.clone(),
            fetch: FetchOptions {
                use_hash: config.imap.use_hash,
            },
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mailboxes: Vec<Mailbox>,
    pub waves: usize,
    pub workers: Vec<WorkerReport>,
    pub not_started: Vec<String>,
    pub index: IndexStats,
}

impl RunReport {
    /// Total envelopes pushed onto the queue by all workers.
    pub fn emitted(&self) -> u64 {
        self.workers.iter().map(|w| u64::from(w.emitted)).sum()
    }

    pub fn body_bytes(&self) -> u64 {
        self.workers.iter().map(|w| w.body_bytes).sum()
    }

    pub fn abandoned(&self) -> impl Iterator<Item = &WorkerReport> {
        self.workers.iter().filter(|w| w.is_abandoned())
    }
}

/// Wires discovery, scheduler, queue and indexer together.
pub struct Pipeline<'a, C: MailConnector, B: SearchBackend + ?Sized> {
    connector: &'a C,
    backend: &'a B,
    progress: &'a dyn ProgressSink,
    settings: PipelineSettings,
    cancel: Option<&'a AtomicBool>,
}

impl<'a, C: MailConnector, B: SearchBackend + ?Sized> Pipeline<'a, C, B> {
    pub fn new(
        connector: &'a C,
        backend: &'a B,
        progress: &'a dyn ProgressSink,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            connector,
            backend,
            progress,
            settings,
            cancel: None,
        }
    }

    /// Stop launching new waves once `flag` is set.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// List the mailboxes to index over a fresh connection.
    ///
    /// This is the first connection of a run, so every failure here is fatal.
    pub fn discover(&self) -> Result<Vec<Mailbox>> {
        let mut session = self.connector.connect()?;
        let mailboxes = session
            .list_mailboxes(&self.settings.pattern)
            .map_err(|e| match e {
                IndexerError::Discovery(_) => e,
                other => IndexerError::Discovery(other.to_string()),
            })?;
        if let Err(e) = session.logout() {
            debug!(error = %e, "Logout after discovery failed");
        }
        Ok(mailboxes)
    }

    /// Run discovery, then fetch and index everything.
    pub fn run(&self) -> Result<RunReport> {
        let mailboxes = self.discover()?;
        info!(
            mailboxes = mailboxes.len(),
            pattern = %self.settings.pattern,
            "Mailboxes found"
        );

        self.progress.mailboxes_discovered(mailboxes.len() as u64);
        for mailbox in &mailboxes {
            self.progress.add_work(u64::from(mailbox.message_count));
        }

        let (schedule, index) = self.fetch_and_index(mailboxes.clone());
        self.progress.finish();

        let report = RunReport {
            mailboxes,
            waves: schedule.waves,
            workers: schedule.workers,
            not_started: schedule.not_started,
            index,
        };
        for worker in report.abandoned() {
            warn!(mailbox = %worker.mailbox, "Mailbox only partially indexed");
        }
        Ok(report)
    }

    /// Start the indexer thread, drive the scheduler on this thread, and
    /// wait for the indexer to drain the queue.
    fn fetch_and_index(&self, mailboxes: Vec<Mailbox>) -> (ScheduleReport, IndexStats) {
        let (sender, receiver) = queue::bounded(self.settings.buffer);
        let indexer = BatchIndexer::new(
            self.backend,
            self.settings.index.clone(),
            self.settings.batch,
            self.progress,
        );
        let mut scheduler = Scheduler::new(
            self.connector,
            self.settings.workers,
            self.settings.fetch,
            self.progress,
        );
        if let Some(flag) = self.cancel {
            scheduler = scheduler.with_cancel(flag);
        }

        thread::scope(|scope| {
            let consumer = scope.spawn(|| indexer.run(receiver));
            let schedule = scheduler.run(mailboxes, sender);
            let index = consumer.join().unwrap_or_else(|_| {
                tracing::error!("Indexer thread panicked");
                IndexStats::default()
            });
            (schedule, index)
        })
    }
}
