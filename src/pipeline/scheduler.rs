//! Wave-bounded scheduling of fetch workers.
//!
//! Mailboxes are processed in waves of at most `workers` threads. A wave
//! is joined completely before the next one starts, so the number of open
//! server connections never exceeds the configured concurrency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::{debug, error, info, warn};

use super::queue::QueueSender;
use super::worker::{FetchOptions, FetchWorker, WorkerOutcome, WorkerReport};
use crate::mail::MailConnector;
use crate::model::Mailbox;
use crate::progress::ProgressSink;

/// Sizes of the successive waves for `mailboxes` mailboxes and `workers` threads.
///
/// Every wave is full except possibly the last, which shrinks to what remains.
pub fn plan_waves(mailboxes: usize, workers: usize) -> Vec<usize> {
    let workers = workers.max(1);
    let mut waves = Vec::with_capacity(mailboxes.div_ceil(workers));
    let mut remaining = mailboxes;
    while remaining > 0 {
        let size = workers.min(remaining);
        waves.push(size);
        remaining -= size;
    }
    waves
}

/// Result of scheduling every wave.
#[derive(Debug, Clone, Default)]
pub struct ScheduleReport {
    /// Waves actually launched.
    pub waves: usize,
    /// One report per launched worker, in launch order.
    pub workers: Vec<WorkerReport>,
    /// Mailboxes never launched because cancellation was requested.
    pub not_started: Vec<String>,
}

/// Launches fetch workers wave by wave.
pub struct Scheduler<'a, C: MailConnector> {
    connector: &'a C,
    workers: usize,
    options: FetchOptions,
    progress: &'a dyn ProgressSink,
    cancel: Option<&'a AtomicBool>,
}

impl<'a, C: MailConnector> Scheduler<'a, C> {
    pub fn new(
        connector: &'a C,
        workers: usize,
        options: FetchOptions,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            connector,
            workers: workers.max(1),
            options,
            progress,
            cancel: None,
        }
    }

    /// Stop launching waves once `flag` is set. A running wave always finishes.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Fetch every mailbox, then close the queue.
    ///
    /// `queue` is consumed: every worker gets a clone that lives only as long
    /// as its wave, and the original is dropped after the last wave has been
    /// joined. The receiver therefore sees the end of the queue exactly once,
    /// after the final send of the final worker.
    pub fn run(&self, mailboxes: Vec<Mailbox>, queue: QueueSender) -> ScheduleReport {
        let mut report = ScheduleReport::default();
        let worker = FetchWorker::new(self.connector, self.options, self.progress);
        let mut remaining = mailboxes.as_slice();

        if self.workers > remaining.len() && !remaining.is_empty() {
            info!(
                configured = self.workers,
                workers = remaining.len(),
                "Reducing workers to match mailboxes"
            );
        }

        for size in plan_waves(remaining.len(), self.workers) {
            if self.cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                warn!(remaining = remaining.len(), "Cancellation requested, not starting further waves");
                report.not_started = remaining.iter().map(|m| m.name.clone()).collect();
                break;
            }

            let (wave, rest) = remaining.split_at(size);
            report.waves += 1;
            debug!(wave = report.waves, size, "Starting wave");
            report.workers.extend(self.run_wave(&worker, wave, &queue));
            remaining = rest;
        }

        debug!(waves = report.waves, "All waves done, closing queue");
        drop(queue);
        report
    }

    /// Run one worker thread per mailbox and join them all.
    fn run_wave(
        &self,
        worker: &FetchWorker<'_, C>,
        wave: &[Mailbox],
        queue: &QueueSender,
    ) -> Vec<WorkerReport> {
        thread::scope(|scope| {
            let handles: Vec<_> = wave
                .iter()
                .map(|mailbox| {
                    let sender = queue.clone();
                    debug!(mailbox = %mailbox.name, "Starting worker");
                    let handle = thread::Builder::new()
                        .name(format!("fetch-{}", mailbox.name))
                        .spawn_scoped(scope, move || worker.run(mailbox, &sender));
                    (mailbox, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(mailbox, handle)| {
                    let failed = |reason: String| {
                        error!(mailbox = %mailbox.name, error = %reason, "Worker failed");
                        self.progress.mailbox_finished(&mailbox.name);
                        WorkerReport {
                            mailbox: mailbox.name.clone(),
                            expected: mailbox.message_count,
                            emitted: 0,
                            body_failures: 0,
                            skipped: 0,
                            body_bytes: 0,
                            outcome: WorkerOutcome::Abandoned(reason),
                        }
                    };
                    match handle {
                        Ok(h) => h
                            .join()
                            .unwrap_or_else(|_| failed("worker thread panicked".to_string())),
                        Err(e) => {
                            self.progress.withdraw_work(u64::from(mailbox.message_count));
                            failed(format!("cannot spawn worker thread: {e}"))
                        }
                    }
                })
                .collect()
        })
    }
}
