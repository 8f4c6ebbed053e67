//! The single indexing consumer: queue → documents → bulk-ingest batches.

use serde::Serialize;
use tracing::{debug, error, info};

use super::queue::QueueReceiver;
use crate::progress::ProgressSink;
use crate::search::{to_document, Document, SearchBackend};

/// Counters kept by the indexer over a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Envelopes taken off the queue.
    pub received: u64,
    /// Envelopes turned into documents.
    pub converted: u64,
    /// Envelopes dropped because conversion failed.
    pub dropped: u64,
    /// Bulk-ingest calls issued.
    pub batches: u64,
    /// Bulk-ingest calls that failed; their documents are lost.
    pub failed_batches: u64,
    /// Documents the backend reported as ingested.
    pub accepted: u64,
    /// Documents in failed batches.
    pub lost: u64,
}

/// Drains the queue and flushes documents in batches of `batch_size`.
pub struct BatchIndexer<'a, B: SearchBackend + ?Sized> {
    backend: &'a B,
    index: String,
    batch_size: usize,
    progress: &'a dyn ProgressSink,
}

impl<'a, B: SearchBackend + ?Sized> BatchIndexer<'a, B> {
    pub fn new(
        backend: &'a B,
        index: impl Into<String>,
        batch_size: usize,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            backend,
            index: index.into(),
            batch_size: batch_size.max(1),
            progress,
        }
    }

    /// Consume `queue` until it is closed and empty.
    pub fn run(&self, queue: QueueReceiver) -> IndexStats {
        let mut stats = IndexStats::default();
        let mut batch: Vec<Document> = Vec::with_capacity(self.batch_size);
        debug!(index = %self.index, batch_size = self.batch_size, "Waiting for messages to index");

        for envelope in queue {
            stats.received += 1;
            // Fetched counts as done for progress, indexed or not.
            self.progress.complete(1);

            match to_document(&envelope) {
                Ok(document) => {
                    stats.converted += 1;
                    batch.push(document);
                }
                Err(e) => {
                    error!(error = %e, "Failed to convert message, dropping it");
                    stats.dropped += 1;
                    continue;
                }
            }

            if batch.len() < self.batch_size {
                debug!(
                    mailbox = %envelope.mailbox,
                    uid = envelope.uid,
                    batch = batch.len(),
                    "Enqueue"
                );
                continue;
            }

            let full = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
            self.flush(full, &mut stats);
        }

        if !batch.is_empty() {
            self.flush(batch, &mut stats);
        }
        info!(
            received = stats.received,
            accepted = stats.accepted,
            lost = stats.lost,
            "No more messages"
        );
        stats
    }

    /// One bulk-ingest call. The batch is gone afterwards whatever the outcome.
    fn flush(&self, batch: Vec<Document>, stats: &mut IndexStats) {
        stats.batches += 1;
        match self.backend.bulk_ingest(&self.index, &batch) {
            Ok(response) => {
                stats.accepted += response.accepted as u64;
                info!(count = response.accepted, batch = batch.len(), "Indexed");
            }
            Err(e) => {
                stats.failed_batches += 1;
                stats.lost += batch.len() as u64;
                error!(error = %e, batch = batch.len(), "Failed to index batch, discarding it");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use reqwest::StatusCode;

    use super::*;
    use crate::model::{MessageEnvelope, MessageMetadata};
    use crate::pipeline::queue;
    use crate::progress::NoopProgress;
    use crate::search::{BulkResponse, SearchError};

    /// Records batch sizes; fails the calls whose 1-based number is in `fail_on`.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<usize>>,
        fail_on: Vec<usize>,
    }

    impl SearchBackend for Recorder {
        fn bulk_ingest(&self, _index: &str, documents: &[Document]) -> Result<BulkResponse, SearchError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(documents.len());
            if self.fail_on.contains(&calls.len()) {
                return Err(SearchError::Status {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: "busy".into(),
                });
            }
            Ok(BulkResponse {
                accepted: documents.len(),
            })
        }
    }

    fn envelope(uid: u32, message_id: &str) -> MessageEnvelope {
        let metadata = MessageMetadata {
            message_id: message_id.into(),
            ..Default::default()
        };
        MessageEnvelope::new("INBOX", uid, uid, metadata, String::new())
    }

    fn feed(envelopes: Vec<MessageEnvelope>) -> QueueReceiver {
        let (tx, rx) = queue::bounded(envelopes.len());
        for e in envelopes {
            tx.send(e).unwrap();
        }
        rx
    }

    fn numbered(n: u32) -> Vec<MessageEnvelope> {
        (1..=n).map(|i| envelope(i, &format!("<{i}@example.com>"))).collect()
    }

    #[test]
    fn test_batches_split_at_size() {
        let backend = Recorder::default();
        let indexer = BatchIndexer::new(&backend, "mail", 4, &NoopProgress);
        let stats = indexer.run(feed(numbered(10)));

        assert_eq!(*backend.calls.lock().unwrap(), vec![4, 4, 2]);
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.accepted, 10);
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_call() {
        let backend = Recorder::default();
        let indexer = BatchIndexer::new(&backend, "mail", 5, &NoopProgress);
        indexer.run(feed(numbered(10)));
        assert_eq!(*backend.calls.lock().unwrap(), vec![5, 5]);
    }

    #[test]
    fn test_empty_queue_issues_no_call() {
        let backend = Recorder::default();
        let indexer = BatchIndexer::new(&backend, "mail", 5, &NoopProgress);
        let stats = indexer.run(feed(Vec::new()));
        assert!(backend.calls.lock().unwrap().is_empty());
        assert_eq!(stats, IndexStats::default());
    }

    #[test]
    fn test_failed_batch_is_discarded() {
        let backend = Recorder {
            fail_on: vec![2],
            ..Default::default()
        };
        let indexer = BatchIndexer::new(&backend, "mail", 3, &NoopProgress);
        let stats = indexer.run(feed(numbered(8)));

        // Sizes stay 3/3/2: the failed batch is not carried into the next one.
        assert_eq!(*backend.calls.lock().unwrap(), vec![3, 3, 2]);
        assert_eq!(stats.failed_batches, 1);
        assert_eq!(stats.lost, 3);
        assert_eq!(stats.accepted, 5);
    }

    #[test]
    fn test_conversion_failure_drops_one_envelope() {
        let backend = Recorder::default();
        let indexer = BatchIndexer::new(&backend, "mail", 2, &NoopProgress);
        let mut envelopes = numbered(3);
        envelopes.insert(1, envelope(0, ""));
        let stats = indexer.run(feed(envelopes));

        assert_eq!(stats.received, 4);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.converted, 3);
        assert_eq!(*backend.calls.lock().unwrap(), vec![2, 1]);
    }
}
