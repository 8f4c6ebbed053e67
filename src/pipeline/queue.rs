//! Bounded queue between the fetch workers and the indexer.
//!
//! Any number of [`QueueSender`] clones feed a single [`QueueReceiver`].
//! The queue closes when the last sender is dropped; the receiver then
//! drains what is left and reports the end. A full queue blocks senders,
//! which is the pipeline's only backpressure.

use std::sync::mpsc::{self, Receiver, SyncSender};

use crate::model::MessageEnvelope;

/// The receiving side is gone; nothing sent now would ever be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("message queue receiver has been dropped")]
pub struct QueueClosed;

/// Create a queue holding at most `capacity` envelopes in flight.
///
/// A capacity of zero makes every send a rendezvous with the receiver.
pub fn bounded(capacity: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (QueueSender { tx }, QueueReceiver { rx })
}

/// Producer handle. Clone one per worker.
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: SyncSender<MessageEnvelope>,
}

impl QueueSender {
    /// Enqueue `envelope`, blocking while the queue is full.
    pub fn send(&self, envelope: MessageEnvelope) -> Result<(), QueueClosed> {
        self.tx.send(envelope).map_err(|_| QueueClosed)
    }
}

/// Consumer handle. There is exactly one.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: Receiver<MessageEnvelope>,
}

impl QueueReceiver {
    /// Block until an envelope arrives; `None` once the queue is closed and empty.
    pub fn recv(&self) -> Option<MessageEnvelope> {
        self.rx.recv().ok()
    }
}

impl Iterator for QueueReceiver {
    type Item = MessageEnvelope;

    fn next(&mut self) -> Option<MessageEnvelope> {
        self.recv()
    }
}
