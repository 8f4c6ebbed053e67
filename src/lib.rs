//! `imapindexer`: index every message of an IMAP account into ZincSearch.
//!
//! This crate provides the fetch-and-index pipeline: mailbox discovery,
//! wave-bounded fetch workers, a bounded message queue, and a batching
//! indexer feeding a bulk-ingest search backend.

pub mod config;
pub mod error;
pub mod mail;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod search;
