//! Log core for logpane
//!
//! This crate provides the bounded record store, the include/exclude filter,
//! the filtered view, and the ingestion loop that ties them to a transport.

pub mod config;
mod error;
mod filter;
mod inbox;
mod index;
mod ingest;
mod reader;
mod runner;
mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use filter::{FilterEngine, FilterHandle, FilterStatus};
pub use inbox::{Inbox, InboxSender};
pub use index::FilteredIndex;
pub use ingest::{IngestionLoop, LoopState, TickReport, ViewVersion};
pub use reader::{LogReader, format_line};
pub use runner::{Control, IngestionHandle, spawn};
pub use store::{RecordStore, SeverityCounts};

// Re-export types used in our public API
pub use logpane_types::{ArcRecord, Fields, Record, RecordBody, Severity};
