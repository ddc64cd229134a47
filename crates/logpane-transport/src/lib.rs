//! Record transports for logpane
//!
//! This crate is the producer side of the pipeline: a [`Transport`] hands
//! records for a topic to a [`RecordSink`] until the [`Subscription`] is
//! dropped.

mod bus;
mod error;
mod lines;
mod parser;
mod subscription;

pub use bus::Bus;
pub use error::TransportError;
pub use lines::LineTransport;
pub use parser::{ParsedLine, RecordParser};
pub use subscription::{RecordSink, Subscription, Transport, validate_topic};

// Re-export types used in our public API
pub use logpane_types::{RecordBody, Severity};
