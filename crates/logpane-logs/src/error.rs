use std::path::PathBuf;

use thiserror::Error;

use logpane_transport::TransportError;

/// Errors surfaced by the log core. Bad filter patterns are not errors; they
/// are reported through validity flags on the filter.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid capacity {0}: must be at least 1")]
    InvalidCapacity(usize),

    #[error("record {0} not found")]
    RecordNotFound(u64),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ingestion loop has shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, Error>;
