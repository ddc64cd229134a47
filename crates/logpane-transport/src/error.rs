use thiserror::Error;

/// Errors raised while subscribing to a transport
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid topic name '{0}'")]
    InvalidTopic(String),

    #[error("transport is closed")]
    Closed,
}
