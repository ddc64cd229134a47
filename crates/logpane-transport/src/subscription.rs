use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use logpane_types::RecordBody;

use crate::TransportError;

/// Consumer side of a subscription
pub trait RecordSink: Send + Sync {
    /// Hand one record to the consumer. Returns `false` once the sink no
    /// longer accepts records; producers should stop delivering then.
    fn deliver(&self, body: RecordBody) -> bool;
}

/// A source of records, keyed by topic
pub trait Transport: Send + Sync {
    /// Start delivering records published on `topic` to `sink`
    fn subscribe(
        &self,
        topic: &str,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Subscription, TransportError>;
}

/// Topics are non-empty and contain no whitespace
pub fn validate_topic(topic: &str) -> Result<(), TransportError> {
    if topic.is_empty() || topic.chars().any(char::is_whitespace) {
        return Err(TransportError::InvalidTopic(topic.to_string()));
    }
    Ok(())
}

/// A live subscription. Delivery stops on [`Subscription::unsubscribe`] or
/// when the value is dropped.
#[derive(Debug)]
pub struct Subscription {
    topic: String,

    /// Cancelled when the subscription ends
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            topic: topic.into(),
            cancel,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Check if the subscription is still delivering
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop delivery
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
