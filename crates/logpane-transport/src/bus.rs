use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use logpane_types::RecordBody;

use crate::{RecordSink, Subscription, Transport, TransportError, validate_topic};

struct Subscriber {
    sink: Arc<dyn RecordSink>,
    cancel: CancellationToken,
}

/// In-process topic bus. Publishing delivers synchronously, on the caller's
/// thread, to every live subscriber of the topic.
#[derive(Clone, Default)]
pub struct Bus {
    topics: Arc<RwLock<HashMap<String, Vec<Subscriber>>>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a record on `topic`. Returns how many subscribers accepted it.
    pub fn publish(&self, topic: &str, body: impl Into<RecordBody>) -> usize {
        let body = body.into();

        let sinks: Vec<(Arc<dyn RecordSink>, CancellationToken)> = {
            let topics = self.topics.read();
            match topics.get(topic) {
                Some(subs) => subs
                    .iter()
                    .filter(|s| !s.cancel.is_cancelled())
                    .map(|s| (Arc::clone(&s.sink), s.cancel.clone()))
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        let mut stale = false;
        for (sink, cancel) in sinks {
            if sink.deliver(body.clone()) {
                delivered += 1;
            } else {
                // Sink closed, treat as unsubscribed
                cancel.cancel();
                stale = true;
            }
        }

        if stale || self.has_cancelled(topic) {
            self.prune(topic);
        }

        delivered
    }

    /// Number of live subscribers on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map(|subs| subs.iter().filter(|s| !s.cancel.is_cancelled()).count())
            .unwrap_or(0)
    }

    fn has_cancelled(&self, topic: &str) -> bool {
        self.topics
            .read()
            .get(topic)
            .is_some_and(|subs| subs.iter().any(|s| s.cancel.is_cancelled()))
    }

    fn prune(&self, topic: &str) {
        let mut topics = self.topics.write();
        if let Some(subs) = topics.get_mut(topic) {
            subs.retain(|s| !s.cancel.is_cancelled());
            if subs.is_empty() {
                topics.remove(topic);
            }
        }
    }
}

impl Transport for Bus {
    fn subscribe(
        &self,
        topic: &str,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Subscription, TransportError> {
        validate_topic(topic)?;

        let cancel = CancellationToken::new();
        self.topics
            .write()
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber {
                sink,
                cancel: cancel.clone(),
            });

        tracing::debug!(topic, "bus subscription added");
        Ok(Subscription::new(topic, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpane_types::Severity;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<RecordBody>>,
        closed: Mutex<bool>,
    }

    impl RecordSink for Collect {
        fn deliver(&self, body: RecordBody) -> bool {
            if *self.closed.lock() {
                return false;
            }
            self.seen.lock().push(body);
            true
        }
    }

    #[test]
    fn test_publish_routes_by_topic() {
        let bus = Bus::new();
        let sink = Arc::new(Collect::default());
        let _sub = bus.subscribe("/log", sink.clone()).unwrap();

        assert_eq!(bus.publish("/log", RecordBody::message(Severity::Info, "a")), 1);
        assert_eq!(bus.publish("/other", RecordBody::message(Severity::Info, "b")), 0);
        assert_eq!(sink.seen.lock().len(), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = Bus::new();
        let sink = Arc::new(Collect::default());
        let sub = bus.subscribe("/log", sink.clone()).unwrap();
        assert_eq!(bus.subscriber_count("/log"), 1);

        sub.unsubscribe();
        assert_eq!(bus.subscriber_count("/log"), 0);
        assert_eq!(bus.publish("/log", RecordBody::message(Severity::Info, "a")), 0);
        assert!(sink.seen.lock().is_empty());
    }

    #[test]
    fn test_closed_sink_is_pruned() {
        let bus = Bus::new();
        let sink = Arc::new(Collect::default());
        let _sub = bus.subscribe("/log", sink.clone()).unwrap();

        *sink.closed.lock() = true;
        assert_eq!(bus.publish("/log", RecordBody::message(Severity::Info, "a")), 0);
        assert_eq!(bus.subscriber_count("/log"), 0);
    }

    #[test]
    fn test_invalid_topic_rejected() {
        let bus = Bus::new();
        let sink = Arc::new(Collect::default());
        assert!(matches!(
            bus.subscribe("", sink),
            Err(TransportError::InvalidTopic(_))
        ));
    }
}
