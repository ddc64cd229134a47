use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;

use crate::{Bus, RecordParser, RecordSink, Subscription, Transport, TransportError};

/// Reads newline-delimited records from a byte stream and publishes them.
///
/// Lines carrying their own topic are published there; everything else goes
/// to the default topic. Records read while nobody is subscribed are dropped.
pub struct LineTransport {
    bus: Bus,

    default_topic: String,

    /// Cancellation token for stopping the reader
    cancel: CancellationToken,

    /// Reader task handle
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,

    /// Lines read so far
    lines_read: Arc<AtomicU64>,
}

impl LineTransport {
    /// Create a transport that publishes untagged lines on `default_topic`
    pub fn new(default_topic: impl Into<String>) -> Self {
        Self {
            bus: Bus::new(),
            default_topic: default_topic.into(),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            lines_read: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start reading from `reader` on a tokio task. Subscribe first: lines
    /// read before any subscription exists are not replayed.
    pub fn start<R>(&self, reader: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            tracing::warn!("line transport already stopped, input ignored");
            return;
        }

        let bus = self.bus.clone();
        let default_topic = self.default_topic.clone();
        let cancel = self.cancel.clone();
        let lines_read = Arc::clone(&self.lines_read);

        let task = tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();

            loop {
                buf.clear();
                tokio::select! {
                    _ = cancel.cancelled() => break,

                    result = reader.read_until(b'\n', &mut buf) => {
                        match result {
                            Ok(0) => {
                                tracing::debug!("line input reached end of stream");
                                break;
                            }
                            Ok(_) => {
                                // Invalid UTF-8 is replaced, not fatal
                                let line = String::from_utf8_lossy(&buf);
                                let line = line.trim_end_matches(['\n', '\r']);
                                if line.trim().is_empty() {
                                    continue;
                                }
                                lines_read.fetch_add(1, Ordering::Relaxed);

                                let parsed = RecordParser::parse(line);
                                let topic = parsed.topic.as_deref().unwrap_or(&default_topic);
                                bus.publish(topic, parsed.body);
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to read line input");
                                break;
                            }
                        }
                    }
                }
            }
        });

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Check if the reader has stopped (end of input or error)
    pub fn is_finished(&self) -> bool {
        self.task.lock().as_ref().is_none_or(|t| t.is_finished())
    }

    /// Number of non-blank lines read so far
    pub fn lines_read(&self) -> u64 {
        self.lines_read.load(Ordering::Relaxed)
    }

    pub fn default_topic(&self) -> &str {
        &self.default_topic
    }

    /// Stop reading. The transport is closed afterwards and rejects new
    /// subscriptions.
    pub fn stop(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Transport for LineTransport {
    fn subscribe(
        &self,
        topic: &str,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Subscription, TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.bus.subscribe(topic, sink)
    }
}

impl Drop for LineTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpane_types::{RecordBody, field};
    use std::time::Duration;

    #[derive(Default)]
    struct Collect(Mutex<Vec<RecordBody>>);

    impl RecordSink for Collect {
        fn deliver(&self, body: RecordBody) -> bool {
            self.0.lock().push(body);
            true
        }
    }

    async fn wait_finished(transport: &LineTransport) {
        for _ in 0..200 {
            if transport.is_finished() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("line reader did not finish");
    }

    #[tokio::test]
    async fn test_reads_and_routes_lines() {
        let input = concat!(
            "[INFO] plain line\n",
            "\n",
            "{\"msg\":\"tagged\",\"topic\":\"/diag\"}\n",
            "{\"msg\":\"untagged\",\"level\":\"error\"}\n",
        );

        let transport = LineTransport::new("/log");
        let log_sink = Arc::new(Collect::default());
        let diag_sink = Arc::new(Collect::default());
        let _log = transport.subscribe("/log", log_sink.clone()).unwrap();
        let _diag = transport.subscribe("/diag", diag_sink.clone()).unwrap();

        transport.start(input.as_bytes());
        wait_finished(&transport).await;

        assert_eq!(transport.lines_read(), 3);

        let log = log_sink.0.lock();
        let messages: Vec<_> = log
            .iter()
            .map(|b| b.fields.get(field::MESSAGE).unwrap_or(""))
            .collect();
        assert_eq!(messages, vec!["[INFO] plain line", "untagged"]);
        assert_eq!(diag_sink.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_stop_reader() {
        let input: &'static [u8] = b"first\nbad \xff byte\nthird\r\nfourth";

        let transport = LineTransport::new("/log");
        let sink = Arc::new(Collect::default());
        let _sub = transport.subscribe("/log", sink.clone()).unwrap();

        transport.start(input);
        wait_finished(&transport).await;

        assert_eq!(transport.lines_read(), 4);
        let received = sink.0.lock();
        let messages: Vec<_> = received
            .iter()
            .map(|b| b.fields.get(field::MESSAGE).unwrap_or(""))
            .collect();
        assert_eq!(messages, vec!["first", "bad \u{FFFD} byte", "third", "fourth"]);
    }

    #[tokio::test]
    async fn test_subscribe_after_stop_fails() {
        let transport = LineTransport::new("/log");
        transport.stop();
        assert!(transport.is_finished());

        let sink = Arc::new(Collect::default());
        assert_eq!(
            transport.subscribe("/log", sink).unwrap_err(),
            TransportError::Closed
        );
    }
}
