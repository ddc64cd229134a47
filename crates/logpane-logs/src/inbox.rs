use std::sync::Arc;

use parking_lot::Mutex;

use logpane_transport::RecordSink;
use logpane_types::RecordBody;

#[derive(Default)]
struct InboxState {
    /// Records delivered since the last drain, in arrival order
    queue: Vec<RecordBody>,

    /// Whether deliveries are accepted
    open: bool,

    /// Bumped on every open and close; senders from an older epoch are
    /// rejected
    epoch: u64,
}

/// Hand-off point between a producer and the ingestion loop.
///
/// Producers push through an [`InboxSender`]; the loop takes everything
/// queued so far with [`Inbox::drain`].
#[derive(Clone, Default)]
pub struct Inbox {
    inner: Arc<Mutex<InboxState>>,
}

impl Inbox {
    /// Create a closed inbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accepting records. Returns a sender for the new epoch.
    pub fn open(&self) -> InboxSender {
        let mut state = self.inner.lock();
        state.epoch += 1;
        state.open = true;
        state.queue.clear();
        InboxSender {
            inner: Arc::clone(&self.inner),
            epoch: state.epoch,
        }
    }

    /// Stop accepting records and drop everything still queued. Returns the
    /// number of records dropped.
    pub fn close(&self) -> usize {
        let mut state = self.inner.lock();
        state.epoch += 1;
        state.open = false;
        let dropped = state.queue.len();
        state.queue = Vec::new();
        dropped
    }

    /// A sender for the current epoch, or `None` while closed
    pub fn sender(&self) -> Option<InboxSender> {
        let state = self.inner.lock();
        state.open.then(|| InboxSender {
            inner: Arc::clone(&self.inner),
            epoch: state.epoch,
        })
    }

    /// Take every queued record, oldest first
    pub fn drain(&self) -> Vec<RecordBody> {
        std::mem::take(&mut self.inner.lock().queue)
    }

    /// Number of queued records
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }
}

/// Producer end of an [`Inbox`], valid for one open epoch
#[derive(Clone)]
pub struct InboxSender {
    inner: Arc<Mutex<InboxState>>,
    epoch: u64,
}

impl InboxSender {
    /// Queue a record. Returns `false` if the inbox was closed or reopened
    /// since this sender was issued.
    pub fn push(&self, body: impl Into<RecordBody>) -> bool {
        let mut state = self.inner.lock();
        if !state.open || state.epoch != self.epoch {
            return false;
        }
        state.queue.push(body.into());
        true
    }
}

impl RecordSink for InboxSender {
    fn deliver(&self, body: RecordBody) -> bool {
        self.push(body)
    }
}
