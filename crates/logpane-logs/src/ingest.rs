use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::watch;

use logpane_transport::{Subscription, Transport, validate_topic};

use crate::config::Config;
use crate::error::Result;
use crate::filter::{FilterEngine, FilterHandle};
use crate::inbox::{Inbox, InboxSender};
use crate::reader::{LogReader, SharedView, View};

/// Ingestion loop states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// Not subscribed; nothing is queued or ingested
    Disabled,
    /// Subscribed, no pending work
    Idle,
    /// Moving queued records into the store
    Draining,
    /// A filter edit is waiting out the debounce window
    FilterDirty,
}

/// What one tick did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records moved from the inbox into the store
    pub ingested: usize,
    /// New records appended to the filtered view
    pub appended: usize,
    /// Records evicted from the store
    pub evicted: usize,
    /// Whether the filtered view was rebuilt
    pub rebuilt: bool,
}

impl TickReport {
    /// Check if the tick changed anything a display would show
    pub fn changed(&self) -> bool {
        self.ingested > 0 || self.evicted > 0 || self.rebuilt
    }
}

/// Published after every mutation of the view
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewVersion {
    /// Number of view mutations so far
    pub changes: u64,
    /// Number of full rebuilds so far
    pub rebuilds: u64,
}

/// Single consumer that moves records from the transport into the store and
/// keeps the filtered view current.
///
/// All mutation of the store and the filtered view happens here. Filter edits
/// arrive through the shared [`FilterHandle`] and are applied as one rebuild
/// once they have settled for the debounce window.
pub struct IngestionLoop {
    transport: Arc<dyn Transport>,

    /// Topic we're listening on (or will listen on once enabled)
    topic: String,

    /// Active subscription; present exactly while enabled
    subscription: Option<Subscription>,

    inbox: Inbox,

    /// Filter as edited from outside
    filter: FilterHandle,

    /// Filter the current view was computed with
    active: FilterEngine,

    view: SharedView,

    state: LoopState,

    /// Quiet time required after the last filter edit
    debounce: Duration,

    /// Filter revision the debounce timer is running for
    pending_revision: Option<u64>,

    /// Time accumulated since `pending_revision` was first seen
    debounce_elapsed: Duration,

    changes: watch::Sender<ViewVersion>,
}

impl IngestionLoop {
    /// Create a loop from a validated config. Subscribes right away when
    /// `config.enabled` is set.
    pub fn new(transport: Arc<dyn Transport>, config: &Config) -> Result<Self> {
        config.validate()?;

        let active = FilterEngine::with_patterns(&config.include, &config.exclude, config.use_regex);
        let (changes, _) = watch::channel(ViewVersion::default());

        let mut ingestion = Self {
            transport,
            topic: config.topic.clone(),
            subscription: None,
            inbox: Inbox::new(),
            filter: FilterHandle::new(active.clone()),
            active,
            view: Arc::new(RwLock::new(View::new(config.capacity()?))),
            state: LoopState::Disabled,
            debounce: config.debounce(),
            pending_revision: None,
            debounce_elapsed: Duration::ZERO,
            changes,
        };

        if config.enabled {
            ingestion.enable()?;
        }
        Ok(ingestion)
    }

    /// Subscribe and start accepting records. No-op if already enabled.
    pub fn enable(&mut self) -> Result<()> {
        if self.subscription.is_some() {
            return Ok(());
        }

        let sender = self.inbox.open();
        match self.transport.subscribe(&self.topic, Arc::new(sender)) {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.state = self.settled_state();
                tracing::info!(topic = %self.topic, "ingestion enabled");
                Ok(())
            }
            Err(e) => {
                self.inbox.close();
                tracing::warn!(topic = %self.topic, error = %e, "subscription failed");
                Err(e.into())
            }
        }
    }

    /// Unsubscribe and drop anything queued but not yet processed. Safe to
    /// call in any state. Returns the number of records dropped.
    pub fn disable(&mut self) -> usize {
        let dropped = self.inbox.close();
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            tracing::info!(topic = %self.topic, dropped, "ingestion disabled");
        }
        self.state = LoopState::Disabled;
        dropped
    }

    /// Flip between enabled and disabled. Returns whether the loop is now
    /// enabled.
    pub fn toggle_pause(&mut self) -> Result<bool> {
        if self.is_enabled() {
            self.disable();
            Ok(false)
        } else {
            self.enable()?;
            Ok(true)
        }
    }

    /// Listen on a different topic, resubscribing if enabled
    pub fn set_topic(&mut self, topic: &str) -> Result<()> {
        validate_topic(topic)?;
        if topic == self.topic {
            return Ok(());
        }

        tracing::info!(from = %self.topic, to = topic, "switching topic");
        self.topic = topic.to_string();

        if let Some(previous) = self.subscription.take() {
            previous.unsubscribe();
            let Some(sender) = self.inbox.sender() else {
                self.state = LoopState::Disabled;
                return Ok(());
            };
            match self.transport.subscribe(&self.topic, Arc::new(sender)) {
                Ok(subscription) => self.subscription = Some(subscription),
                Err(e) => {
                    self.disable();
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Change the store capacity, evicting the oldest records that no longer
    /// fit
    pub fn set_capacity(&mut self, capacity: NonZeroUsize) -> usize {
        let evicted = {
            let mut view = self.view.write();
            let View { store, index } = &mut *view;
            let evicted = store.set_capacity(capacity);
            for id in &evicted {
                index.remove_if_present(*id);
            }
            evicted.len()
        };

        tracing::debug!(capacity = capacity.get(), evicted, "capacity changed");
        if evicted > 0 {
            self.publish(false);
        }
        evicted
    }

    /// Empty the store and the filtered view together. Ids keep counting.
    pub fn clear(&mut self) -> usize {
        let cleared = {
            let mut view = self.view.write();
            let View { store, index } = &mut *view;
            let cleared = store.clear().len();
            index.rebuild(store, &self.active);
            cleared
        };

        tracing::debug!(cleared, "view cleared");
        self.publish(false);
        cleared
    }

    /// Run one ingestion cycle. `elapsed` is the time since the previous
    /// tick and drives the filter debounce.
    ///
    /// While disabled the inbox is closed and nothing is ingested, but filter
    /// edits still settle and rebuild the view.
    pub fn tick(&mut self, elapsed: Duration) -> TickReport {
        let mut report = TickReport::default();

        let incoming = self.inbox.drain();
        if !incoming.is_empty() {
            self.state = LoopState::Draining;
            // With an edit pending, new records wait for the rebuild
            let evaluate = !self.filter.is_dirty();

            let mut view = self.view.write();
            let View { store, index } = &mut *view;
            for body in incoming {
                let passes = evaluate && self.active.passes_fields(&body.fields);
                let (id, evicted) = store.insert(body);
                report.ingested += 1;

                if let Some(old) = evicted {
                    index.remove_if_present(old);
                    report.evicted += 1;
                }
                if passes {
                    index.append(id);
                    report.appended += 1;
                }
            }
        }

        report.rebuilt = self.settle_filter(elapsed);
        self.state = self.settled_state();

        if report.changed() {
            tracing::trace!(?report, "tick");
            self.publish(report.rebuilt);
        }
        report
    }

    /// Advance the debounce timer and rebuild once edits have settled
    fn settle_filter(&mut self, elapsed: Duration) -> bool {
        let Some(revision) = self.filter.dirty_revision() else {
            self.pending_revision = None;
            return false;
        };

        if self.pending_revision != Some(revision) {
            // New edit: restart the window
            self.pending_revision = Some(revision);
            self.debounce_elapsed = Duration::ZERO;
        } else {
            self.debounce_elapsed += elapsed;
        }

        if self.debounce_elapsed < self.debounce {
            return false;
        }

        let Some(filter) = self.filter.take_if_current(revision) else {
            return false;
        };
        self.pending_revision = None;
        self.debounce_elapsed = Duration::ZERO;
        self.active = filter;
        self.rebuild();
        true
    }

    /// Recompute the filtered view from every stored record
    fn rebuild(&self) {
        let started = Instant::now();
        let mut view = self.view.write();
        let View { store, index } = &mut *view;
        let kept = index.rebuild(store, &self.active);

        tracing::debug!(
            records = store.len(),
            kept,
            include = self.active.include_pattern(),
            exclude = self.active.exclude_pattern(),
            regex = self.active.use_regex(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "filtered view rebuilt"
        );
    }

    fn settled_state(&self) -> LoopState {
        if self.subscription.is_none() {
            LoopState::Disabled
        } else if self.filter.is_dirty() {
            LoopState::FilterDirty
        } else {
            LoopState::Idle
        }
    }

    fn publish(&self, rebuilt: bool) {
        self.changes.send_modify(|version| {
            version.changes += 1;
            if rebuilt {
                version.rebuilds += 1;
            }
        });
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Handle for editing the filter from other threads
    pub fn filter(&self) -> FilterHandle {
        self.filter.clone()
    }

    /// Filter the current view was computed with
    pub fn active_filter(&self) -> &FilterEngine {
        &self.active
    }

    /// Read access for display code
    pub fn reader(&self) -> LogReader {
        LogReader::new(Arc::clone(&self.view))
    }

    /// Notified after every tick that changed the view
    pub fn subscribe_changes(&self) -> watch::Receiver<ViewVersion> {
        self.changes.subscribe()
    }

    /// Current view version
    pub fn version(&self) -> ViewVersion {
        *self.changes.borrow()
    }

    /// Direct producer access to the inbox, bypassing the transport.
    /// `None` while disabled.
    pub fn sender(&self) -> Option<InboxSender> {
        self.inbox.sender()
    }

    pub(crate) fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }
}
