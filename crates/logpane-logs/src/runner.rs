use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use logpane_transport::validate_topic;

use crate::config::validate_capacity;
use crate::error::{Error, Result};
use crate::filter::FilterHandle;
use crate::inbox::Inbox;
use crate::ingest::{IngestionLoop, ViewVersion};
use crate::reader::LogReader;

/// Requests handled by a spawned ingestion loop between ticks
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Control {
    Enable,
    Disable,
    Clear,
    SetCapacity(std::num::NonZeroUsize),
    SetTopic(String),
    Shutdown,
}

/// Handle to an ingestion loop running on a tokio task
pub struct IngestionHandle {
    control_tx: mpsc::UnboundedSender<Control>,
    inbox: Inbox,
    filter: FilterHandle,
    reader: LogReader,
    changes: watch::Receiver<ViewVersion>,
    task: tokio::task::JoinHandle<()>,
}

/// Run `ingestion` on a tokio task, ticking every `period`.
///
/// Must be called from within a tokio runtime.
pub fn spawn(mut ingestion: IngestionLoop, period: Duration) -> IngestionHandle {
    let (control_tx, mut control_rx) = mpsc::unbounded_channel();

    let inbox = ingestion.inbox().clone();
    let filter = ingestion.filter();
    let reader = ingestion.reader();
    let changes = ingestion.subscribe_changes();

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Instant::now();
                    ingestion.tick(now - last_tick);
                    last_tick = now;
                }

                control = control_rx.recv() => {
                    match control {
                        Some(Control::Shutdown) | None => break,
                        Some(control) => apply(&mut ingestion, control),
                    }
                }
            }
        }

        ingestion.disable();
        tracing::debug!("ingestion task stopped");
    });

    IngestionHandle {
        control_tx,
        inbox,
        filter,
        reader,
        changes,
        task,
    }
}

fn apply(ingestion: &mut IngestionLoop, control: Control) {
    let result = match control {
        Control::Enable => ingestion.enable(),
        Control::Disable => {
            ingestion.disable();
            Ok(())
        }
        Control::Clear => {
            ingestion.clear();
            Ok(())
        }
        Control::SetCapacity(capacity) => {
            ingestion.set_capacity(capacity);
            Ok(())
        }
        Control::SetTopic(topic) => ingestion.set_topic(&topic),
        Control::Shutdown => Ok(()),
    };

    if let Err(e) = result {
        tracing::warn!(error = %e, "ingestion control failed");
    }
}

impl IngestionHandle {
    fn send(&self, control: Control) -> Result<()> {
        self.control_tx.send(control).map_err(|_| Error::Shutdown)
    }

    pub fn enable(&self) -> Result<()> {
        self.send(Control::Enable)
    }

    /// Stop ingesting. Records queued before this call are dropped right
    /// away, before the loop sees the request.
    pub fn disable(&self) -> Result<()> {
        self.inbox.close();
        self.send(Control::Disable)
    }

    /// Pause if enabled, resume if paused. Pausing closes the inbox right
    /// away, as [`IngestionHandle::disable`] does. Returns whether ingestion
    /// is now enabled.
    pub fn toggle_pause(&self) -> Result<bool> {
        if self.inbox.is_open() {
            self.disable()?;
            Ok(false)
        } else {
            self.enable()?;
            Ok(true)
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.send(Control::Clear)
    }

    /// Change the store capacity. Zero is rejected here and the current
    /// capacity is kept.
    pub fn set_capacity(&self, capacity: usize) -> Result<()> {
        let capacity = validate_capacity(capacity)?;
        self.send(Control::SetCapacity(capacity))
    }

    pub fn set_topic(&self, topic: &str) -> Result<()> {
        validate_topic(topic)?;
        self.send(Control::SetTopic(topic.to_string()))
    }

    /// Handle for editing the filter
    pub fn filter(&self) -> &FilterHandle {
        &self.filter
    }

    pub fn reader(&self) -> &LogReader {
        &self.reader
    }

    /// Receiver notified after every tick that changed the view
    pub fn changes(&self) -> watch::Receiver<ViewVersion> {
        self.changes.clone()
    }

    /// Stop the loop and wait for its task to finish
    pub async fn shutdown(self) {
        let _ = self.control_tx.send(Control::Shutdown);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "ingestion task failed");
        }
    }
}
