use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::RwLock;

use logpane_types::{ArcRecord, Record};

use crate::error::{Error, Result};
use crate::index::FilteredIndex;
use crate::store::{RecordStore, SeverityCounts};

/// Store and index, kept behind one lock so readers always see a pair that
/// belongs to the same tick
#[derive(Debug)]
pub(crate) struct View {
    pub(crate) store: RecordStore,
    pub(crate) index: FilteredIndex,
}

pub(crate) type SharedView = Arc<RwLock<View>>;

impl View {
    pub(crate) fn new(capacity: NonZeroUsize) -> Self {
        Self {
            store: RecordStore::new(capacity),
            index: FilteredIndex::new(),
        }
    }

    fn record_at(&self, position: usize) -> Option<ArcRecord> {
        let id = self.index.get(position)?;
        self.store.get(id).cloned()
    }

    fn records_in(&self, start: usize, count: usize) -> Vec<ArcRecord> {
        self.index
            .iter()
            .skip(start)
            .take(count)
            .filter_map(|id| self.store.get(id).cloned())
            .collect()
    }
}

/// Read-only access to the filtered view, for display code.
///
/// Cheap to clone; every call takes the read lock once.
#[derive(Clone)]
pub struct LogReader {
    view: SharedView,
}

impl LogReader {
    pub(crate) fn new(view: SharedView) -> Self {
        Self { view }
    }

    /// Number of records passing the filter
    pub fn len(&self) -> usize {
        self.view.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.read().index.is_empty()
    }

    /// Record at a display position (0 = oldest shown)
    pub fn get_by_position(&self, position: usize) -> Option<ArcRecord> {
        self.view.read().record_at(position)
    }

    /// Record by id, whether or not it passes the filter
    pub fn record(&self, id: u64) -> Result<ArcRecord> {
        self.view
            .read()
            .store
            .get(id)
            .cloned()
            .ok_or(Error::RecordNotFound(id))
    }

    /// Display position of a record, if it is shown
    pub fn position_of(&self, id: u64) -> Option<usize> {
        self.view.read().index.position_of(id)
    }

    /// Records in a range of display positions (for virtual scrolling)
    pub fn range(&self, start: usize, count: usize) -> Vec<ArcRecord> {
        self.view.read().records_in(start, count)
    }

    /// The last `n` shown records
    pub fn tail(&self, n: usize) -> Vec<ArcRecord> {
        let view = self.view.read();
        view.records_in(view.index.len().saturating_sub(n), n)
    }

    /// Shown records with an id greater than `id` (all of them for `None`)
    pub fn newer_than(&self, id: Option<u64>) -> Vec<ArcRecord> {
        let view = self.view.read();
        let start = id.map_or(0, |id| view.index.first_after(id));
        view.records_in(start, usize::MAX)
    }

    /// Every shown record
    pub fn visible(&self) -> Vec<ArcRecord> {
        self.range(0, usize::MAX)
    }

    /// Shown ids, oldest first
    pub fn visible_ids(&self) -> Vec<u64> {
        self.view.read().index.iter().collect()
    }

    /// Number of stored records, shown or not
    pub fn stored_len(&self) -> usize {
        self.view.read().store.len()
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.view.read().store.capacity()
    }

    /// Severity counts over every stored record
    pub fn severity_counts(&self) -> SeverityCounts {
        self.view.read().store.severity_counts()
    }

    /// Export the shown records as text lines
    pub fn export(&self) -> String {
        self.visible()
            .iter()
            .map(|r| format_line(r))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Single-line text form of a record: severity, time, node, message, then
/// the source location
pub fn format_line(record: &Record) -> String {
    let mut line = format!("[{}]", record.severity.as_str());
    if let Some(ts) = record.timestamp {
        line.push(' ');
        line.push_str(&ts.format("%H:%M:%S%.3f").to_string());
    }
    if let Some(node) = record.node().filter(|n| !n.is_empty()) {
        line.push(' ');
        line.push_str(node);
        line.push(':');
    }
    line.push(' ');
    line.push_str(record.message());
    if let Some(location) = record.location() {
        line.push_str(" (");
        line.push_str(&location);
        line.push(')');
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpane_types::{NodeLog, RecordBody, Severity};

    fn reader_with(messages: &[&str], keep: impl Fn(&str) -> bool) -> LogReader {
        let mut view = View::new(NonZeroUsize::new(16).unwrap());
        for msg in messages {
            let (id, _) = view.store.insert(RecordBody::message(Severity::Info, *msg));
            if keep(*msg) {
                view.index.append(id);
            }
        }
        LogReader::new(Arc::new(RwLock::new(view)))
    }

    #[test]
    fn test_positions_follow_index() {
        let reader = reader_with(&["a", "b", "c", "d"], |m| m != "b");
        assert_eq!(reader.len(), 3);
        assert_eq!(reader.stored_len(), 4);
        assert_eq!(reader.get_by_position(1).unwrap().message(), "c");
        assert!(reader.get_by_position(3).is_none());
        assert_eq!(reader.visible_ids(), vec![0, 2, 3]);

        let tail: Vec<_> = reader.tail(2).iter().map(|r| r.message().to_string()).collect();
        assert_eq!(tail, vec!["c", "d"]);
        assert_eq!(reader.range(1, 1)[0].id, 2);

        let newer: Vec<_> = reader.newer_than(Some(1)).iter().map(|r| r.id).collect();
        assert_eq!(newer, vec![2, 3]);
        assert_eq!(reader.newer_than(None).len(), 3);
    }

    #[test]
    fn test_record_lookup() {
        let reader = reader_with(&["a", "b"], |_| false);
        assert!(reader.is_empty());
        assert_eq!(reader.record(1).unwrap().message(), "b");
        assert!(matches!(reader.record(9), Err(Error::RecordNotFound(9))));
    }

    #[test]
    fn test_format_line() {
        let body: RecordBody = NodeLog {
            severity: Severity::Error,
            node: "/base".to_string(),
            message: "motor stalled".to_string(),
            file: "base.cpp".to_string(),
            line: 7,
            ..Default::default()
        }
        .into();
        let record = Record::from_body(0, body);
        assert_eq!(format_line(&record), "[ERR] /base: motor stalled (base.cpp:7)");
    }

    #[test]
    fn test_export() {
        let reader = reader_with(&["one", "two"], |_| true);
        assert_eq!(reader.export(), "[INF] one\n[INF] two");
    }
}
