use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;

use logpane_types::{ArcRecord, Record, RecordBody, Severity};

/// Bounded, arrival-ordered record storage with FIFO eviction.
///
/// Ids are assigned from a counter that only ever grows, so the arrival
/// order is also ascending id order and lookups by id are a binary search.
#[derive(Debug)]
pub struct RecordStore {
    /// Stored records, oldest first
    records: VecDeque<ArcRecord>,

    /// Maximum number of records kept
    capacity: NonZeroUsize,

    /// Id handed to the next inserted record
    next_id: u64,

    /// Per-severity counts, maintained on insert and eviction
    severity_counts: SeverityCounts,
}

impl RecordStore {
    /// Create an empty store holding at most `capacity` records
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.get().min(PREALLOCATE_LIMIT)),
            capacity,
            next_id: 0,
            severity_counts: SeverityCounts::default(),
        }
    }

    /// Store a record. Returns the assigned id and the id evicted to make
    /// room, if any.
    pub fn insert(&mut self, body: RecordBody) -> (u64, Option<u64>) {
        let id = self.next_id;
        self.next_id += 1;

        self.severity_counts.increment(body.severity);
        self.records.push_back(Arc::new(Record::from_body(id, body)));

        let evicted = if self.records.len() > self.capacity.get() {
            self.evict_oldest()
        } else {
            None
        };

        (id, evicted)
    }

    /// Look up a record by id
    pub fn get(&self, id: u64) -> Option<&ArcRecord> {
        self.records
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .and_then(|pos| self.records.get(pos))
    }

    /// Remove the oldest record
    pub fn evict_oldest(&mut self) -> Option<u64> {
        let evicted = self.records.pop_front()?;
        self.severity_counts.decrement(evicted.severity);
        Some(evicted.id)
    }

    /// Change the capacity, evicting from the front until the store fits.
    /// Returns the evicted ids, oldest first.
    pub fn set_capacity(&mut self, capacity: NonZeroUsize) -> Vec<u64> {
        self.capacity = capacity;

        let excess = self.records.len().saturating_sub(capacity.get());
        (0..excess).filter_map(|_| self.evict_oldest()).collect()
    }

    /// Remove every record. The id counter keeps counting so ids stay unique
    /// for the lifetime of the store.
    pub fn clear(&mut self) -> Vec<u64> {
        let evicted = self.records.drain(..).map(|r| r.id).collect();
        self.severity_counts = SeverityCounts::default();
        evicted
    }

    /// Records in arrival order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ArcRecord> + ExactSizeIterator {
        self.records.iter()
    }

    /// Stored ids in arrival order
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.records.iter().map(|r| r.id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Id the next inserted record will receive
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn severity_counts(&self) -> SeverityCounts {
        self.severity_counts.clone()
    }
}

/// Upper bound on the up-front allocation for large capacities
const PREALLOCATE_LIMIT: usize = 4096;

/// Counts per severity
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeverityCounts {
    pub debug: usize,
    pub info: usize,
    pub warn: usize,
    pub error: usize,
    pub fatal: usize,
    pub unknown: usize,
}

impl SeverityCounts {
    pub fn total(&self) -> usize {
        self.debug + self.info + self.warn + self.error + self.fatal + self.unknown
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Debug => self.debug,
            Severity::Info => self.info,
            Severity::Warn => self.warn,
            Severity::Error => self.error,
            Severity::Fatal => self.fatal,
            Severity::Unknown => self.unknown,
        }
    }

    fn slot(&mut self, severity: Severity) -> &mut usize {
        match severity {
            Severity::Debug => &mut self.debug,
            Severity::Info => &mut self.info,
            Severity::Warn => &mut self.warn,
            Severity::Error => &mut self.error,
            Severity::Fatal => &mut self.fatal,
            Severity::Unknown => &mut self.unknown,
        }
    }

    fn increment(&mut self, severity: Severity) {
        *self.slot(severity) += 1;
    }

    fn decrement(&mut self, severity: Severity) {
        let slot = self.slot(severity);
        *slot = slot.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cap(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn body(msg: &str) -> RecordBody {
        RecordBody::message(Severity::Info, msg)
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let mut store = RecordStore::new(cap(10));
        let (a, _) = store.insert(body("a"));
        let (b, _) = store.insert(body("b"));
        assert!(b > a);
        assert_eq!(store.get(b).unwrap().message(), "b");
    }

    #[test]
    fn test_evicts_oldest_past_capacity() {
        let mut store = RecordStore::new(cap(3));
        for msg in ["A", "B", "C"] {
            assert_eq!(store.insert(body(msg)).1, None);
        }
        let (_, evicted) = store.insert(body("D"));

        assert_eq!(evicted, Some(0));
        assert_eq!(store.len(), 3);
        assert!(store.get(0).is_none());
        let messages: Vec<_> = store.iter().map(|r| r.message().to_string()).collect();
        assert_eq!(messages, vec!["B", "C", "D"]);
    }

    #[test]
    fn test_set_capacity_shrinks_from_front() {
        let mut store = RecordStore::new(cap(5));
        for i in 0..5 {
            store.insert(body(&i.to_string()));
        }
        assert_eq!(store.set_capacity(cap(2)), vec![0, 1, 2]);
        assert_eq!(store.ids().collect::<Vec<_>>(), vec![3, 4]);

        // Growing never evicts
        assert!(store.set_capacity(cap(8)).is_empty());
        assert_eq!(store.capacity().get(), 8);
    }

    #[test]
    fn test_clear_keeps_id_counter() {
        let mut store = RecordStore::new(cap(4));
        store.insert(body("a"));
        store.insert(body("b"));

        assert_eq!(store.clear(), vec![0, 1]);
        assert!(store.is_empty());
        assert_eq!(store.severity_counts().total(), 0);

        let (id, _) = store.insert(body("c"));
        assert_eq!(id, 2);
    }

    #[test]
    fn test_severity_counts_follow_eviction() {
        let mut store = RecordStore::new(cap(2));
        store.insert(RecordBody::message(Severity::Error, "x"));
        store.insert(RecordBody::message(Severity::Warn, "y"));
        store.insert(RecordBody::message(Severity::Warn, "z"));

        let counts = store.severity_counts();
        assert_eq!(counts.error, 0);
        assert_eq!(counts.get(Severity::Warn), 2);
        assert_eq!(counts.total(), store.len());
    }

    #[test]
    fn test_get_unknown_id() {
        let store = RecordStore::new(cap(1));
        assert!(store.get(42).is_none());
        assert_eq!(store.next_id(), 0);
    }

    proptest! {
        #[test]
        fn prop_size_bounded_and_evicts_smallest(capacity in 1usize..16, inserts in 0usize..64) {
            let mut store = RecordStore::new(cap(capacity));
            for i in 0..inserts {
                let oldest = store.ids().next();
                let (_, evicted) = store.insert(body(&i.to_string()));
                prop_assert!(store.len() <= capacity);
                if let Some(evicted) = evicted {
                    prop_assert_eq!(Some(evicted), oldest);
                }
            }
            prop_assert_eq!(store.len(), inserts.min(capacity));
            prop_assert!(store.ids().zip(store.ids().skip(1)).all(|(a, b)| a < b));
        }
    }
}
