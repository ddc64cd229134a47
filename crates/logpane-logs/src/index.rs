use std::collections::VecDeque;

use crate::filter::FilterEngine;
use crate::store::RecordStore;

/// Ids of the records passing the active filter, in arrival order.
///
/// Always a subsequence of the store's arrival order. Since the store only
/// ever evicts its oldest record, an evicted id that is present here sits at
/// the front.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilteredIndex {
    ids: VecDeque<u64>,
}

impl FilteredIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a newly ingested id that passed the current filter
    pub fn append(&mut self, id: u64) {
        debug_assert!(self.ids.back().is_none_or(|last| *last < id));
        self.ids.push_back(id);
    }

    /// Recompute from every stored record. Returns the number of ids kept.
    pub fn rebuild(&mut self, store: &RecordStore, filter: &FilterEngine) -> usize {
        let ids: VecDeque<u64> = store
            .iter()
            .filter(|record| filter.passes(record))
            .map(|record| record.id)
            .collect();
        self.ids = ids;
        self.ids.len()
    }

    /// Drop an id (after eviction). Returns whether it was present.
    pub fn remove_if_present(&mut self, id: u64) -> bool {
        if self.ids.front() == Some(&id) {
            self.ids.pop_front();
            return true;
        }
        match self.ids.binary_search(&id) {
            Ok(pos) => {
                self.ids.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Id at a display position (0 = oldest shown)
    pub fn get(&self, position: usize) -> Option<u64> {
        self.ids.get(position).copied()
    }

    /// Display position of an id
    pub fn position_of(&self, id: u64) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    /// First display position holding an id greater than `id`
    pub fn first_after(&self, id: u64) -> usize {
        self.ids.partition_point(|candidate| *candidate <= id)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = u64> + ExactSizeIterator + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}
