// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Filtered-view cache.
//!
//! Holds the ordered row ids of recent `(filter, sort)` combinations. The
//! count for a filter is the length of its id list, so counts and pages can
//! never disagree. Entries are tagged with the view generation they were
//! computed from and dropped wholesale when the store publishes a new view.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::filter::{EntryFilter, SortSpec};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub filter: EntryFilter,
    pub sort: SortSpec,
}

struct Inner {
    generation: u64,
    entries: FxHashMap<CacheKey, Arc<Vec<u32>>>,
    order: VecDeque<CacheKey>,
    held_ids: usize,
}

pub struct QueryCache {
    inner: Mutex<Inner>,
    capacity_ids: usize,
}

impl QueryCache {
    pub fn new(capacity_ids: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                generation: 0,
                entries: FxHashMap::default(),
                order: VecDeque::new(),
                held_ids: 0,
            }),
            capacity_ids,
        }
    }

    fn reset(inner: &mut Inner, generation: u64) {
        inner.generation = generation;
        inner.entries.clear();
        inner.order.clear();
        inner.held_ids = 0;
    }

    pub fn get(&self, generation: u64, key: &CacheKey) -> Option<Arc<Vec<u32>>> {
        let mut inner = self.inner.lock();
        if generation > inner.generation {
            Self::reset(&mut inner, generation);
            return None;
        }
        if generation < inner.generation {
            return None;
        }
        inner.entries.get(key).cloned()
    }

    /// Largest id list the cache will hold.
    pub fn capacity_ids(&self) -> usize {
        self.capacity_ids
    }

    pub fn insert(&self, generation: u64, key: CacheKey, ids: Arc<Vec<u32>>) {
        if ids.len() > self.capacity_ids {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            if generation < inner.generation {
                return;
            }
            Self::reset(&mut inner, generation);
        }
        if inner.entries.contains_key(&key) {
            return;
        }
        while inner.held_ids + ids.len() > self.capacity_ids {
            let Some(oldest) = inner.order.pop_front() else { break };
            if let Some(evicted) = inner.entries.remove(&oldest) {
                inner.held_ids -= evicted.len();
            }
        }
        inner.held_ids += ids.len();
        inner.order.push_back(key.clone());
        inner.entries.insert(key, ids);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let generation = inner.generation;
        Self::reset(&mut inner, generation);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
