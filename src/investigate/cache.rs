// src/investigate/cache.rs

//! Bounded, age-ordered memoization for engine calls and whole
//! investigations. Size limits are soft; eviction drops the oldest entry.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use crate::engine::AnalysisResult;
use crate::investigate::InvestigationResult;

struct AgeOrdered<K, V> {
    table: HashMap<K, V>,
    ages: VecDeque<K>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> AgeOrdered<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            table: HashMap::new(),
            ages: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn probe(&self, key: &K) -> Option<V> {
        self.table.get(key).cloned()
    }

    fn store(&mut self, key: K, value: V) {
        if self.table.insert(key.clone(), value).is_none() {
            self.ages.push_back(key);
        }
        while self.table.len() > self.capacity {
            if let Some(oldest) = self.ages.pop_front() {
                self.table.remove(&oldest);
            } else {
                break;
            }
        }
    }

    fn len(&self) -> usize {
        self.table.len()
    }
}

/// `(fen, depth) -> AnalysisResult`, cached only for plain single-PV calls.
pub struct LeafCache {
    inner: AgeOrdered<(String, u32), AnalysisResult>,
}

impl LeafCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: AgeOrdered::new(capacity),
        }
    }

    pub fn probe(&self, fen: &str, depth: u32) -> Option<AnalysisResult> {
        self.inner.probe(&(fen.to_string(), depth))
    }

    pub fn store(&mut self, fen: &str, depth: u32, result: &AnalysisResult) {
        if result.multipv != 1 {
            return;
        }
        self.inner.store((fen.to_string(), depth), result.clone());
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultKey {
    pub fen: String,
    pub move_san: Option<String>,
    pub kind: String,
    pub variant: String,
}

/// `(fen, move?, kind, variant) -> InvestigationResult`. Returned values are
/// clones, so callers may mutate freely without corrupting the cache.
pub struct ResultCache {
    inner: AgeOrdered<ResultKey, InvestigationResult>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: AgeOrdered::new(capacity),
        }
    }

    pub fn probe(&self, key: &ResultKey) -> Option<InvestigationResult> {
        self.inner.probe(key)
    }

    pub fn store(&mut self, key: ResultKey, result: &InvestigationResult) {
        self.inner.store(key, result.clone());
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(fen: &str) -> AnalysisResult {
        AnalysisResult {
            multipv: 1,
            ..AnalysisResult::empty(fen, 8, 1)
        }
    }

    #[test]
    fn test_leaf_cache_round_trip() {
        let mut cache = LeafCache::new(4);
        let result = leaf("fen-a");
        cache.store("fen-a", 8, &result);
        assert_eq!(cache.probe("fen-a", 8), Some(result));
        assert!(cache.probe("fen-a", 16).is_none());
    }

    #[test]
    fn test_leaf_cache_skips_multipv() {
        let mut cache = LeafCache::new(4);
        let result = AnalysisResult {
            multipv: 2,
            ..AnalysisResult::empty("fen-a", 8, 2)
        };
        cache.store("fen-a", 8, &result);
        assert!(cache.probe("fen-a", 8).is_none());
    }

    #[test]
    fn test_eviction_is_age_ordered() {
        let mut cache = LeafCache::new(2);
        cache.store("a", 1, &leaf("a"));
        cache.store("b", 1, &leaf("b"));
        cache.store("c", 1, &leaf("c"));
        assert!(cache.probe("a", 1).is_none());
        assert!(cache.probe("b", 1).is_some());
        assert!(cache.probe("c", 1).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_result_cache_variant_isolation() {
        let mut cache = ResultCache::new(4);
        let result = InvestigationResult::minimal("fen-a");
        let deep = ResultKey {
            fen: "fen-a".into(),
            move_san: None,
            kind: "position".into(),
            variant: "d16|d2".into(),
        };
        cache.store(deep.clone(), &result);
        let shallow = ResultKey {
            variant: "d4|d2".into(),
            ..deep.clone()
        };
        assert!(cache.probe(&deep).is_some());
        assert!(cache.probe(&shallow).is_none());
    }
}
