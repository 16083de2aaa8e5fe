//! Concurrent fitness memo keyed by architecture string.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Scores of one trained candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Lower is better
    pub fitness: f32,
    pub validation_accuracy: f32,
    pub parameters: usize,
}

/// State of one architecture within a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheEntry {
    /// Claimed by an individual whose evaluation has not finished
    Pending,
    Evaluated(Evaluation),
    /// The architecture cannot be built
    Invalid,
}

/// Records every architecture a GA run has seen so no candidate is
/// trained twice.
///
/// Safe to share across the rayon workers of one generation.
#[derive(Debug, Default)]
pub struct FitnessCache {
    entries: DashMap<String, CacheEntry>,
}

impl FitnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| *entry)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Marks `key` as pending if it has never been seen.
    ///
    /// # Returns
    ///
    /// `true` when the caller now owns the evaluation of `key`
    pub fn claim(&self, key: &str) -> bool {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(CacheEntry::Pending);
                true
            }
        }
    }

    pub fn record(&self, key: &str, evaluation: Evaluation) {
        self.entries
            .insert(key.to_string(), CacheEntry::Evaluated(evaluation));
    }

    pub fn mark_invalid(&self, key: &str) {
        self.entries.insert(key.to_string(), CacheEntry::Invalid);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lowest-fitness architecture evaluated so far.
    pub fn best(&self) -> Option<(String, Evaluation)> {
        self.entries
            .iter()
            .filter_map(|entry| match *entry.value() {
                CacheEntry::Evaluated(evaluation) => Some((entry.key().clone(), evaluation)),
                _ => None,
            })
            .min_by(|a, b| a.1.fitness.total_cmp(&b.1.fitness))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn evaluation(fitness: f32) -> Evaluation {
        Evaluation {
            fitness,
            validation_accuracy: 1.0 - fitness / 100.0,
            parameters: 10,
        }
    }

    #[test]
    fn test_claim_only_once() {
        let cache = FitnessCache::new();
        assert!(cache.claim("a"));
        assert!(!cache.claim("a"));
        assert_eq!(cache.get("a"), Some(CacheEntry::Pending));

        cache.record("a", evaluation(12.0));
        assert!(!cache.claim("a"));
        assert_eq!(cache.get("a"), Some(CacheEntry::Evaluated(evaluation(12.0))));

        cache.mark_invalid("b");
        assert_eq!(cache.get("b"), Some(CacheEntry::Invalid));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_best_ignores_pending_and_invalid() {
        let cache = FitnessCache::new();
        assert!(cache.best().is_none());

        cache.record("x", evaluation(30.0));
        cache.record("y", evaluation(5.0));
        cache.claim("z");
        cache.mark_invalid("w");

        let (key, best) = cache.best().unwrap();
        assert_eq!(key, "y");
        assert_eq!(best.fitness, 5.0);
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        use rayon::prelude::*;

        let cache = Arc::new(FitnessCache::new());
        let winners = (0..64)
            .into_par_iter()
            .filter(|_| cache.claim("shared"))
            .count();
        assert_eq!(winners, 1);
    }
}
