// Inference cache - Bounded window of recent feature vectors
use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::domain::errors::CacheContractError;
use crate::domain::features::FeatureVector;

/// Fixed-capacity FIFO of feature vectors, shared between connection handlers
/// (append only) and the classifier (snapshot reads).
#[derive(Debug)]
pub struct InferenceCache {
    capacity: usize,
    width: usize,
    entries: Mutex<VecDeque<FeatureVector>>,
}

impl InferenceCache {
    pub fn new(capacity: usize, width: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            width,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Appends a vector, evicting the oldest when full.
    pub fn push(&self, vector: FeatureVector) -> Result<(), CacheContractError> {
        if vector.len() != self.width {
            return Err(CacheContractError::WidthMismatch {
                expected: self.width,
                got: vector.len(),
            });
        }

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(vector);
        Ok(())
    }

    /// Snapshot of the current window, oldest first. Does not clear the cache.
    pub fn drain_for_batch(&self) -> Vec<FeatureVector> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::features::FeatureLayout;

    fn vector(first: f64) -> FeatureVector {
        let mut values = vec![0.0; FeatureLayout::Standard.width()];
        values[0] = first;
        FeatureVector::new(FeatureLayout::Standard, values).unwrap()
    }

    #[test]
    fn test_evicts_oldest() {
        let cache = InferenceCache::new(3, 7);
        for i in 0..4 {
            cache.push(vector(i as f64)).unwrap();
        }

        let snapshot = cache.drain_for_batch();
        assert_eq!(snapshot.len(), 3);
        let firsts: Vec<f64> = snapshot.iter().map(|v| v.as_slice()[0]).collect();
        assert_eq!(firsts, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_snapshot_does_not_clear() {
        let cache = InferenceCache::new(10, 7);
        cache.push(vector(1.0)).unwrap();
        assert_eq!(cache.drain_for_batch().len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_rejects_wrong_width() {
        let cache = InferenceCache::new(10, 8);
        let err = cache.push(vector(1.0)).unwrap_err();
        assert_eq!(
            err,
            CacheContractError::WidthMismatch {
                expected: 8,
                got: 7
            }
        );
        assert!(cache.is_empty());
    }
}
