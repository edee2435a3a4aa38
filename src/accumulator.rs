//! Concurrent rank accumulator shared between the phase driver and
//! the result consumer.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::graph::VertexId;

/// Thread-safe vertex→value accumulator.
///
/// `increment` is commutative and associative, so the order in which
/// worker results arrive does not affect the accumulated totals.
/// Cloning is shallow: clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct RankAccumulator {
    inner: Arc<RwLock<HashMap<VertexId, f64>>>,
}

impl RankAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to the value stored for `id` (0.0 if absent).
    pub fn increment(&self, id: VertexId, delta: f64) {
        let mut map = self.inner.write().unwrap();
        *map.entry(id).or_insert(0.0) += delta;
    }

    /// Current value for `id`, 0.0 if absent.
    pub fn get(&self, id: VertexId) -> f64 {
        self.inner.read().unwrap().get(&id).copied().unwrap_or(0.0)
    }

    /// All vertex ids currently present.
    pub fn keys(&self) -> Vec<VertexId> {
        self.inner.read().unwrap().keys().copied().collect()
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> HashMap<VertexId, f64> {
        self.inner.read().unwrap().clone()
    }

    /// Atomically snapshot and clear. The Collect phase relies on no
    /// increment landing between the snapshot and the clear.
    pub fn take(&self) -> HashMap<VertexId, f64> {
        let mut map = self.inner.write().unwrap();
        std::mem::take(&mut *map)
    }

    /// Replace the contents wholesale.
    pub fn replace(&self, values: HashMap<VertexId, f64>) {
        *self.inner.write().unwrap() = values;
    }

    /// Drop all accumulated values.
    pub fn reset(&self) {
        self.inner.write().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }
}
