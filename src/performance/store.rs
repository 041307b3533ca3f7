use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::performance::metric::{Metric, MetricKind};

/// Keyed table of in-flight and completed metrics.
///
/// Iteration follows first-insertion order; overwriting a key keeps its
/// original position. Entries are only ever removed by [`MetricStore::clear`].
#[derive(Debug, Default)]
pub struct MetricStore {
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    metrics: Vec<Metric>,
    index: HashMap<String, usize>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts `metric`, replacing any entry with the same name. Returns the
    /// replaced entry.
    pub fn insert(&self, metric: Metric) -> Option<Metric> {
        let mut state = self.lock();
        match state.index.get(&metric.name).copied() {
            Some(slot) => Some(std::mem::replace(&mut state.metrics[slot], metric)),
            None => {
                let slot = state.metrics.len();
                state.index.insert(metric.name.clone(), slot);
                state.metrics.push(metric);
                None
            }
        }
    }

    /// Ends the metric called `name` at `end_time`. Returns `false`, leaving
    /// the store untouched, when no such metric exists.
    pub fn complete(&self, name: &str, end_time: f64, extra: Option<MetricKind>) -> bool {
        let mut state = self.lock();
        let Some(slot) = state.index.get(name).copied() else {
            return false;
        };
        state.metrics[slot].finish(end_time, extra);
        true
    }

    pub fn get(&self, name: &str) -> Option<Metric> {
        let state = self.lock();
        state
            .index
            .get(name)
            .map(|slot| state.metrics[*slot].clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().index.contains_key(name)
    }

    /// Snapshot of every stored metric.
    pub fn metrics(&self) -> Vec<Metric> {
        self.lock().metrics.clone()
    }

    /// Snapshot of the metrics matching `predicate`.
    pub fn filter<F>(&self, mut predicate: F) -> Vec<Metric>
    where
        F: FnMut(&Metric) -> bool,
    {
        self.lock()
            .metrics
            .iter()
            .filter(|metric| predicate(metric))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.metrics.clear();
        state.index.clear();
    }

    /// Replaces the whole content with `metrics`, as read back from an export.
    /// Later duplicates win.
    pub fn restore(&self, metrics: Vec<Metric>) {
        self.clear();
        for metric in metrics {
            self.insert(metric);
        }
    }
}
