//! Registry of expansion runs started through the API

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use refgraph_common::config::ExpansionConfig;
use refgraph_expansion::RunHandle;
use std::time::Duration;
use uuid::Uuid;

/// Live runs plus recently finished ones, bounded by age and count
#[derive(Debug)]
pub struct RunRegistry {
    runs: DashMap<Uuid, RunHandle>,
    retention: Duration,
    max_finished: usize,
}

impl RunRegistry {
    pub fn new(config: &ExpansionConfig) -> Self {
        Self {
            runs: DashMap::new(),
            retention: Duration::from_secs(config.run_retention_secs),
            max_finished: config.run_retention_max,
        }
    }

    pub fn insert(&self, handle: RunHandle) {
        self.sweep(Utc::now());
        self.runs.insert(handle.run_id(), handle);
    }

    pub fn get(&self, run_id: &Uuid) -> Option<RunHandle> {
        self.sweep(Utc::now());
        self.runs.get(run_id).map(|entry| entry.value().clone())
    }

    /// Runs that have not reached a terminal state
    pub fn unfinished(&self) -> Vec<RunHandle> {
        self.runs
            .iter()
            .filter(|entry| !entry.value().is_finished())
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Drop finished runs older than the retention window, then the oldest
    /// finished runs above the count cap. Returns the number removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.runs.len();
        let retention = self.retention;
        self.runs.retain(|_, handle| match finished_at(handle) {
            Some(finished) => now
                .signed_duration_since(finished)
                .to_std()
                .map_or(true, |elapsed| elapsed < retention),
            None => true,
        });

        let mut finished: Vec<(DateTime<Utc>, Uuid)> = self
            .runs
            .iter()
            .filter_map(|entry| Some((finished_at(entry.value())?, *entry.key())))
            .collect();
        if finished.len() > self.max_finished {
            finished.sort();
            let excess = finished.len() - self.max_finished;
            for (_, run_id) in finished.into_iter().take(excess) {
                self.runs.remove(&run_id);
            }
        }

        let removed = before.saturating_sub(self.runs.len());
        if removed > 0 {
            tracing::debug!(removed, retained = self.runs.len(), "Evicted finished expansion runs");
        }
        removed
    }
}

fn finished_at(handle: &RunHandle) -> Option<DateTime<Utc>> {
    handle.report().map(|report| report.finished_at)
}
