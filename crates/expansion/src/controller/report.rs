//! Run state, live progress and the final report

use chrono::{DateTime, Utc};
use refgraph_common::DocumentId;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Expanding,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Queued => "queued",
            RunState::Expanding => "expanding",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

/// A node or candidate that could not be processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<DocumentId>,
    /// Raw citation text when the failure concerns one candidate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    pub reason: String,
}

impl RunFailure {
    pub fn node(node_id: DocumentId, reason: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id),
            candidate: None,
            reason: reason.into(),
        }
    }

    pub fn candidate(node_id: DocumentId, raw_text: &str, reason: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id),
            candidate: Some(raw_text.to_string()),
            reason: reason.into(),
        }
    }
}

/// Counters updated by workers while the run executes
#[derive(Debug, Default)]
pub struct RunProgress {
    candidates_parsed: AtomicU64,
    nodes_created: AtomicU64,
    nodes_reused: AtomicU64,
    stubs_created: AtomicU64,
    edges_created: AtomicU64,
    nodes_expanded: AtomicU64,
    nodes_skipped: AtomicU64,
    queued: AtomicU64,
    max_depth_reached: AtomicU32,
}

impl RunProgress {
    pub fn candidate_parsed(&self) {
        self.candidates_parsed.fetch_add(1, Ordering::Relaxed);
    }

    /// A node inserted by this run
    pub fn node_created(&self, stub: bool) {
        self.nodes_created.fetch_add(1, Ordering::Relaxed);
        if stub {
            self.stubs_created.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn node_reused(&self) {
        self.nodes_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn edge_created(&self, depth: u32) {
        self.edges_created.fetch_add(1, Ordering::Relaxed);
        self.max_depth_reached.fetch_max(depth, Ordering::Relaxed);
    }

    pub fn node_expanded(&self) {
        self.nodes_expanded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn node_skipped(&self) {
        self.nodes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queued(&self, queued: usize) {
        self.queued.store(queued as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            candidates_parsed: self.candidates_parsed.load(Ordering::Relaxed),
            nodes_created: self.nodes_created.load(Ordering::Relaxed),
            nodes_reused: self.nodes_reused.load(Ordering::Relaxed),
            stubs_created: self.stubs_created.load(Ordering::Relaxed),
            edges_created: self.edges_created.load(Ordering::Relaxed),
            nodes_expanded: self.nodes_expanded.load(Ordering::Relaxed),
            nodes_skipped: self.nodes_skipped.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            max_depth_reached: self.max_depth_reached.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub candidates_parsed: u64,
    /// Nodes inserted by the run, stubs included
    pub nodes_created: u64,
    pub nodes_reused: u64,
    pub stubs_created: u64,
    pub edges_created: u64,
    pub nodes_expanded: u64,
    pub nodes_skipped: u64,
    pub queued: u64,
    pub max_depth_reached: u32,
}

/// Outcome of one expansion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionReport {
    pub run_id: Uuid,
    pub seed_id: DocumentId,
    pub state: RunState,
    pub cancelled: bool,
    pub max_depth: u32,
    pub concurrency: usize,
    pub candidates_parsed: u64,
    pub nodes_created: u64,
    pub nodes_reused: u64,
    pub stubs_created: u64,
    pub edges_created: u64,
    pub nodes_expanded: u64,
    pub nodes_skipped: u64,
    pub max_depth_reached: u32,
    pub failures: Vec<RunFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExpansionReport {
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_snapshot() {
        let progress = RunProgress::default();
        progress.node_created(false);
        progress.node_created(true);
        progress.node_reused();
        progress.edge_created(1);
        progress.edge_created(2);
        progress.edge_created(1);

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.nodes_created, 2);
        assert_eq!(snapshot.stubs_created, 1);
        assert_eq!(snapshot.nodes_reused, 1);
        assert_eq!(snapshot.edges_created, 3);
        assert_eq!(snapshot.max_depth_reached, 2);
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_string(&RunState::Expanding).unwrap(), "\"expanding\"");
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Queued.is_terminal());
    }
}
