//! Recursive expansion controller
//!
//! Breadth-first expansion from a seed node: every node with content is
//! parsed, each candidate is resolved, materialized and linked, and newly
//! discovered documents are queued one level deeper until `max_depth`.
//! A bounded pool of workers drains the queue; a [`VisitedSet`] guarantees
//! every node is expanded at most once.

mod report;
mod visited;

pub use report::{ExpansionReport, ProgressSnapshot, RunFailure, RunProgress, RunState};
pub use visited::VisitedSet;

use crate::cancel::{CancelHandle, CancelSignal};
use crate::coordinator::AcquisitionCoordinator;
use crate::errors::{ExpansionError, Result};
use crate::parser::CitationParser;
use crate::resolver::{EntityResolver, InFlightMap, Resolution};
use crate::sources::SourceGateway;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use refgraph_common::config::ExpansionConfig;
use refgraph_common::metrics::{
    record_active_runs, record_candidates, record_edge, record_resolution, record_run,
};
use refgraph_common::{AppConfig, DocumentId, EdgeDraft, GraphStore};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Parameters of one run; unset limits fall back to configured defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionRequest {
    pub seed_id: DocumentId,
    pub max_depth: Option<u32>,
    pub concurrency: Option<usize>,
}

impl ExpansionRequest {
    pub fn new(seed_id: DocumentId) -> Self {
        Self {
            seed_id,
            max_depth: None,
            concurrency: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Effective `(max_depth, concurrency)` within configured bounds
    pub fn limits(&self, config: &ExpansionConfig) -> Result<(u32, usize)> {
        let max_depth = self.max_depth.unwrap_or(config.default_max_depth);
        if max_depth == 0 || max_depth > config.max_depth_limit {
            return Err(ExpansionError::InvalidRequest(format!(
                "max_depth must be between 1 and {}",
                config.max_depth_limit
            )));
        }

        let concurrency = self.concurrency.unwrap_or(config.default_concurrency);
        if concurrency == 0 || concurrency > config.max_concurrency {
            return Err(ExpansionError::InvalidRequest(format!(
                "concurrency must be between 1 and {}",
                config.max_concurrency
            )));
        }
        Ok((max_depth, concurrency))
    }
}

/// State shared between a run task and its handles
#[derive(Debug)]
struct RunShared {
    run_id: Uuid,
    seed_id: DocumentId,
    max_depth: u32,
    concurrency: usize,
    cancel: CancelHandle,
    state: watch::Sender<RunState>,
    progress: RunProgress,
    report: OnceCell<ExpansionReport>,
    started_at: DateTime<Utc>,
}

impl RunShared {
    fn set_state(&self, state: RunState) {
        self.state.send_replace(state);
    }

    fn report(&self, state: RunState, failures: Vec<RunFailure>) -> ExpansionReport {
        let progress = self.progress.snapshot();
        ExpansionReport {
            run_id: self.run_id,
            seed_id: self.seed_id,
            state,
            cancelled: self.cancel.is_cancelled(),
            max_depth: self.max_depth,
            concurrency: self.concurrency,
            candidates_parsed: progress.candidates_parsed,
            nodes_created: progress.nodes_created,
            nodes_reused: progress.nodes_reused,
            stubs_created: progress.stubs_created,
            edges_created: progress.edges_created,
            nodes_expanded: progress.nodes_expanded,
            nodes_skipped: progress.nodes_skipped,
            max_depth_reached: progress.max_depth_reached,
            failures,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    /// Publish the report, then the terminal state
    fn finish(&self, report: ExpansionReport) {
        let state = report.state;
        record_run(state.as_str(), report.duration_secs());
        record_active_runs(-1.0);
        if self.report.set(report).is_err() {
            warn!(run_id = %self.run_id, "Run finished twice");
        }
        self.set_state(state);
    }
}

/// Owned handle to a started run: observe, cancel, await
#[derive(Debug, Clone)]
pub struct RunHandle {
    shared: Arc<RunShared>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.shared.run_id
    }

    pub fn seed_id(&self) -> DocumentId {
        self.shared.seed_id
    }

    pub fn state(&self) -> RunState {
        *self.shared.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Request cancellation. Returns false when the run already finished.
    pub fn cancel(&self) -> bool {
        if self.is_finished() {
            return false;
        }
        self.shared.cancel.cancel();
        true
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.shared.progress.snapshot()
    }

    /// Final report, once the run finished
    pub fn report(&self) -> Option<ExpansionReport> {
        self.shared.report.get().cloned()
    }

    /// Wait for the run to finish
    pub async fn join(&self) -> Result<ExpansionReport> {
        let mut state = self.shared.state.subscribe();
        state
            .wait_for(RunState::is_terminal)
            .await
            .map_err(|_| ExpansionError::InvalidRequest("run state channel closed".into()))?;
        self.report().ok_or_else(|| {
            ExpansionError::InvalidRequest(format!("run {} finished without a report", self.run_id()))
        })
    }
}

/// Everything a worker needs, shared across one run
struct RunContext {
    parser: CitationParser,
    resolver: EntityResolver,
    coordinator: Arc<AcquisitionCoordinator>,
    store: Arc<dyn GraphStore>,
    visited: VisitedSet,
    in_flight: InFlightMap,
    shared: Arc<RunShared>,
    cancel: CancelSignal,
}

/// Result of expanding one node
#[derive(Default)]
struct NodeOutcome {
    children: Vec<(DocumentId, u32)>,
    failures: Vec<RunFailure>,
}

/// Drives expansion runs against one store and gateway
pub struct ExpansionController {
    parser: CitationParser,
    resolver: EntityResolver,
    coordinator: Arc<AcquisitionCoordinator>,
    store: Arc<dyn GraphStore>,
    limits: ExpansionConfig,
}

impl ExpansionController {
    pub fn new(store: Arc<dyn GraphStore>, gateway: Arc<SourceGateway>, config: &AppConfig) -> Self {
        Self {
            parser: CitationParser::new(config.citation.clone()),
            resolver: EntityResolver::new(config.resolver.clone()),
            coordinator: Arc::new(AcquisitionCoordinator::new(store.clone(), gateway)),
            store,
            limits: config.expansion.clone(),
        }
    }

    /// Controller with the configured providers
    pub fn from_config(config: &AppConfig, store: Arc<dyn GraphStore>) -> Result<Self> {
        let gateway = SourceGateway::from_config(config)?;
        Ok(Self::new(store, Arc::new(gateway), config))
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn limits(&self) -> &ExpansionConfig {
        &self.limits
    }

    /// Run an expansion to completion
    pub async fn expand(&self, request: ExpansionRequest) -> Result<ExpansionReport> {
        self.start(request)?.join().await
    }

    /// Start an expansion in the background. Only invalid limits fail here.
    pub fn start(&self, request: ExpansionRequest) -> Result<RunHandle> {
        let (max_depth, concurrency) = request.limits(&self.limits)?;
        let cancel = CancelHandle::new();
        let (state, _) = watch::channel(RunState::Queued);
        let shared = Arc::new(RunShared {
            run_id: Uuid::new_v4(),
            seed_id: request.seed_id,
            max_depth,
            concurrency,
            cancel: cancel.clone(),
            state,
            progress: RunProgress::default(),
            report: OnceCell::new(),
            started_at: Utc::now(),
        });

        let context = Arc::new(RunContext {
            parser: self.parser.clone(),
            resolver: self.resolver.clone(),
            coordinator: self.coordinator.clone(),
            store: self.store.clone(),
            visited: VisitedSet::with_seed(request.seed_id),
            in_flight: InFlightMap::new(),
            shared: shared.clone(),
            cancel: cancel.signal(),
        });

        record_active_runs(1.0);
        let supervisor = shared.clone();
        tokio::spawn(async move {
            let report = match tokio::spawn(run(context)).await {
                Ok(report) => report,
                Err(e) => {
                    error!(run_id = %supervisor.run_id, error = %e, "Expansion task aborted");
                    supervisor.report(
                        RunState::Failed,
                        vec![RunFailure {
                            node_id: None,
                            candidate: None,
                            reason: format!("run task aborted: {}", e),
                        }],
                    )
                }
            };
            supervisor.finish(report);
        });

        Ok(RunHandle { shared })
    }
}

#[instrument(skip_all, fields(run_id = %context.shared.run_id, seed_id = %context.shared.seed_id))]
async fn run(context: Arc<RunContext>) -> ExpansionReport {
    let shared = context.shared.clone();
    let seed_id = shared.seed_id;
    let mut failures = Vec::new();

    match context.store.get(seed_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!("Seed document not found");
            failures.push(RunFailure::node(seed_id, "seed document not found"));
            return shared.report(RunState::Failed, failures);
        }
        Err(e) => {
            warn!(error = %e, "Seed lookup failed");
            failures.push(RunFailure::node(seed_id, e.to_string()));
            return shared.report(RunState::Failed, failures);
        }
    }

    shared.set_state(RunState::Expanding);
    info!(
        max_depth = shared.max_depth,
        concurrency = shared.concurrency,
        "Expansion started"
    );

    let mut queue: VecDeque<(DocumentId, u32)> = VecDeque::from([(seed_id, 0)]);
    let mut workers: JoinSet<NodeOutcome> = JoinSet::new();

    loop {
        if context.cancel.is_cancelled() {
            break;
        }
        while workers.len() < shared.concurrency {
            let Some((id, depth)) = queue.pop_front() else {
                break;
            };
            workers.spawn(expand_node(context.clone(), id, depth));
        }
        shared.progress.set_queued(queue.len());
        if workers.is_empty() {
            break;
        }

        tokio::select! {
            biased;
            _ = context.cancel.cancelled() => break,
            joined = workers.join_next() => match joined {
                Some(Ok(outcome)) => {
                    queue.extend(outcome.children);
                    failures.extend(outcome.failures);
                }
                Some(Err(e)) => failures.push(RunFailure {
                    node_id: None,
                    candidate: None,
                    reason: format!("worker failed: {}", e),
                }),
                None => break,
            },
        }
    }

    let cancelled = context.cancel.is_cancelled();
    if cancelled {
        info!(dropped = queue.len(), in_flight = workers.len(), "Expansion cancelled");
        queue.clear();
    }
    // In-flight workers observe the signal and stop at the next candidate
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(outcome) => failures.extend(outcome.failures),
            Err(e) => failures.push(RunFailure {
                node_id: None,
                candidate: None,
                reason: format!("worker failed: {}", e),
            }),
        }
    }
    shared.progress.set_queued(0);

    let state = if cancelled { RunState::Failed } else { RunState::Done };
    let report = shared.report(state, failures);
    info!(
        state = state.as_str(),
        nodes_created = report.nodes_created,
        nodes_reused = report.nodes_reused,
        edges_created = report.edges_created,
        nodes_expanded = report.nodes_expanded,
        failures = report.failures.len(),
        "Expansion finished"
    );
    report
}

/// Parse one node and materialize and link each of its citations
#[instrument(skip(context), fields(run_id = %context.shared.run_id))]
async fn expand_node(context: Arc<RunContext>, node_id: DocumentId, depth: u32) -> NodeOutcome {
    let mut outcome = NodeOutcome::default();
    let progress = &context.shared.progress;

    let node = match context.store.get(node_id).await {
        Ok(Some(node)) => node,
        Ok(None) => {
            outcome.failures.push(RunFailure::node(node_id, "document not found"));
            return outcome;
        }
        Err(e) => {
            warn!(error = %e, "Failed to load document");
            outcome.failures.push(RunFailure::node(node_id, e.to_string()));
            return outcome;
        }
    };

    let Some(text) = node.parseable_text() else {
        debug!("Stub document has nothing to parse");
        progress.node_skipped();
        return outcome;
    };
    let candidates = match context.parser.parse(text) {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!(error = %e, "Document rejected by parser");
            outcome.failures.push(RunFailure::node(node_id, e.to_string()));
            return outcome;
        }
    };
    progress.node_expanded();

    let child_depth = depth + 1;
    let mut parsed = 0;
    for candidate in candidates {
        if context.cancel.is_cancelled() {
            break;
        }
        parsed += 1;
        progress.candidate_parsed();

        let resolution = match context
            .resolver
            .resolve(&candidate, context.store.as_ref(), &context.in_flight)
            .await
        {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(raw = %candidate.raw_text, error = %e, "Resolution failed");
                outcome
                    .failures
                    .push(RunFailure::candidate(node_id, &candidate.raw_text, e.to_string()));
                continue;
            }
        };
        if let Resolution::Existing { rule, .. } = &resolution {
            record_resolution(rule.as_str());
        }

        let materialized = match context
            .coordinator
            .materialize(&candidate, &resolution, &context.cancel)
            .await
        {
            Ok(materialized) => materialized,
            Err(ExpansionError::Cancelled) => break,
            Err(e) => {
                warn!(raw = %candidate.raw_text, error = %e, "Materialization failed");
                outcome
                    .failures
                    .push(RunFailure::candidate(node_id, &candidate.raw_text, e.to_string()));
                continue;
            }
        };

        let target = materialized.node;
        if materialized.created {
            progress.node_created(target.is_stub());
        } else {
            progress.node_reused();
        }
        let is_new = match &resolution {
            Resolution::New { signature } => {
                context.in_flight.insert(signature.clone(), &target);
                true
            }
            Resolution::Existing { .. } => false,
        };

        let edge = EdgeDraft {
            source_id: node_id,
            target_id: target.id,
            raw_text: candidate.raw_text.clone(),
            context: candidate.context.clone(),
            depth: child_depth,
        };
        match context.store.add_edge(edge).await {
            Ok(Some(_)) => {
                progress.edge_created(child_depth);
                record_edge();
            }
            Ok(None) => debug!(raw = %candidate.raw_text, "Edge already recorded"),
            // the node exists either way; it is still expanded below
            Err(e) => {
                warn!(raw = %candidate.raw_text, error = %e, "Failed to record edge");
                outcome
                    .failures
                    .push(RunFailure::candidate(node_id, &candidate.raw_text, e.to_string()));
            }
        }

        if is_new && context.visited.insert(target.id) && child_depth < context.shared.max_depth {
            outcome.children.push((target.id, child_depth));
        }
    }

    record_candidates(parsed);
    debug!(candidates = parsed, children = outcome.children.len(), "Node expanded");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use refgraph_common::InMemoryGraphStore;

    fn controller(store: Arc<InMemoryGraphStore>) -> ExpansionController {
        ExpansionController::new(
            store,
            Arc::new(SourceGateway::new(Vec::new())),
            &AppConfig::default(),
        )
    }

    #[test]
    fn test_request_limits() {
        let config = ExpansionConfig::default();
        let (depth, workers) = ExpansionRequest::new(DocumentId::new())
            .limits(&config)
            .unwrap();
        assert_eq!(depth, config.default_max_depth);
        assert_eq!(workers, config.default_concurrency);

        let too_deep = ExpansionRequest::new(DocumentId::new()).with_max_depth(config.max_depth_limit + 1);
        assert!(matches!(too_deep.limits(&config), Err(ExpansionError::InvalidRequest(_))));

        let no_workers = ExpansionRequest::new(DocumentId::new()).with_concurrency(0);
        assert!(no_workers.limits(&config).is_err());
    }

    #[tokio::test]
    async fn test_missing_seed_fails_run() {
        let store = Arc::new(InMemoryGraphStore::new());
        let seed = DocumentId::new();
        let report = controller(store)
            .expand(ExpansionRequest::new(seed).with_max_depth(1))
            .await
            .unwrap();

        assert_eq!(report.state, RunState::Failed);
        assert!(!report.cancelled);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].node_id, Some(seed));
    }

    #[tokio::test]
    async fn test_handle_reports_after_join() {
        let store = Arc::new(InMemoryGraphStore::new());
        let handle = controller(store)
            .start(ExpansionRequest::new(DocumentId::new()))
            .unwrap();

        let report = handle.join().await.unwrap();
        assert!(handle.is_finished());
        assert_eq!(handle.report(), Some(report));
        assert!(!handle.cancel());
    }
}
