//! Acquisition coordinator
//!
//! Turns a resolved candidate into a document node. Existing resolutions are
//! returned as stored; new ones go through the source gateway under a
//! per-signature single-flight lock and end up either with content or as a
//! stub carrying a readable placeholder.

use crate::cancel::CancelSignal;
use crate::errors::{ExpansionError, Result};
use crate::parser::CitationCandidate;
use crate::resolver::normalize::normalize_surname;
use crate::resolver::Resolution;
use crate::sources::{AcquiredContent, AcquisitionQuery, GatewayOutcome, ProviderAttempt, SourceGateway};
use dashmap::DashMap;
use refgraph_common::errors::AppError;
use refgraph_common::metrics::record_node;
use refgraph_common::{
    ContentState, ContentUpgrade, CreateOutcome, DocumentDraft, DocumentNode, GraphStore, Origin,
    ProviderKind, Signature,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// A node produced for one candidate
#[derive(Debug, Clone)]
pub struct Materialized {
    pub node: DocumentNode,
    /// This call inserted the node
    pub created: bool,
    /// Provider calls made on behalf of this candidate
    pub attempts: Vec<ProviderAttempt>,
}

impl Materialized {
    fn reused(node: DocumentNode) -> Self {
        Self {
            node,
            created: false,
            attempts: Vec::new(),
        }
    }
}

pub struct AcquisitionCoordinator {
    store: Arc<dyn GraphStore>,
    gateway: Arc<SourceGateway>,
    locks: DashMap<Signature, Arc<Mutex<()>>>,
}

impl AcquisitionCoordinator {
    pub fn new(store: Arc<dyn GraphStore>, gateway: Arc<SourceGateway>) -> Self {
        Self {
            store,
            gateway,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn gateway(&self) -> &SourceGateway {
        &self.gateway
    }

    /// Produce the node for a resolved candidate
    #[instrument(skip_all, fields(raw = %candidate.raw_text))]
    pub async fn materialize(
        &self,
        candidate: &CitationCandidate,
        resolution: &Resolution,
        cancel: &CancelSignal,
    ) -> Result<Materialized> {
        match resolution {
            Resolution::Existing { id, .. } => {
                let node = self
                    .store
                    .get(*id)
                    .await?
                    .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })?;
                record_node("reused");
                Ok(Materialized::reused(node))
            }
            Resolution::New { signature } => {
                let lock = self
                    .locks
                    .entry(signature.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone();

                let result = {
                    let _guard = lock.lock().await;
                    self.acquire(candidate, signature, cancel).await
                };

                drop(lock);
                self.locks
                    .remove_if(signature, |_, lock| Arc::strong_count(lock) == 1);
                result
            }
        }
    }

    /// Runs with the signature lock held
    async fn acquire(
        &self,
        candidate: &CitationCandidate,
        signature: &Signature,
        cancel: &CancelSignal,
    ) -> Result<Materialized> {
        if let Some(node) = self.store.find(signature).await? {
            debug!(document_id = %node.id, "Signature materialized concurrently");
            record_node("reused");
            return Ok(Materialized::reused(node));
        }
        if cancel.is_cancelled() {
            return Err(ExpansionError::Cancelled);
        }

        let query = AcquisitionQuery::from_candidate(candidate);
        let (draft, attempts) = match self.gateway.acquire(&query, cancel).await? {
            GatewayOutcome::Content {
                content,
                provider,
                attempts,
            } => (content_draft(candidate, content, provider), attempts),
            GatewayOutcome::NotFound { attempts } => {
                let origin = if self.gateway.is_empty() {
                    Origin::Stub
                } else {
                    Origin::Acquired
                };
                (stub_draft(candidate, origin), attempts)
            }
            GatewayOutcome::Cancelled { .. } => return Err(ExpansionError::Cancelled),
        };
        if cancel.is_cancelled() {
            return Err(ExpansionError::Cancelled);
        }

        let upgrade = ContentUpgrade::from_draft(&draft);
        let (node, created) = match self.store.create_or_get(signature.clone(), draft).await? {
            CreateOutcome::Created(node) => (node, true),
            CreateOutcome::Existing(node) => match upgrade {
                Some(upgrade) if node.is_stub() => {
                    (self.store.attach_content(node.id, upgrade).await?, false)
                }
                _ => (node, false),
            },
        };

        record_node(match (created, node.content_state) {
            (false, _) => "reused",
            (true, ContentState::HasContent) => "created",
            (true, ContentState::Stub) => "stub",
        });
        info!(
            document_id = %node.id,
            state = node.content_state.as_str(),
            source = node.acquisition_source.map(|p| p.as_str()).unwrap_or("none"),
            created,
            "Citation materialized"
        );

        Ok(Materialized {
            node,
            created,
            attempts,
        })
    }
}

/// Node attributes when a provider returned content; its metadata wins
fn content_draft(
    candidate: &CitationCandidate,
    content: AcquiredContent,
    provider: ProviderKind,
) -> DocumentDraft {
    let metadata = content.metadata;
    DocumentDraft {
        title: metadata
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| candidate.title.clone()),
        authors: metadata
            .authors
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| candidate.author.clone()),
        surname: candidate.surname.as_deref().map(normalize_surname),
        year: metadata.year.or(candidate.year),
        abstract_text: metadata.abstract_text,
        content: Some(content.text),
        content_state: ContentState::HasContent,
        origin: Origin::Acquired,
        acquisition_source: Some(provider),
        doi: metadata.doi.or_else(|| candidate.doi.clone()),
        journal: metadata.journal,
    }
}

fn stub_draft(candidate: &CitationCandidate, origin: Origin) -> DocumentDraft {
    DocumentDraft {
        title: candidate.title.clone(),
        authors: candidate.author.clone(),
        surname: candidate.surname.as_deref().map(normalize_surname),
        year: candidate.year,
        abstract_text: None,
        content: Some(placeholder_text(candidate)),
        content_state: ContentState::Stub,
        origin,
        acquisition_source: None,
        doi: candidate.doi.clone(),
        journal: None,
    }
}

/// Deterministic stand-in content for a document no provider could supply
pub fn placeholder_text(candidate: &CitationCandidate) -> String {
    let mut lines = vec![
        "Unresolved citation: the full text could not be retrieved from any source.".to_string(),
        format!("Citation: {}", candidate.raw_text.trim()),
    ];
    if !candidate.title.is_empty() {
        lines.push(format!("Title: {}", candidate.title));
    }
    lines.push(format!(
        "Author: {}",
        if candidate.author.is_empty() { "unknown" } else { &candidate.author }
    ));
    lines.push(format!(
        "Year: {}",
        candidate
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "unknown".into())
    ));
    if let Some(doi) = &candidate.doi {
        lines.push(format!("DOI: {}", doi));
    }
    if !candidate.context.trim().is_empty() {
        lines.push(format!("Context: {}", candidate.context.trim()));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelHandle;
    use crate::parser::{CitationFamily, ConfidenceSignals};
    use crate::resolver::MatchRule;
    use crate::sources::{CanonicalMetadata, ContentProvider, ProviderOutcome};
    use async_trait::async_trait;
    use refgraph_common::InMemoryGraphStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingProvider {
        outcome: ProviderOutcome,
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentProvider for CountingProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::SemanticScholar
        }

        async fn try_fetch(&self, _query: &AcquisitionQuery) -> ProviderOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.outcome.clone()
        }
    }

    fn provider(outcome: ProviderOutcome, delay: Duration) -> Arc<CountingProvider> {
        Arc::new(CountingProvider {
            outcome,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn coordinator(
        providers: &[Arc<CountingProvider>],
    ) -> (AcquisitionCoordinator, Arc<InMemoryGraphStore>) {
        let store = Arc::new(InMemoryGraphStore::new());
        let gateway = SourceGateway::new(
            providers
                .iter()
                .map(|p| (p.clone() as Arc<dyn ContentProvider>, Duration::from_secs(5)))
                .collect(),
        );
        (
            AcquisitionCoordinator::new(store.clone(), Arc::new(gateway)),
            store,
        )
    }

    fn candidate() -> CitationCandidate {
        CitationCandidate {
            raw_text: "Jones et al. (2019)".into(),
            author: "Jones et al.".into(),
            surname: Some("Jones".into()),
            year: Some(2019),
            title: String::new(),
            doi: None,
            context: "As shown by Jones et al. (2019), graphs grow.".into(),
            family: CitationFamily::EtAl,
            position: 0,
            signals: ConfidenceSignals::default(),
        }
    }

    fn new_resolution() -> Resolution {
        Resolution::New {
            signature: Signature::new("author:jones:2019"),
        }
    }

    fn content(text: &str) -> ProviderOutcome {
        ProviderOutcome::Content(AcquiredContent {
            text: text.into(),
            metadata: CanonicalMetadata {
                title: Some("Graph Growth Dynamics".into()),
                ..Default::default()
            },
            source_url: Some("https://example.org/jones.pdf".into()),
        })
    }

    #[tokio::test]
    async fn test_content_node() {
        let p = provider(content("Full text of the Jones paper."), Duration::ZERO);
        let (coordinator, store) = coordinator(&[p]);

        let result = coordinator
            .materialize(&candidate(), &new_resolution(), &CancelSignal::never())
            .await
            .unwrap();

        assert!(result.created);
        assert_eq!(result.node.content_state, ContentState::HasContent);
        assert_eq!(result.node.origin, Origin::Acquired);
        assert_eq!(result.node.acquisition_source, Some(ProviderKind::SemanticScholar));
        assert_eq!(result.node.title, "Graph Growth Dynamics");
        assert_eq!(result.node.surname.as_deref(), Some("jones"));
        assert_eq!(store.node_count(), 1);
    }

    #[tokio::test]
    async fn test_not_found_gives_stub_with_placeholder() {
        let p = provider(ProviderOutcome::Miss, Duration::ZERO);
        let (coordinator, _store) = coordinator(&[p]);

        let result = coordinator
            .materialize(&candidate(), &new_resolution(), &CancelSignal::never())
            .await
            .unwrap();

        let node = result.node;
        assert!(node.is_stub());
        assert_eq!(node.origin, Origin::Acquired);
        let text = node.content.unwrap();
        assert!(text.contains("Jones et al. (2019)"));
        assert!(text.contains("Year: 2019"));
        assert!(text.contains("graphs grow"));
        assert_eq!(text, placeholder_text(&candidate()));
    }

    #[tokio::test]
    async fn test_no_providers_gives_stub_origin() {
        let (coordinator, _store) = coordinator(&[]);
        let result = coordinator
            .materialize(&candidate(), &new_resolution(), &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(result.node.origin, Origin::Stub);
        assert!(result.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_existing_resolution_skips_gateway() {
        let p = provider(content("unused"), Duration::ZERO);
        let (coordinator, store) = coordinator(&[p.clone()]);
        let existing = store
            .create_or_get(
                Signature::new("title:graph growth dynamics"),
                DocumentDraft {
                    title: "Graph Growth Dynamics".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .into_node();

        let resolution = Resolution::Existing {
            id: existing.id,
            rule: MatchRule::ExactTitle,
        };
        let result = coordinator
            .materialize(&candidate(), &resolution, &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(result.node, existing);
        assert!(!result.created);
        assert_eq!(p.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_flight_per_signature() {
        let p = provider(content("Full text."), Duration::from_millis(50));
        let (coordinator, store) = coordinator(&[p.clone()]);
        let coordinator = Arc::new(coordinator);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    coordinator
                        .materialize(&candidate(), &new_resolution(), &CancelSignal::never())
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut ids = Vec::new();
        let mut created = 0;
        for task in tasks {
            let result = task.await.unwrap();
            created += result.created as usize;
            ids.push(result.node.id);
        }

        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(created, 1);
        assert_eq!(store.node_count(), 1);
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);
        assert!(coordinator.locks.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_acquisition_creates_nothing() {
        let p = provider(content("late"), Duration::from_secs(10));
        let (coordinator, store) = coordinator(&[p]);
        let handle = CancelHandle::new();
        let signal = handle.signal();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        let result = coordinator
            .materialize(&candidate(), &new_resolution(), &signal)
            .await;
        assert!(matches!(result, Err(ExpansionError::Cancelled)));
        assert_eq!(store.node_count(), 0);
    }
}
