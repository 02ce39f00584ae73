//! End-to-end expansion runs against the in-memory store with scripted providers

use async_trait::async_trait;
use dashmap::DashMap;
use refgraph_common::{
    AppConfig, AppError, CitationEdge, ContentState, ContentUpgrade, CreateOutcome, DocumentDraft,
    DocumentId, DocumentNode, EdgeDraft, GraphStore, InMemoryGraphStore, Origin, ProviderKind,
    Signature,
};
use refgraph_expansion::{
    register_seed, AcquiredContent, AcquisitionQuery, CanonicalMetadata, ContentProvider,
    ExpansionController, ExpansionRequest, ProviderOutcome, RunState, SeedDocument,
    SourceGateway,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Clone)]
enum Shelf {
    Text(&'static str),
    Slow(&'static str, Duration),
    Hang(Arc<Notify>),
}

/// Returns content for the surnames it holds and misses everything else
struct LibraryProvider {
    shelf: HashMap<&'static str, Shelf>,
    calls: DashMap<String, usize>,
}

impl LibraryProvider {
    fn new(shelf: Vec<(&'static str, Shelf)>) -> Arc<Self> {
        Arc::new(Self {
            shelf: shelf.into_iter().collect(),
            calls: DashMap::new(),
        })
    }

    fn calls_for(&self, surname: &str) -> usize {
        self.calls.get(surname).map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl ContentProvider for LibraryProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SemanticScholar
    }

    async fn try_fetch(&self, query: &AcquisitionQuery) -> ProviderOutcome {
        let surname = query.surname.clone().unwrap_or_default().to_lowercase();
        *self.calls.entry(surname.clone()).or_insert(0) += 1;

        let text = match self.shelf.get(surname.as_str()) {
            None => return ProviderOutcome::Miss,
            Some(Shelf::Text(text)) => *text,
            Some(Shelf::Slow(text, delay)) => {
                tokio::time::sleep(*delay).await;
                *text
            }
            Some(Shelf::Hang(entered)) => {
                entered.notify_one();
                tokio::time::sleep(Duration::from_secs(300)).await;
                return ProviderOutcome::Miss;
            }
        };
        ProviderOutcome::Content(AcquiredContent {
            text: text.to_string(),
            metadata: CanonicalMetadata::default(),
            source_url: Some(format!("https://library.test/{}.pdf", surname)),
        })
    }
}

struct Harness {
    store: Arc<InMemoryGraphStore>,
    controller: ExpansionController,
}

impl Harness {
    fn new(provider: Arc<LibraryProvider>) -> Self {
        let store = Arc::new(InMemoryGraphStore::new());
        let gateway = SourceGateway::new(vec![(
            provider as Arc<dyn ContentProvider>,
            Duration::from_secs(600),
        )]);
        let controller = ExpansionController::new(store.clone(), Arc::new(gateway), &AppConfig::default());
        Self { store, controller }
    }

    async fn seed(&self, seed: SeedDocument) -> refgraph_common::DocumentId {
        register_seed(self.store.as_ref(), seed, &AppConfig::default().resolver)
            .await
            .unwrap()
            .node
            .id
    }

    fn nodes_with_surname(&self, surname: &str) -> usize {
        self.store
            .nodes()
            .iter()
            .filter(|n| n.surname.as_deref() == Some(surname))
            .count()
    }
}

fn seed_text(title: &str, content: &str) -> SeedDocument {
    SeedDocument {
        title: title.to_string(),
        authors: "Seed, A.".to_string(),
        year: Some(2022),
        content: content.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_smith_and_jones_single_level() {
    let provider = LibraryProvider::new(vec![(
        "jones",
        Shelf::Text("Jones et al. describe how citation graphs grow over time."),
    )]);
    let harness = Harness::new(provider);
    let seed = harness
        .seed(seed_text(
            "Expansion Seed Paper",
            "... as shown by Smith, J. (2020). ... Also Jones et al. (2019) found that ...",
        ))
        .await;

    let report = harness
        .controller
        .expand(ExpansionRequest::new(seed).with_max_depth(1))
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Done);
    assert!(!report.cancelled);
    assert_eq!(report.candidates_parsed, 2);
    assert_eq!(report.edges_created, 2);
    assert_eq!(report.nodes_created, 2);
    assert_eq!(report.stubs_created, 1);
    assert_eq!(report.nodes_expanded, 1);
    assert_eq!(report.max_depth_reached, 1);
    assert!(report.failures.is_empty());

    let edges = harness.store.edges_from(seed).await.unwrap();
    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|e| e.depth == 1));

    let nodes = harness.store.nodes();
    let jones = nodes.iter().find(|n| n.surname.as_deref() == Some("jones")).unwrap();
    assert_eq!(jones.content_state, ContentState::HasContent);
    assert_eq!(jones.origin, Origin::Acquired);
    assert_eq!(jones.acquisition_source, Some(ProviderKind::SemanticScholar));

    let smith = nodes.iter().find(|n| n.surname.as_deref() == Some("smith")).unwrap();
    assert!(smith.is_stub());
    assert_eq!(smith.origin, Origin::Acquired);
    assert!(smith.content.as_deref().unwrap().contains("Smith, J. (2020)"));
    assert_eq!(smith.year, Some(2020));
    assert_eq!(smith.title, "");
    assert_eq!(jones.year, Some(2019));
    assert_eq!(jones.title, "");
}

#[tokio::test]
async fn test_numbered_heading_does_not_hide_citations() {
    let provider = LibraryProvider::new(vec![(
        "jones",
        Shelf::Text("Jones et al. describe how citation graphs grow over time."),
    )]);
    let harness = Harness::new(provider.clone());
    let seed = harness
        .seed(seed_text(
            "Numbered Section Seed",
            "1. Introduction\n\
             Prior work by Smith, J. (2020) established the baseline.\n\
             Jones et al. (2019) extended it to graphs.",
        ))
        .await;

    let report = harness
        .controller
        .expand(ExpansionRequest::new(seed).with_max_depth(1))
        .await
        .unwrap();

    assert_eq!(report.candidates_parsed, 2);
    assert_eq!(report.edges_created, 2);
    assert_eq!(harness.nodes_with_surname("smith"), 1);
    assert_eq!(harness.nodes_with_surname("jones"), 1);
    assert_eq!(harness.nodes_with_surname("introduction"), 0);
    assert_eq!(provider.calls_for("introduction"), 0);
}

#[tokio::test]
async fn test_repeated_citation_yields_one_node_and_edge() {
    let harness = Harness::new(LibraryProvider::new(Vec::new()));
    let seed = harness
        .seed(seed_text(
            "Repetition Seed Paper",
            "Smith, J. (2020) said so. Smith, J. (2020) said it again.",
        ))
        .await;

    let report = harness
        .controller
        .expand(ExpansionRequest::new(seed).with_max_depth(1))
        .await
        .unwrap();

    assert_eq!(report.candidates_parsed, 2);
    assert_eq!(report.nodes_created, 1);
    assert_eq!(report.nodes_reused, 1);
    assert_eq!(report.edges_created, 1);
    assert_eq!(harness.store.node_count(), 2);
    assert_eq!(harness.store.edge_count(), 1);
}

#[tokio::test]
async fn test_depth_cap_links_but_does_not_expand() {
    let provider = LibraryProvider::new(vec![
        ("jones", Shelf::Text("Our method builds on Lee et al. (2015) directly.")),
        ("lee", Shelf::Text("Lee et al. cite Kim et al. (2012) for the original idea.")),
        ("kim", Shelf::Text("Kim et al. start from scratch.")),
    ]);
    let harness = Harness::new(provider.clone());
    let seed = harness
        .seed(seed_text("Depth Seed Paper", "We follow Jones et al. (2019) here."))
        .await;

    let report = harness
        .controller
        .expand(ExpansionRequest::new(seed).with_max_depth(2))
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.nodes_expanded, 2);
    assert_eq!(report.edges_created, 2);
    assert_eq!(report.max_depth_reached, 2);
    assert_eq!(harness.nodes_with_surname("lee"), 1);
    assert_eq!(harness.nodes_with_surname("kim"), 0);
    assert_eq!(provider.calls_for("kim"), 0);
}

#[tokio::test]
async fn test_cycle_terminates_and_expands_each_node_once() {
    let provider = LibraryProvider::new(vec![
        (
            "jones",
            Shelf::Text("See Seed, A. (2022). Graph Expansion In Practice. Also Lee et al. (2015) agrees."),
        ),
        (
            "lee",
            Shelf::Text("Lee et al. rely on Jones et al. (2019) and on Seed, A. (2022). Graph Expansion In Practice."),
        ),
    ]);
    let harness = Harness::new(provider.clone());
    let seed = harness
        .seed(seed_text(
            "Graph Expansion In Practice",
            "We follow Jones et al. (2019) here.",
        ))
        .await;

    let report = harness
        .controller
        .expand(ExpansionRequest::new(seed).with_max_depth(6).with_concurrency(2))
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.nodes_expanded, 3);
    assert_eq!(harness.store.node_count(), 3);
    assert_eq!(provider.calls_for("jones"), 1);
    assert_eq!(provider.calls_for("lee"), 1);

    let back_edges = harness
        .store
        .edges_from(harness.store.nodes().iter().find(|n| n.surname.as_deref() == Some("jones")).unwrap().id)
        .await
        .unwrap();
    assert!(back_edges.iter().any(|e| e.target_id == seed));
}

#[tokio::test]
async fn test_cancellation_keeps_completed_work() {
    let entered = Arc::new(Notify::new());
    let provider = LibraryProvider::new(vec![
        ("jones", Shelf::Text("Jones et al. describe citation graphs.")),
        ("smith", Shelf::Hang(entered.clone())),
    ]);
    let harness = Harness::new(provider);
    let seed = harness
        .seed(seed_text(
            "Cancellation Seed Paper",
            "Jones et al. (2019) came first. Smith, J. (2020) came second.",
        ))
        .await;

    let handle = harness
        .controller
        .start(ExpansionRequest::new(seed).with_max_depth(1).with_concurrency(1))
        .unwrap();
    entered.notified().await;
    assert!(handle.cancel());

    let report = handle.join().await.unwrap();
    assert_eq!(report.state, RunState::Failed);
    assert!(report.cancelled);
    assert_eq!(report.nodes_created, 1);
    assert_eq!(report.edges_created, 1);
    assert_eq!(harness.nodes_with_surname("smith"), 0);

    for node in harness.store.nodes() {
        assert!(node.content.as_deref().is_some_and(|c| !c.is_empty()));
        if node.content_state == ContentState::HasContent {
            assert_ne!(node.origin, Origin::Stub);
        }
    }
}

#[tokio::test]
async fn test_concurrent_runs_share_one_node_per_signature() {
    let provider = LibraryProvider::new(vec![(
        "jones",
        Shelf::Slow("Jones et al. describe citation graphs.", Duration::from_millis(100)),
    )]);
    let harness = Harness::new(provider.clone());
    let first = harness
        .seed(seed_text("First Concurrent Seed", "Both build on Jones et al. (2019)."))
        .await;
    let second = harness
        .seed(seed_text("Second Concurrent Seed", "Again Jones et al. (2019) matters."))
        .await;

    let a = harness
        .controller
        .start(ExpansionRequest::new(first).with_max_depth(1))
        .unwrap();
    let b = harness
        .controller
        .start(ExpansionRequest::new(second).with_max_depth(1))
        .unwrap();
    let (a, b) = tokio::join!(a.join(), b.join());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.nodes_created + b.nodes_created, 1);
    assert_eq!(a.nodes_reused + b.nodes_reused, 1);
    assert_eq!(harness.nodes_with_surname("jones"), 1);
    assert_eq!(provider.calls_for("jones"), 1);
    assert_eq!(a.edges_created + b.edges_created, 2);
}

#[tokio::test]
async fn test_stub_seed_is_skipped() {
    let harness = Harness::new(LibraryProvider::new(Vec::new()));
    let stub = harness
        .store
        .create_or_get(
            refgraph_common::Signature::new("author:doe:2001"),
            refgraph_common::DocumentDraft {
                title: "Unknown".into(),
                content: Some("placeholder".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .into_node();

    let report = harness
        .controller
        .expand(ExpansionRequest::new(stub.id).with_max_depth(2))
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.nodes_skipped, 1);
    assert_eq!(report.nodes_expanded, 0);
}

/// Delegates to the in-memory store but refuses edges out of one source
struct RejectingEdgeStore {
    inner: InMemoryGraphStore,
    rejected_source: std::sync::Mutex<Option<DocumentId>>,
}

#[async_trait]
impl GraphStore for RejectingEdgeStore {
    async fn find(&self, signature: &Signature) -> refgraph_common::Result<Option<DocumentNode>> {
        self.inner.find(signature).await
    }

    async fn get(&self, id: DocumentId) -> refgraph_common::Result<Option<DocumentNode>> {
        self.inner.get(id).await
    }

    async fn find_by_surname(&self, surname: &str) -> refgraph_common::Result<Vec<DocumentNode>> {
        self.inner.find_by_surname(surname).await
    }

    async fn create_or_get(
        &self,
        signature: Signature,
        draft: DocumentDraft,
    ) -> refgraph_common::Result<CreateOutcome> {
        self.inner.create_or_get(signature, draft).await
    }

    async fn attach_content(
        &self,
        id: DocumentId,
        upgrade: ContentUpgrade,
    ) -> refgraph_common::Result<DocumentNode> {
        self.inner.attach_content(id, upgrade).await
    }

    async fn add_edge(&self, edge: EdgeDraft) -> refgraph_common::Result<Option<CitationEdge>> {
        if *self.rejected_source.lock().unwrap() == Some(edge.source_id) {
            return Err(AppError::Internal {
                message: "edge write rejected".to_string(),
            });
        }
        self.inner.add_edge(edge).await
    }

    async fn edges_from(&self, id: DocumentId) -> refgraph_common::Result<Vec<CitationEdge>> {
        self.inner.edges_from(id).await
    }

    async fn edges_to(&self, id: DocumentId) -> refgraph_common::Result<Vec<CitationEdge>> {
        self.inner.edges_to(id).await
    }

    async fn ping(&self) -> refgraph_common::Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "rejecting-edges"
    }
}

#[tokio::test]
async fn test_failed_edge_write_still_expands_new_node() {
    let provider = LibraryProvider::new(vec![(
        "jones",
        Shelf::Text("Jones et al. build on the survey by Brown, K. (2015) to model growth."),
    )]);
    let store = Arc::new(RejectingEdgeStore {
        inner: InMemoryGraphStore::new(),
        rejected_source: std::sync::Mutex::new(None),
    });
    let gateway = SourceGateway::new(vec![(
        provider.clone() as Arc<dyn ContentProvider>,
        Duration::from_secs(600),
    )]);
    let controller = ExpansionController::new(store.clone(), Arc::new(gateway), &AppConfig::default());

    let seed = register_seed(
        store.as_ref(),
        seed_text("Edge Failure Seed", "Also Jones et al. (2019) found that graphs grow."),
        &AppConfig::default().resolver,
    )
    .await
    .unwrap()
    .node
    .id;
    *store.rejected_source.lock().unwrap() = Some(seed);

    let report = controller
        .expand(ExpansionRequest::new(seed).with_max_depth(2))
        .await
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].node_id, Some(seed));
    assert!(store.edges_from(seed).await.unwrap().is_empty());

    // jones lost its incoming edge but was still queued and parsed
    assert_eq!(report.nodes_expanded, 2);
    let jones = store
        .inner
        .nodes()
        .into_iter()
        .find(|n| n.surname.as_deref() == Some("jones"))
        .unwrap();
    let jones_edges = store.edges_from(jones.id).await.unwrap();
    assert_eq!(jones_edges.len(), 1);
    let brown = store.get(jones_edges[0].target_id).await.unwrap().unwrap();
    assert_eq!(brown.surname.as_deref(), Some("brown"));
    assert_eq!(jones_edges[0].depth, 2);
}
