//! Depth-bounded reference graph around one document

use super::GraphStore;
use crate::errors::Result;
use crate::models::{CitationEdge, ContentState, DocumentId, DocumentNode};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

/// A node of an exported graph with its distance from the root
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub node: DocumentNode,
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStatistics {
    pub nodes: usize,
    pub edges: usize,
    pub with_content: usize,
    pub stubs: usize,
    /// Largest node distance from the root
    pub deepest: u32,
}

/// Nodes reachable from `root` over outgoing edges within `max_depth` hops
#[derive(Debug, Clone)]
pub struct ReferenceGraph {
    pub root: DocumentId,
    pub max_depth: u32,
    /// Breadth-first order, root first
    pub nodes: Vec<GraphNode>,
    /// Edges whose both ends are in `nodes`
    pub edges: Vec<CitationEdge>,
    pub statistics: GraphStatistics,
}

/// Walk outgoing edges breadth-first from `root`. `None` when the root does not exist.
pub async fn reference_graph(
    store: &dyn GraphStore,
    root: DocumentId,
    max_depth: u32,
) -> Result<Option<ReferenceGraph>> {
    let Some(root_node) = store.get(root).await? else {
        return Ok(None);
    };

    let mut visited = HashSet::from([root]);
    let mut queue = VecDeque::from([(root, 0u32)]);
    let mut nodes = vec![GraphNode { node: root_node, depth: 0 }];
    let mut edges = Vec::new();

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for edge in store.edges_from(current).await? {
            if visited.insert(edge.target_id) {
                match store.get(edge.target_id).await? {
                    Some(node) => {
                        nodes.push(GraphNode { node, depth: depth + 1 });
                        queue.push_back((edge.target_id, depth + 1));
                    }
                    None => {
                        tracing::warn!(
                            edge_id = %edge.id,
                            target = %edge.target_id,
                            "Edge points at a missing node"
                        );
                        continue;
                    }
                }
            }
            edges.push(edge);
        }
    }

    // edges to targets that turned out to be missing
    let present: HashSet<DocumentId> = nodes.iter().map(|n| n.node.id).collect();
    edges.retain(|edge| present.contains(&edge.target_id));

    let statistics = GraphStatistics {
        nodes: nodes.len(),
        edges: edges.len(),
        with_content: nodes
            .iter()
            .filter(|n| n.node.content_state == ContentState::HasContent)
            .count(),
        stubs: nodes.iter().filter(|n| n.node.is_stub()).count(),
        deepest: nodes.iter().map(|n| n.depth).max().unwrap_or(0),
    };

    Ok(Some(ReferenceGraph {
        root,
        max_depth,
        nodes,
        edges,
        statistics,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InMemoryGraphStore;
    use crate::models::{DocumentDraft, EdgeDraft, Signature};

    async fn node(store: &InMemoryGraphStore, key: &str, content: Option<&str>) -> DocumentNode {
        store
            .create_or_get(
                Signature::new(key),
                DocumentDraft {
                    title: key.to_uppercase(),
                    content: content.map(str::to_string),
                    content_state: if content.is_some() {
                        ContentState::HasContent
                    } else {
                        ContentState::Stub
                    },
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .into_node()
    }

    async fn cite(store: &InMemoryGraphStore, from: &DocumentNode, to: &DocumentNode) {
        store
            .add_edge(EdgeDraft {
                source_id: from.id,
                target_id: to.id,
                raw_text: format!("{} cites {}", from.title, to.title),
                context: String::new(),
                depth: 1,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_graph_respects_depth_and_cycles() {
        let store = InMemoryGraphStore::new();
        let a = node(&store, "a", Some("seed text")).await;
        let b = node(&store, "b", Some("body")).await;
        let c = node(&store, "c", None).await;
        let d = node(&store, "d", None).await;
        cite(&store, &a, &b).await;
        cite(&store, &b, &c).await;
        cite(&store, &c, &d).await;
        cite(&store, &c, &a).await;

        let graph = reference_graph(&store, a.id, 2).await.unwrap().unwrap();
        let ids: Vec<DocumentId> = graph.nodes.iter().map(|n| n.node.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.statistics.deepest, 2);

        // the back edge c -> a stays inside the graph once c is expanded
        let graph = reference_graph(&store, a.id, 3).await.unwrap().unwrap();
        assert_eq!(graph.statistics.nodes, 4);
        assert_eq!(graph.statistics.edges, 4);
    }

    #[tokio::test]
    async fn test_graph_statistics_count_stubs() {
        let store = InMemoryGraphStore::new();
        let a = node(&store, "a", Some("seed text")).await;
        let b = node(&store, "b", None).await;
        cite(&store, &a, &b).await;

        let graph = reference_graph(&store, a.id, 1).await.unwrap().unwrap();
        assert_eq!(graph.statistics.with_content, 1);
        assert_eq!(graph.statistics.stubs, 1);

        let root_only = reference_graph(&store, a.id, 0).await.unwrap().unwrap();
        assert_eq!(root_only.nodes.len(), 1);
        assert!(root_only.edges.is_empty());
    }

    #[tokio::test]
    async fn test_missing_root() {
        let store = InMemoryGraphStore::new();
        assert!(reference_graph(&store, DocumentId::new(), 2).await.unwrap().is_none());
    }
}
