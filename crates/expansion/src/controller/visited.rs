use dashmap::DashSet;
use refgraph_common::DocumentId;

/// Node identities already queued or expanded in one run
#[derive(Debug, Default)]
pub struct VisitedSet {
    ids: DashSet<DocumentId>,
}

impl VisitedSet {
    /// A set that already holds the seed
    pub fn with_seed(seed: DocumentId) -> Self {
        let ids = DashSet::new();
        ids.insert(seed);
        Self { ids }
    }

    /// Atomic check-and-insert; true when `id` was not visited yet
    pub fn insert(&self, id: DocumentId) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
