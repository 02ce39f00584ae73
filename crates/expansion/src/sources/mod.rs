//! Source gateway and external content providers
//!
//! Every provider implements [`ContentProvider`]; the [`SourceGateway`] tries
//! them in configured priority order and stops at the first one that returns
//! content. Provider failures never escape the gateway.

mod arxiv;
mod doi;
pub mod extract;
mod gateway;
mod google_scholar;
pub mod http;
mod research_gate;
mod semantic_scholar;

pub use arxiv::ArxivProvider;
pub use doi::DoiProvider;
pub use gateway::{AttemptOutcome, GatewayOutcome, ProviderAttempt, SourceGateway};
pub use google_scholar::GoogleScholarProvider;
pub use research_gate::ResearchGateProvider;
pub use semantic_scholar::SemanticScholarProvider;

use crate::errors::{ExpansionError, Result};
use crate::parser::CitationCandidate;
use crate::resolver::normalize::{jaccard, normalize_surname, normalize_title};
use async_trait::async_trait;
use http::HttpFetcher;
use refgraph_common::config::{AppConfig, ProviderConfig};
use refgraph_common::ProviderKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Bibliographic metadata used to look a document up
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionQuery {
    pub title: String,
    pub author: String,
    pub surname: Option<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
}

impl AcquisitionQuery {
    pub fn from_candidate(candidate: &CitationCandidate) -> Self {
        Self {
            title: candidate.title.trim().to_string(),
            author: candidate.author.trim().to_string(),
            surname: candidate.surname.clone(),
            year: candidate.year,
            doi: candidate.doi.clone(),
        }
    }

    /// A query needs at least a title or an author
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() && self.author.trim().is_empty() {
            return Err(ExpansionError::InvalidQuery(
                "query has neither title nor author".into(),
            ));
        }
        Ok(())
    }

    /// Free-text search string: title when known, else author and year
    pub fn search_terms(&self) -> String {
        if !self.title.is_empty() {
            return self.title.clone();
        }
        let author = self.surname.as_deref().unwrap_or(&self.author);
        match self.year {
            Some(year) => format!("{} {}", author, year),
            None => author.to_string(),
        }
    }
}

/// Canonical metadata reported by a provider; wins over parsed fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMetadata {
    pub title: Option<String>,
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub journal: Option<String>,
    pub abstract_text: Option<String>,
}

/// Normalized document text plus provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquiredContent {
    pub text: String,
    pub metadata: CanonicalMetadata,
    pub source_url: Option<String>,
}

/// Result of one provider attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    Content(AcquiredContent),
    Miss,
    Error(String),
}

/// One external source the gateway can try
#[async_trait]
pub trait ContentProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Try to retrieve the document described by `query`
    async fn try_fetch(&self, query: &AcquisitionQuery) -> ProviderOutcome;
}

/// Create a provider of the configured kind
pub fn build_provider(
    config: &ProviderConfig,
    client: reqwest::Client,
    app: &AppConfig,
) -> Arc<dyn ContentProvider> {
    let fetcher = HttpFetcher::new(client, config, &app.providers.http);
    let base_url = config.base_url.clone();
    let threshold = app.resolver.title_similarity_threshold;
    match config.kind {
        ProviderKind::Arxiv => Arc::new(ArxivProvider::new(fetcher, base_url, threshold)),
        ProviderKind::Doi => Arc::new(DoiProvider::new(
            fetcher,
            base_url,
            app.providers.http.unpaywall_email.clone(),
            threshold,
        )),
        ProviderKind::SemanticScholar => {
            Arc::new(SemanticScholarProvider::new(fetcher, base_url, threshold))
        }
        ProviderKind::ResearchGate => Arc::new(ResearchGateProvider::new(fetcher, base_url)),
        ProviderKind::GoogleScholar => Arc::new(GoogleScholarProvider::new(fetcher, base_url)),
    }
}

/// Whether a search hit plausibly is the queried document.
///
/// With a title the normalized titles must be similar; without one the
/// queried surname must appear among the hit's authors and the years agree.
pub(crate) fn is_plausible_match(
    query: &AcquisitionQuery,
    title: &str,
    authors: &[String],
    year: Option<i32>,
    threshold: f64,
) -> bool {
    if !query.title.is_empty() {
        let (wanted, found) = (normalize_title(&query.title), normalize_title(title));
        return !found.is_empty() && (wanted == found || jaccard(&wanted, &found) >= threshold);
    }

    let Some(surname) = query.surname.as_deref().map(normalize_surname) else {
        return false;
    };
    let author_hit = authors.iter().any(|author| {
        author
            .split(|c: char| c.is_whitespace() || c == ',')
            .any(|word| normalize_surname(word) == surname)
    });
    author_hit && (query.year.is_none() || year == query.year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_validation() {
        let empty = AcquisitionQuery::default();
        assert!(matches!(empty.validate(), Err(ExpansionError::InvalidQuery(_))));

        let author_only = AcquisitionQuery {
            author: "Smith, J.".into(),
            surname: Some("Smith".into()),
            year: Some(2020),
            ..Default::default()
        };
        assert!(author_only.validate().is_ok());
        assert_eq!(author_only.search_terms(), "Smith 2020");
    }

    #[test]
    fn test_plausible_match() {
        let query = AcquisitionQuery {
            title: "Attention Is All You Need".into(),
            author: "Vaswani et al.".into(),
            surname: Some("Vaswani".into()),
            year: Some(2017),
            doi: None,
        };
        assert!(is_plausible_match(&query, "Attention is all you need.", &[], None, 0.8));
        assert!(!is_plausible_match(&query, "Attention Is Not Explanation", &[], None, 0.8));

        let by_author = AcquisitionQuery {
            title: String::new(),
            ..query
        };
        let authors = vec!["Ashish Vaswani".to_string(), "Noam Shazeer".to_string()];
        assert!(is_plausible_match(&by_author, "", &authors, Some(2017), 0.8));
        assert!(!is_plausible_match(&by_author, "", &authors, Some(2018), 0.8));
    }

    #[test]
    fn test_build_provider_kinds() {
        let app = AppConfig::default();
        let client = reqwest::Client::new();
        for source in &app.providers.sources {
            let provider = build_provider(source, client.clone(), &app);
            assert_eq!(provider.kind(), source.kind);
        }
    }
}
