//! Academic search index provider (Semantic Scholar Graph API)

use super::http::HttpFetcher;
use super::{
    is_plausible_match, AcquiredContent, AcquisitionQuery, CanonicalMetadata, ContentProvider,
    ProviderOutcome,
};
use async_trait::async_trait;
use refgraph_common::ProviderKind;
use serde::Deserialize;
use tracing::{debug, instrument};

const DEFAULT_BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";
const FIELDS: &str = "paperId,title,authors,year,abstract,venue,externalIds,openAccessPdf";
const SEARCH_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Paper>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Paper {
    pub paper_id: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<Author>,
    pub year: Option<i32>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub venue: Option<String>,
    pub external_ids: Option<ExternalIds>,
    pub open_access_pdf: Option<OpenAccessPdf>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Author {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ExternalIds {
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OpenAccessPdf {
    pub url: Option<String>,
}

impl Paper {
    fn author_names(&self) -> Vec<String> {
        self.authors.iter().filter_map(|a| a.name.clone()).collect()
    }

    fn pdf_url(&self) -> Option<&str> {
        self.open_access_pdf
            .as_ref()
            .and_then(|pdf| pdf.url.as_deref())
            .filter(|url| !url.is_empty())
    }

    fn metadata(&self) -> CanonicalMetadata {
        let authors = self.author_names();
        CanonicalMetadata {
            title: self.title.clone(),
            authors: (!authors.is_empty()).then(|| authors.join(", ")),
            year: self.year,
            doi: self.external_ids.as_ref().and_then(|ids| ids.doi.clone()),
            journal: self.venue.clone().filter(|v| !v.is_empty()),
            abstract_text: self.abstract_text.clone(),
        }
    }
}

pub struct SemanticScholarProvider {
    fetcher: HttpFetcher,
    base_url: String,
    title_threshold: f64,
}

impl SemanticScholarProvider {
    pub fn new(fetcher: HttpFetcher, base_url: Option<String>, title_threshold: f64) -> Self {
        Self {
            fetcher,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            title_threshold,
        }
    }

    async fn candidates(&self, query: &AcquisitionQuery) -> Result<Vec<Paper>, ProviderOutcome> {
        if let Some(doi) = query.doi.as_deref() {
            let url = format!("{}/paper/DOI:{}", self.base_url, doi);
            match self
                .fetcher
                .get_json::<Paper>(&url, &[("fields", FIELDS.to_string())])
                .await
            {
                Ok(paper) => return Ok(vec![paper]),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        let terms = match query.surname.as_deref() {
            Some(surname) if !query.title.is_empty() => format!("{} {}", query.title, surname),
            _ => query.search_terms(),
        };
        let params = [
            ("query", terms),
            ("limit", SEARCH_LIMIT.to_string()),
            ("fields", FIELDS.to_string()),
        ];
        let url = format!("{}/paper/search", self.base_url);
        self.fetcher
            .get_json::<SearchResponse>(&url, &params)
            .await
            .map(|response| response.data)
            .map_err(ProviderOutcome::from)
    }
}

#[async_trait]
impl ContentProvider for SemanticScholarProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SemanticScholar
    }

    #[instrument(skip(self, query), fields(provider = "semantic_scholar"))]
    async fn try_fetch(&self, query: &AcquisitionQuery) -> ProviderOutcome {
        let papers = match self.candidates(query).await {
            Ok(papers) => papers,
            Err(outcome) => return outcome,
        };

        let Some(paper) = select_paper(papers, query, self.title_threshold) else {
            return ProviderOutcome::Miss;
        };
        let Some(pdf_url) = paper.pdf_url().map(str::to_string) else {
            return ProviderOutcome::Miss;
        };
        debug!(
            paper_id = paper.paper_id.as_deref().unwrap_or("unknown"),
            url = %pdf_url,
            "Selected open access paper"
        );

        match self.fetcher.download_document(&pdf_url).await {
            Ok(Some(text)) => ProviderOutcome::Content(AcquiredContent {
                text,
                metadata: paper.metadata(),
                source_url: Some(pdf_url),
            }),
            Ok(None) => ProviderOutcome::Miss,
            Err(e) => e.into(),
        }
    }
}

/// First plausible paper that has an open access PDF; a DOI hit is trusted
fn select_paper(papers: Vec<Paper>, query: &AcquisitionQuery, threshold: f64) -> Option<Paper> {
    let by_doi = query.doi.is_some() && papers.len() == 1;
    papers.into_iter().find(|paper| {
        paper.pdf_url().is_some()
            && (by_doi
                || is_plausible_match(
                    query,
                    paper.title.as_deref().unwrap_or_default(),
                    &paper.author_names(),
                    paper.year,
                    threshold,
                ))
    })
}
