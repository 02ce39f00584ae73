//! General web search provider (Google Scholar, `filetype:pdf` queries)

use super::http::HttpFetcher;
use super::research_gate::{scrape_search, search_phrase};
use super::{AcquisitionQuery, ContentProvider, ProviderOutcome};
use async_trait::async_trait;
use refgraph_common::ProviderKind;
use tracing::instrument;

const DEFAULT_BASE_URL: &str = "https://scholar.google.com/scholar";

pub struct GoogleScholarProvider {
    fetcher: HttpFetcher,
    base_url: String,
}

impl GoogleScholarProvider {
    pub fn new(fetcher: HttpFetcher, base_url: Option<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl ContentProvider for GoogleScholarProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GoogleScholar
    }

    #[instrument(skip(self, query), fields(provider = "google_scholar"))]
    async fn try_fetch(&self, query: &AcquisitionQuery) -> ProviderOutcome {
        let phrase = search_phrase(query, Some("filetype:pdf"));
        scrape_search(&self.fetcher, &self.base_url, phrase).await
    }
}
