//! Social-network mirror provider (ResearchGate publication search)

use super::http::{find_pdf_links, HttpFetcher};
use super::{AcquiredContent, AcquisitionQuery, CanonicalMetadata, ContentProvider, ProviderOutcome};
use async_trait::async_trait;
use refgraph_common::ProviderKind;
use tracing::{debug, instrument};

const DEFAULT_BASE_URL: &str = "https://www.researchgate.net";
pub(crate) const MAX_PDF_LINKS: usize = 3;

pub struct ResearchGateProvider {
    fetcher: HttpFetcher,
    base_url: String,
}

impl ResearchGateProvider {
    pub fn new(fetcher: HttpFetcher, base_url: Option<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn search_url(&self) -> String {
        format!("{}/search/publication", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ContentProvider for ResearchGateProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ResearchGate
    }

    #[instrument(skip(self, query), fields(provider = "research_gate"))]
    async fn try_fetch(&self, query: &AcquisitionQuery) -> ProviderOutcome {
        scrape_search(
            &self.fetcher,
            &self.search_url(),
            search_phrase(query, None),
        )
        .await
    }
}

/// `title author` plus an optional operator suffix
pub(crate) fn search_phrase(query: &AcquisitionQuery, suffix: Option<&str>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if !query.title.is_empty() {
        parts.push(&query.title);
    }
    if !query.author.is_empty() {
        parts.push(&query.author);
    }
    if let Some(suffix) = suffix {
        parts.push(suffix);
    }
    parts.join(" ")
}

/// Fetch a search results page and try the first PDF links it offers
pub(crate) async fn scrape_search(fetcher: &HttpFetcher, url: &str, phrase: String) -> ProviderOutcome {
    let page = match fetcher.fetch(url, &[("q", phrase)]).await {
        Ok(page) => page,
        Err(e) => return e.into(),
    };
    let html = String::from_utf8_lossy(&page.bytes);
    let links = find_pdf_links(&html, &page.final_url);
    debug!(provider = %fetcher.provider(), links = links.len(), "Scraped PDF links");

    match fetcher.first_document(&links, MAX_PDF_LINKS).await {
        Ok(Some((text, url))) => ProviderOutcome::Content(AcquiredContent {
            text,
            metadata: CanonicalMetadata::default(),
            source_url: Some(url),
        }),
        Ok(None) => ProviderOutcome::Miss,
        Err(e) => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_phrase() {
        let query = AcquisitionQuery {
            title: "Neural Machine Translation".into(),
            author: "Bahdanau, D.".into(),
            ..Default::default()
        };
        assert_eq!(search_phrase(&query, None), "Neural Machine Translation Bahdanau, D.");
        assert_eq!(
            search_phrase(&query, Some("filetype:pdf")),
            "Neural Machine Translation Bahdanau, D. filetype:pdf"
        );

        let author_only = AcquisitionQuery {
            author: "Bahdanau".into(),
            ..Default::default()
        };
        assert_eq!(search_phrase(&author_only, None), "Bahdanau");
    }
}
