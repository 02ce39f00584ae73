//! DOI resolver provider
//!
//! Uses the candidate's DOI or discovers one through a Crossref
//! bibliographic query, then looks for a PDF via Unpaywall (when a contact
//! email is configured), Crossref `link` entries and finally the DOI landing
//! page. Crossref metadata is reported as canonical.

use super::extract::{html_to_text, normalize_text};
use super::http::{find_pdf_links, HttpFetcher};
use super::{
    is_plausible_match, AcquiredContent, AcquisitionQuery, CanonicalMetadata, ContentProvider,
    ProviderOutcome,
};
use async_trait::async_trait;
use refgraph_common::ProviderKind;
use serde::Deserialize;
use tracing::{debug, instrument};

const DEFAULT_BASE_URL: &str = "https://api.crossref.org";
const UNPAYWALL_URL: &str = "https://api.unpaywall.org/v2";
const RESOLVER_URL: &str = "https://doi.org";
const SEARCH_ROWS: usize = 5;
const MAX_PDF_LINKS: usize = 3;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    message: T,
}

#[derive(Debug, Deserialize)]
struct WorkList {
    #[serde(default)]
    items: Vec<CrossrefWork>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct CrossrefWork {
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    #[serde(default)]
    pub title: Vec<String>,
    #[serde(default)]
    pub author: Vec<CrossrefAuthor>,
    pub issued: Option<CrossrefDate>,
    #[serde(rename = "container-title", default)]
    pub container_title: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub link: Vec<CrossrefLink>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct CrossrefAuthor {
    pub given: Option<String>,
    pub family: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct CrossrefDate {
    #[serde(rename = "date-parts", default)]
    pub date_parts: Vec<Vec<Option<i32>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CrossrefLink {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "content-type")]
    pub content_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UnpaywallRecord {
    best_oa_location: Option<OaLocation>,
    #[serde(default)]
    oa_locations: Vec<OaLocation>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    url_for_pdf: Option<String>,
}

impl CrossrefWork {
    fn title(&self) -> &str {
        self.title.first().map(String::as_str).unwrap_or_default()
    }

    fn author_names(&self) -> Vec<String> {
        self.author
            .iter()
            .filter_map(|a| match (&a.given, &a.family, &a.name) {
                (Some(given), Some(family), _) => Some(format!("{} {}", given, family)),
                (None, Some(family), _) => Some(family.clone()),
                (_, None, Some(name)) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn year(&self) -> Option<i32> {
        self.issued
            .as_ref()
            .and_then(|d| d.date_parts.first())
            .and_then(|parts| parts.first().copied().flatten())
    }

    fn pdf_links(&self) -> impl Iterator<Item = &str> {
        self.link
            .iter()
            .filter(|l| {
                l.content_type.as_deref() == Some("application/pdf")
                    || l.url.to_ascii_lowercase().ends_with(".pdf")
            })
            .map(|l| l.url.as_str())
    }

    pub(crate) fn metadata(&self) -> CanonicalMetadata {
        let authors = self.author_names();
        CanonicalMetadata {
            title: self.title.first().cloned(),
            authors: (!authors.is_empty()).then(|| authors.join(", ")),
            year: self.year(),
            doi: self.doi.clone(),
            journal: self.container_title.first().cloned(),
            abstract_text: self
                .abstract_text
                .as_deref()
                .map(|a| normalize_text(&html_to_text(a)))
                .filter(|a| !a.is_empty()),
        }
    }
}

pub struct DoiProvider {
    fetcher: HttpFetcher,
    base_url: String,
    unpaywall_email: Option<String>,
    title_threshold: f64,
}

impl DoiProvider {
    pub fn new(
        fetcher: HttpFetcher,
        base_url: Option<String>,
        unpaywall_email: Option<String>,
        title_threshold: f64,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            unpaywall_email,
            title_threshold,
        }
    }

    /// Crossref record for a known DOI; `None` when Crossref has none
    async fn lookup(&self, doi: &str) -> Result<Option<CrossrefWork>, ProviderOutcome> {
        let url = format!("{}/works/{}", self.base_url, doi);
        match self.fetcher.get_json::<Envelope<CrossrefWork>>(&url, &[]).await {
            Ok(envelope) => Ok(Some(envelope.message)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Year-filtered bibliographic search, keeping the first plausible hit
    async fn discover(&self, query: &AcquisitionQuery) -> Result<Option<CrossrefWork>, ProviderOutcome> {
        let mut params = vec![
            ("query.bibliographic", bibliographic_terms(query)),
            ("rows", SEARCH_ROWS.to_string()),
        ];
        if let Some(year) = query.year {
            params.push((
                "filter",
                format!("from-pub-date:{}-01-01,until-pub-date:{}-12-31", year, year),
            ));
        }

        let url = format!("{}/works", self.base_url);
        let list = self
            .fetcher
            .get_json::<Envelope<WorkList>>(&url, &params)
            .await
            .map_err(ProviderOutcome::from)?;

        Ok(list.message.items.into_iter().find(|work| {
            work.doi.is_some()
                && is_plausible_match(
                    query,
                    work.title(),
                    &work.author_names(),
                    work.year(),
                    self.title_threshold,
                )
        }))
    }

    async fn unpaywall_links(&self, doi: &str) -> Vec<String> {
        let Some(email) = &self.unpaywall_email else {
            return Vec::new();
        };
        let url = format!("{}/{}", UNPAYWALL_URL, doi);
        match self
            .fetcher
            .get_json::<UnpaywallRecord>(&url, &[("email", email.clone())])
            .await
        {
            Ok(record) => unpaywall_pdf_links(record),
            Err(e) => {
                debug!(doi, error = %e, "Unpaywall lookup failed");
                Vec::new()
            }
        }
    }

    async fn landing_page_links(&self, doi: &str) -> Vec<String> {
        let url = format!("{}/{}", RESOLVER_URL, doi);
        match self.fetcher.fetch(&url, &[]).await {
            Ok(page) => {
                let html = String::from_utf8_lossy(&page.bytes);
                find_pdf_links(&html, &page.final_url)
            }
            Err(e) => {
                debug!(doi, error = %e, "DOI landing page unavailable");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl ContentProvider for DoiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Doi
    }

    #[instrument(skip(self, query), fields(provider = "doi"))]
    async fn try_fetch(&self, query: &AcquisitionQuery) -> ProviderOutcome {
        let work = match query.doi.as_deref() {
            Some(doi) => match self.lookup(doi).await {
                Ok(Some(work)) => work,
                Ok(None) => CrossrefWork {
                    doi: Some(doi.to_string()),
                    ..Default::default()
                },
                Err(outcome) => return outcome,
            },
            None => match self.discover(query).await {
                Ok(Some(work)) => work,
                Ok(None) => return ProviderOutcome::Miss,
                Err(outcome) => return outcome,
            },
        };
        let Some(doi) = work.doi.clone() else {
            return ProviderOutcome::Miss;
        };

        let mut links = self.unpaywall_links(&doi).await;
        for link in work.pdf_links() {
            push_unique(&mut links, link.to_string());
        }
        for link in self.landing_page_links(&doi).await {
            push_unique(&mut links, link);
        }
        debug!(doi = %doi, links = links.len(), "Candidate PDF links");

        match self.fetcher.first_document(&links, links.len().min(MAX_PDF_LINKS * 2)).await {
            Ok(Some((text, url))) => ProviderOutcome::Content(AcquiredContent {
                text,
                metadata: work.metadata(),
                source_url: Some(url),
            }),
            Ok(None) => ProviderOutcome::Miss,
            Err(e) => e.into(),
        }
    }
}

fn bibliographic_terms(query: &AcquisitionQuery) -> String {
    [query.title.as_str(), query.author.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

fn unpaywall_pdf_links(record: UnpaywallRecord) -> Vec<String> {
    let mut links = Vec::new();
    for location in record.best_oa_location.into_iter().chain(record.oa_locations) {
        if let Some(url) = location.url_for_pdf {
            push_unique(&mut links, url);
        }
    }
    links
}

fn push_unique(links: &mut Vec<String>, link: String) {
    if !links.contains(&link) {
        links.push(link);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORK: &str = r#"{
        "status": "ok",
        "message": {
            "DOI": "10.1038/nature14539",
            "title": ["Deep learning"],
            "author": [
                {"given": "Yann", "family": "LeCun"},
                {"given": "Yoshua", "family": "Bengio"},
                {"name": "Consortium"}
            ],
            "issued": {"date-parts": [[2015, 5, 27]]},
            "container-title": ["Nature"],
            "abstract": "<jats:p>Deep learning allows models to learn.</jats:p>",
            "link": [
                {"URL": "https://www.nature.com/articles/nature14539.pdf", "content-type": "application/pdf"},
                {"URL": "https://www.nature.com/articles/nature14539", "content-type": "text/html"}
            ]
        }
    }"#;

    #[test]
    fn test_crossref_work_metadata() {
        let envelope: Envelope<CrossrefWork> = serde_json::from_str(WORK).unwrap();
        let work = envelope.message;
        let metadata = work.metadata();

        assert_eq!(metadata.title.as_deref(), Some("Deep learning"));
        assert_eq!(
            metadata.authors.as_deref(),
            Some("Yann LeCun, Yoshua Bengio, Consortium")
        );
        assert_eq!(metadata.year, Some(2015));
        assert_eq!(metadata.journal.as_deref(), Some("Nature"));
        assert_eq!(
            metadata.abstract_text.as_deref(),
            Some("Deep learning allows models to learn.")
        );
        assert_eq!(
            work.pdf_links().collect::<Vec<_>>(),
            vec!["https://www.nature.com/articles/nature14539.pdf"]
        );
    }

    #[test]
    fn test_null_date_parts() {
        let work: CrossrefWork =
            serde_json::from_str(r#"{"DOI": "10.1/x", "issued": {"date-parts": [[null]]}}"#).unwrap();
        assert_eq!(work.year(), None);
        assert_eq!(work.title(), "");
    }

    #[test]
    fn test_unpaywall_links_deduplicated() {
        let record: UnpaywallRecord = serde_json::from_str(
            r#"{
                "best_oa_location": {"url_for_pdf": "https://repo.org/a.pdf"},
                "oa_locations": [
                    {"url_for_pdf": "https://repo.org/a.pdf"},
                    {"url_for_pdf": null},
                    {"url_for_pdf": "https://mirror.org/a.pdf"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            unpaywall_pdf_links(record),
            vec!["https://repo.org/a.pdf", "https://mirror.org/a.pdf"]
        );
    }

    #[test]
    fn test_bibliographic_terms() {
        let query = AcquisitionQuery {
            title: "Deep learning".into(),
            author: "LeCun, Y.".into(),
            ..Default::default()
        };
        assert_eq!(bibliographic_terms(&query), "Deep learning LeCun, Y.");
    }
}
