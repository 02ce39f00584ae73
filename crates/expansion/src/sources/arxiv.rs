//! Preprint archive provider (arXiv Atom export API)

use super::http::HttpFetcher;
use super::{
    is_plausible_match, AcquiredContent, AcquisitionQuery, CanonicalMetadata, ContentProvider,
    ProviderOutcome,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use refgraph_common::ProviderKind;
use regex_lite::Regex;
use tracing::{debug, instrument};

const DEFAULT_BASE_URL: &str = "http://export.arxiv.org/api/query";
const MAX_RESULTS: usize = 5;

static ENTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<entry>(.*?)</entry>").expect("valid regex"));
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<title[^>]*>(.*?)</title>").expect("valid regex"));
static SUMMARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<summary[^>]*>(.*?)</summary>").expect("valid regex"));
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<name>(.*?)</name>").expect("valid regex"));
static PUBLISHED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<published>(\d{4})").expect("valid regex"));
static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<id>([^<]+)</id>").expect("valid regex"));
static PDF_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<link[^>]*title="pdf"[^>]*href="([^"]+)"|<link[^>]*href="([^"]+)"[^>]*title="pdf""#)
        .expect("valid regex")
});
static DOI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<arxiv:doi[^>]*>(.*?)</arxiv:doi>").expect("valid regex"));
static JOURNAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<arxiv:journal_ref[^>]*>(.*?)</arxiv:journal_ref>").expect("valid regex")
});

/// One `<entry>` of an Atom feed
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ArxivEntry {
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub summary: Option<String>,
    pub pdf_url: Option<String>,
    pub doi: Option<String>,
    pub journal: Option<String>,
}

impl ArxivEntry {
    fn metadata(&self) -> CanonicalMetadata {
        CanonicalMetadata {
            title: Some(self.title.clone()),
            authors: (!self.authors.is_empty()).then(|| self.authors.join(", ")),
            year: self.year,
            doi: self.doi.clone(),
            journal: self.journal.clone(),
            abstract_text: self.summary.clone(),
        }
    }
}

pub struct ArxivProvider {
    fetcher: HttpFetcher,
    base_url: String,
    title_threshold: f64,
}

impl ArxivProvider {
    pub fn new(fetcher: HttpFetcher, base_url: Option<String>, title_threshold: f64) -> Self {
        Self {
            fetcher,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            title_threshold,
        }
    }

    /// `ti:` terms joined with `au:` surname, all ANDed
    fn search_query(query: &AcquisitionQuery) -> String {
        let mut parts: Vec<String> = query
            .title
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .take(8)
            .map(|w| format!("ti:{}", w))
            .collect();
        if let Some(surname) = query.surname.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("au:{}", surname));
        }
        parts.join(" AND ")
    }
}

#[async_trait]
impl ContentProvider for ArxivProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Arxiv
    }

    #[instrument(skip(self, query), fields(provider = "arxiv"))]
    async fn try_fetch(&self, query: &AcquisitionQuery) -> ProviderOutcome {
        let search = Self::search_query(query);
        if search.is_empty() {
            return ProviderOutcome::Miss;
        }

        let params = [
            ("search_query", search),
            ("max_results", MAX_RESULTS.to_string()),
            ("sortBy", "relevance".to_string()),
        ];
        let feed = match self.fetcher.get_text(&self.base_url, &params).await {
            Ok(feed) => feed,
            Err(e) => return e.into(),
        };

        let Some(entry) = parse_feed(&feed).into_iter().find(|entry| {
            is_plausible_match(query, &entry.title, &entry.authors, entry.year, self.title_threshold)
        }) else {
            debug!("No plausible arXiv entry");
            return ProviderOutcome::Miss;
        };
        let Some(pdf_url) = entry.pdf_url.clone() else {
            return ProviderOutcome::Miss;
        };

        match self.fetcher.download_document(&pdf_url).await {
            Ok(Some(text)) => ProviderOutcome::Content(AcquiredContent {
                text,
                metadata: entry.metadata(),
                source_url: Some(pdf_url),
            }),
            Ok(None) => ProviderOutcome::Miss,
            Err(e) => e.into(),
        }
    }
}

/// Parse the entries of an arXiv Atom feed
pub(crate) fn parse_feed(feed: &str) -> Vec<ArxivEntry> {
    ENTRY_RE
        .captures_iter(feed)
        .filter_map(|entry| {
            let body = &entry[1];
            let title = capture(&TITLE_RE, body)?;
            let pdf_url = PDF_LINK_RE
                .captures(body)
                .and_then(|c| c.get(1).or_else(|| c.get(2)))
                .map(|m| m.as_str().to_string())
                .or_else(|| {
                    capture(&ID_RE, body)
                        .filter(|id| id.contains("/abs/"))
                        .map(|id| id.replace("/abs/", "/pdf/"))
                });

            Some(ArxivEntry {
                title,
                authors: NAME_RE
                    .captures_iter(body)
                    .map(|c| collapse(&c[1]))
                    .collect(),
                year: PUBLISHED_RE
                    .captures(body)
                    .and_then(|c| c[1].parse().ok()),
                summary: capture(&SUMMARY_RE, body),
                pdf_url,
                doi: capture(&DOI_RE, body),
                journal: capture(&JOURNAL_RE, body),
            })
        })
        .collect()
}

fn capture(re: &Regex, body: &str) -> Option<String> {
    re.captures(body)
        .map(|c| collapse(&c[1]))
        .filter(|s| !s.is_empty())
}

fn collapse(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=ti:attention</title>
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All
      You Need</title>
    <summary>  The dominant sequence transduction models are based on complex recurrent networks.  </summary>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
    <arxiv:doi xmlns:arxiv="http://arxiv.org/schemas/atom">10.48550/arXiv.1706.03762</arxiv:doi>
    <link href="http://arxiv.org/abs/1706.03762v7" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/1706.03762v7" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/1902.10186v3</id>
    <published>2019-02-26T00:00:00Z</published>
    <title>Attention is not Explanation</title>
    <author><name>Sarthak Jain</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed() {
        let entries = parse_feed(FEED);
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.title, "Attention Is All You Need");
        assert_eq!(first.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(first.year, Some(2017));
        assert_eq!(first.pdf_url.as_deref(), Some("http://arxiv.org/pdf/1706.03762v7"));
        assert_eq!(first.doi.as_deref(), Some("10.48550/arXiv.1706.03762"));
        assert!(first.summary.as_deref().unwrap().starts_with("The dominant"));

        // No pdf link: derived from the abstract id
        assert_eq!(
            entries[1].pdf_url.as_deref(),
            Some("http://arxiv.org/pdf/1902.10186v3")
        );
    }

    #[test]
    fn test_feed_title_is_not_an_entry() {
        let entries = parse_feed("<feed><title>ArXiv Query</title></feed>");
        assert!(entries.is_empty());
    }

    #[test]
    fn test_search_query() {
        let query = AcquisitionQuery {
            title: "Deep Residual Learning for Image Recognition".into(),
            author: "He, K.".into(),
            surname: Some("He".into()),
            year: Some(2016),
            doi: None,
        };
        assert_eq!(
            ArxivProvider::search_query(&query),
            "ti:Deep AND ti:Residual AND ti:Learning AND ti:for AND ti:Image AND ti:Recognition AND au:He"
        );
    }
}
