//! External academic-paper search.
//!
//! [`PaperSearch`] queries its [`PaperSource`]s in order, asking each one
//! only for the results still missing, and returns at most `limit`
//! normalized [`PaperRecord`]s. The configured chain is Semantic Scholar
//! first, then arXiv to fill the remainder.
//!
//! A source that fails is logged and contributes nothing; the search as a
//! whole never fails because of one upstream API.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::PapersConfig;
use crate::models::PaperRecord;

const ABSTRACT_MAX_CHARS: usize = 500;

#[async_trait]
pub trait PaperSource: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, limit: usize, offset: usize) -> Result<Vec<PaperRecord>>;
}

pub struct PaperSearch {
    sources: Vec<Arc<dyn PaperSource>>,
}

impl PaperSearch {
    pub fn new(sources: Vec<Arc<dyn PaperSource>>) -> Self {
        Self { sources }
    }

    pub fn from_config(config: &PapersConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let semantic_scholar: Arc<dyn PaperSource> = Arc::new(SemanticScholar {
            url: config.semantic_scholar_url.clone(),
            client: client.clone(),
        });
        let arxiv: Arc<dyn PaperSource> = Arc::new(Arxiv {
            url: config.arxiv_url.clone(),
            client,
        });
        Ok(Self::new(vec![semantic_scholar, arxiv]))
    }

    /// Search every source in turn until `limit` results are collected.
    ///
    /// `offset` pages the primary source only; fallback sources always
    /// start from their first result.
    pub async fn search(&self, query: &str, limit: usize, offset: usize) -> Vec<PaperRecord> {
        let mut papers = Vec::new();

        for (position, source) in self.sources.iter().enumerate() {
            if papers.len() >= limit {
                break;
            }
            let wanted = limit - papers.len();
            let source_offset = if position == 0 { offset } else { 0 };

            match source.search(query, wanted, source_offset).await {
                Ok(found) => {
                    tracing::debug!(source = source.name(), count = found.len(), "paper search");
                    papers.extend(found);
                }
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %format!("{:#}", e), "paper search failed");
                }
            }
        }

        papers.truncate(limit);
        papers
    }
}

/// Keep the first 500 characters and mark the cut.
fn truncate_abstract(text: &str) -> String {
    let mut out: String = text.trim().chars().take(ABSTRACT_MAX_CHARS).collect();
    out.push_str("...");
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============ Semantic Scholar ============

pub struct SemanticScholar {
    url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct S2Response {
    #[serde(default)]
    data: Vec<S2Paper>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<S2Author>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<i32>,
    citation_count: Option<i64>,
    open_access_pdf: Option<S2Pdf>,
    external_ids: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Deserialize)]
struct S2Author {
    name: Option<String>,
}

#[derive(Deserialize)]
struct S2Pdf {
    url: Option<String>,
}

impl From<S2Paper> for PaperRecord {
    fn from(paper: S2Paper) -> Self {
        let authors = paper
            .authors
            .iter()
            .filter_map(|a| a.name.as_deref())
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        let publisher_link = paper
            .external_ids
            .as_ref()
            .and_then(|ids| ids.get("DOI"))
            .and_then(|doi| doi.as_str())
            .map(|doi| format!("https://doi.org/{}", doi));

        PaperRecord {
            title: paper.title.unwrap_or_else(|| "No title".to_string()),
            authors: if authors.is_empty() {
                "Unknown".to_string()
            } else {
                authors
            },
            abstract_text: truncate_abstract(
                paper.abstract_text.as_deref().unwrap_or("No abstract available"),
            ),
            year: paper.year.unwrap_or(0),
            citations: paper.citation_count.unwrap_or(0),
            views: 0,
            pdf_link: paper.open_access_pdf.and_then(|p| p.url),
            publisher_link,
            source: Some("Semantic Scholar".to_string()),
        }
    }
}

fn parse_semantic_scholar(body: &str) -> Result<Vec<PaperRecord>> {
    let response: S2Response =
        serde_json::from_str(body).context("Invalid Semantic Scholar response")?;
    Ok(response.data.into_iter().map(PaperRecord::from).collect())
}

#[async_trait]
impl PaperSource for SemanticScholar {
    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    async fn search(&self, query: &str, limit: usize, offset: usize) -> Result<Vec<PaperRecord>> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("query", query.to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
                (
                    "fields",
                    "title,authors,abstract,year,citationCount,openAccessPdf,externalIds".to_string(),
                ),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            bail!("Semantic Scholar API error {}", status);
        }
        parse_semantic_scholar(&response.text().await?)
    }
}

// ============ arXiv ============

pub struct Arxiv {
    url: String,
    client: reqwest::Client,
}

#[async_trait]
impl PaperSource for Arxiv {
    fn name(&self) -> &str {
        "arXiv"
    }

    async fn search(&self, query: &str, limit: usize, offset: usize) -> Result<Vec<PaperRecord>> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("search_query", format!("all:{}", query)),
                ("start", offset.to_string()),
                ("max_results", limit.to_string()),
                ("sortBy", "relevance".to_string()),
                ("sortOrder", "descending".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            bail!("arXiv API error {}", status);
        }
        parse_arxiv_feed(&response.text().await?)
    }
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Summary,
    Published,
    Id,
    AuthorName,
}

#[derive(Default)]
struct ArxivEntry {
    title: String,
    summary: String,
    published: String,
    id: String,
    authors: Vec<String>,
    pdf_link: Option<String>,
}

impl ArxivEntry {
    fn into_record(self) -> PaperRecord {
        PaperRecord {
            title: collapse_whitespace(&self.title),
            authors: if self.authors.is_empty() {
                "Unknown".to_string()
            } else {
                self.authors.join(", ")
            },
            abstract_text: truncate_abstract(&collapse_whitespace(&self.summary)),
            year: self
                .published
                .get(..4)
                .and_then(|y| y.parse().ok())
                .unwrap_or(0),
            citations: 0,
            views: 0,
            pdf_link: self.pdf_link,
            publisher_link: Some(self.id.trim().to_string()).filter(|id| !id.is_empty()),
            source: Some("arXiv".to_string()),
        }
    }
}

fn pdf_href(link: &BytesStart<'_>) -> Result<Option<String>> {
    let mut is_pdf = false;
    let mut href = None;
    for attr in link.attributes() {
        let attr = attr?;
        match attr.key.local_name().as_ref() {
            b"title" => is_pdf = attr.unescape_value()? == "pdf",
            b"href" => href = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }
    Ok(if is_pdf { href } else { None })
}

/// Parse an arXiv Atom feed into paper records.
fn parse_arxiv_feed(xml: &str) -> Result<Vec<PaperRecord>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut entry: Option<ArxivEntry> = None;
    let mut field: Option<Field> = None;
    let mut in_author = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let Some(current) = entry.as_mut() else {
                    if e.local_name().as_ref() == b"entry" {
                        entry = Some(ArxivEntry::default());
                    }
                    continue;
                };
                field = match e.local_name().as_ref() {
                    b"author" => {
                        in_author = true;
                        None
                    }
                    b"name" if in_author => Some(Field::AuthorName),
                    b"title" if !in_author => Some(Field::Title),
                    b"summary" => Some(Field::Summary),
                    b"published" => Some(Field::Published),
                    b"id" => Some(Field::Id),
                    b"link" => {
                        if let Some(href) = pdf_href(&e)? {
                            current.pdf_link.get_or_insert(href);
                        }
                        None
                    }
                    _ => None,
                };
            }
            Event::Empty(e) => {
                if let Some(current) = entry.as_mut() {
                    if e.local_name().as_ref() == b"link" {
                        if let Some(href) = pdf_href(&e)? {
                            current.pdf_link.get_or_insert(href);
                        }
                    }
                }
            }
            Event::Text(t) => {
                if let (Some(current), Some(f)) = (entry.as_mut(), field) {
                    let text = t.unescape()?;
                    match f {
                        Field::Title => current.title.push_str(&text),
                        Field::Summary => current.summary.push_str(&text),
                        Field::Published => current.published.push_str(&text),
                        Field::Id => current.id.push_str(&text),
                        Field::AuthorName => current.authors.push(text.trim().to_string()),
                    }
                }
            }
            Event::End(e) => {
                field = None;
                match e.local_name().as_ref() {
                    b"entry" => {
                        if let Some(done) = entry.take() {
                            papers.push(done.into_record());
                        }
                    }
                    b"author" => in_author = false,
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const S2_BODY: &str = r#"{
        "total": 2,
        "data": [
            {
                "title": "Graph Attention Networks",
                "authors": [{"name": "Petar Velickovic"}, {"name": "Yoshua Bengio"}],
                "abstract": "We present graph attention networks.",
                "year": 2018,
                "citationCount": 9000,
                "openAccessPdf": {"url": "https://example.org/gat.pdf"},
                "externalIds": {"DOI": "10.1000/gat", "CorpusId": 123}
            },
            {
                "title": null,
                "authors": [],
                "abstract": null,
                "year": null,
                "citationCount": null,
                "openAccessPdf": null,
                "externalIds": null
            }
        ]
    }"#;

    const ARXIV_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: all:attention</title>
  <id>http://arxiv.org/api/feed</id>
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All
      You Need</title>
    <summary>  The dominant sequence transduction models &amp; more.  </summary>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
    <link href="http://arxiv.org/abs/1706.03762v7" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/1706.03762v7" rel="related" type="application/pdf"/>
  </entry>
</feed>"#;

    #[test]
    fn test_semantic_scholar_normalization() {
        let papers = parse_semantic_scholar(S2_BODY).unwrap();
        assert_eq!(papers.len(), 2);

        let gat = &papers[0];
        assert_eq!(gat.authors, "Petar Velickovic, Yoshua Bengio");
        assert_eq!(gat.abstract_text, "We present graph attention networks....");
        assert_eq!(gat.publisher_link.as_deref(), Some("https://doi.org/10.1000/gat"));
        assert_eq!(gat.pdf_link.as_deref(), Some("https://example.org/gat.pdf"));
        assert_eq!(gat.citations, 9000);
        assert_eq!(gat.views, 0);
        assert_eq!(gat.source.as_deref(), Some("Semantic Scholar"));

        let empty = &papers[1];
        assert_eq!(empty.title, "No title");
        assert_eq!(empty.authors, "Unknown");
        assert_eq!(empty.year, 0);
        assert!(empty.publisher_link.is_none());
    }

    #[test]
    fn test_abstract_truncated_on_char_boundary() {
        let long = "é".repeat(600);
        let cut = truncate_abstract(&long);
        assert_eq!(cut.chars().count(), 503);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_arxiv_feed_parsing() {
        let papers = parse_arxiv_feed(ARXIV_FEED).unwrap();
        assert_eq!(papers.len(), 1);

        let p = &papers[0];
        assert_eq!(p.title, "Attention Is All You Need");
        assert_eq!(p.authors, "Ashish Vaswani, Noam Shazeer");
        assert_eq!(p.abstract_text, "The dominant sequence transduction models & more....");
        assert_eq!(p.year, 2017);
        assert_eq!(p.pdf_link.as_deref(), Some("http://arxiv.org/pdf/1706.03762v7"));
        assert_eq!(
            p.publisher_link.as_deref(),
            Some("http://arxiv.org/abs/1706.03762v7")
        );
        assert_eq!(p.source.as_deref(), Some("arXiv"));
    }

    struct FakeSource {
        name: &'static str,
        available: usize,
        fail: bool,
        seen: std::sync::Mutex<Vec<(usize, usize)>>,
    }

    fn sources(list: &[&Arc<FakeSource>]) -> Vec<Arc<dyn PaperSource>> {
        list.iter()
            .map(|s| Arc::clone(s) as Arc<dyn PaperSource>)
            .collect()
    }

    impl FakeSource {
        fn new(name: &'static str, available: usize, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                available,
                fail,
                seen: std::sync::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PaperSource for FakeSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, query: &str, limit: usize, offset: usize) -> Result<Vec<PaperRecord>> {
            self.seen.lock().unwrap().push((limit, offset));
            if self.fail {
                bail!("upstream 500");
            }
            Ok((0..self.available.min(limit))
                .map(|i| PaperRecord {
                    title: format!("{} {} {}", self.name, query, i),
                    authors: "A".to_string(),
                    abstract_text: "x...".to_string(),
                    year: 2020,
                    citations: 0,
                    views: 0,
                    pdf_link: None,
                    publisher_link: None,
                    source: Some(self.name.to_string()),
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_fallback_fills_remainder() {
        let primary = FakeSource::new("primary", 3, false);
        let fallback = FakeSource::new("fallback", 10, false);
        let search = PaperSearch::new(sources(&[&primary, &fallback]));

        let papers = search.search("rust", 5, 20).await;
        assert_eq!(papers.len(), 5);
        assert_eq!(papers[0].source.as_deref(), Some("primary"));
        assert_eq!(papers[4].source.as_deref(), Some("fallback"));

        assert_eq!(*primary.seen.lock().unwrap(), vec![(5, 20)]);
        assert_eq!(*fallback.seen.lock().unwrap(), vec![(2, 0)]);
    }

    #[tokio::test]
    async fn test_full_primary_skips_fallback() {
        let primary = FakeSource::new("primary", 10, false);
        let fallback = FakeSource::new("fallback", 10, false);
        let search = PaperSearch::new(sources(&[&primary, &fallback]));

        assert_eq!(search.search("rust", 4, 0).await.len(), 4);
        assert!(fallback.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_source_contributes_nothing() {
        let primary = FakeSource::new("primary", 0, true);
        let fallback = FakeSource::new("fallback", 2, false);
        let search = PaperSearch::new(sources(&[&primary, &fallback]));

        let papers = search.search("rust", 5, 0).await;
        assert_eq!(papers.len(), 2);
        assert!(papers.iter().all(|p| p.source.as_deref() == Some("fallback")));
    }
}
