//! Academic paper search and ingestion via the arXiv Atom API.
//!
//! A search query returns candidate papers; the user's selection is then
//! ingested one paper per artefact. The Atom feed is regular enough for a
//! regex scan of `<entry>` blocks.

use regex::Regex;

use mosaic_db::models::notebook::Artefact;

use crate::error::PipelineError;
use crate::ingest::web::decode_entities;

const API_BASE: &str = "https://export.arxiv.org/api/query";
const MAX_SEARCH_RESULTS: usize = 10;

/// Metadata for one paper from a search.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PaperMeta {
    /// Stable identifier, e.g. `http://arxiv.org/abs/2301.00001v1`.
    pub entry_id: String,
    pub title: String,
    pub summary: String,
    pub authors: Vec<String>,
}

/// One paper picked from search results for ingestion.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PaperSelection {
    pub entry_id: String,
    /// Ingest the full text where available, not just the abstract.
    #[serde(default)]
    pub ingest_full: bool,
}

/// Run one search query.
pub async fn search_papers(
    http: &reqwest::Client,
    query: &str,
) -> Result<Vec<PaperMeta>, PipelineError> {
    let response = http
        .get(API_BASE)
        .query(&[
            ("search_query", format!("all:{query}")),
            ("max_results", MAX_SEARCH_RESULTS.to_string()),
        ])
        .send()
        .await?
        .error_for_status()?;
    Ok(parse_atom_feed(&response.text().await?))
}

/// Fetch one selected paper by entry id and wrap it as an artefact.
///
/// Full-text ingestion needs a PDF converter backend, which is outside
/// this crate; `ingest_full` selections carry the abstract plus the PDF
/// link so the material is still usable as grounding.
pub async fn fetch_selected(
    http: &reqwest::Client,
    selection: &PaperSelection,
) -> Result<Artefact, PipelineError> {
    let id = arxiv_id(&selection.entry_id);
    let response = http
        .get(API_BASE)
        .query(&[("id_list", id.as_str()), ("max_results", "1")])
        .send()
        .await?
        .error_for_status()?;
    let papers = parse_atom_feed(&response.text().await?);
    let paper = papers.into_iter().next().ok_or_else(|| {
        PipelineError::Validation(format!("paper {} not found", selection.entry_id))
    })?;
    Ok(paper_artefact(&paper, selection.ingest_full))
}

pub fn paper_artefact(paper: &PaperMeta, ingest_full: bool) -> Artefact {
    let mut content = format!(
        "# {}\n\nAuthors: {}\n\n{}",
        paper.title,
        paper.authors.join(", "),
        paper.summary,
    );
    if ingest_full {
        let pdf = paper.entry_id.replace("/abs/", "/pdf/");
        content.push_str(&format!("\n\nFull text: {pdf}"));
    }
    Artefact {
        filename: format!("Paper: {}", paper.title),
        content,
        kind: "paper".to_string(),
        is_loaded: true,
    }
}

/// Parse an arXiv Atom feed into paper metadata, feed order preserved.
pub fn parse_atom_feed(xml: &str) -> Vec<PaperMeta> {
    let Ok(entry_re) = Regex::new(r"(?s)<entry>(.*?)</entry>") else {
        return Vec::new();
    };
    entry_re
        .captures_iter(xml)
        .filter_map(|caps| parse_entry(&caps[1]))
        .collect()
}

fn parse_entry(entry: &str) -> Option<PaperMeta> {
    let entry_id = tag_text(entry, "id")?;
    let title = tag_text(entry, "title")?;
    let summary = tag_text(entry, "summary").unwrap_or_default();
    let authors = match Regex::new(r"(?s)<name>(.*?)</name>") {
        Ok(re) => re
            .captures_iter(entry)
            .map(|c| clean_text(&c[1]))
            .collect(),
        Err(_) => Vec::new(),
    };
    Some(PaperMeta {
        entry_id,
        title,
        summary,
        authors,
    })
}

fn tag_text(entry: &str, tag: &str) -> Option<String> {
    let re = Regex::new(&format!(r"(?s)<{tag}[^>]*>(.*?)</{tag}>")).ok()?;
    re.captures(entry)
        .map(|c| clean_text(&c[1]))
        .filter(|t| !t.is_empty())
}

/// Atom text nodes fold long lines with newline + indentation.
fn clean_text(raw: &str) -> String {
    let decoded = decode_entities(raw);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The bare id the `id_list` parameter expects.
fn arxiv_id(entry_id: &str) -> String {
    entry_id
        .rsplit("/abs/")
        .next()
        .unwrap_or(entry_id)
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query</title>
  <entry>
    <id>http://arxiv.org/abs/2301.00001v1</id>
    <title>Quantum Error
      Correction Surveyed</title>
    <summary>A survey of QEC.</summary>
    <author><name>Alice Smith</name></author>
    <author><name>Bob Jones</name></author>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2301.00002v2</id>
    <title>Second Paper</title>
    <summary>Another abstract.</summary>
    <author><name>Carol Doe</name></author>
  </entry>
</feed>"#;

    #[test]
    fn feed_parses_entries_in_order() {
        let papers = parse_atom_feed(FEED);
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].title, "Quantum Error Correction Surveyed");
        assert_eq!(papers[0].authors, vec!["Alice Smith", "Bob Jones"]);
        assert_eq!(papers[1].entry_id, "http://arxiv.org/abs/2301.00002v2");
    }

    #[test]
    fn folded_title_lines_are_joined() {
        let papers = parse_atom_feed(FEED);
        assert!(!papers[0].title.contains('\n'));
    }

    #[test]
    fn feed_without_entries_is_empty() {
        assert!(parse_atom_feed("<feed><title>x</title></feed>").is_empty());
    }

    #[test]
    fn artefact_carries_abstract_and_optionally_the_pdf_link() {
        let paper = &parse_atom_feed(FEED)[0];
        let plain = paper_artefact(paper, false);
        assert_eq!(plain.filename, "Paper: Quantum Error Correction Surveyed");
        assert!(!plain.content.contains("Full text"));

        let full = paper_artefact(paper, true);
        assert!(full.content.contains("http://arxiv.org/pdf/2301.00001v1"));
    }

    #[test]
    fn arxiv_id_strips_the_abs_prefix() {
        assert_eq!(arxiv_id("http://arxiv.org/abs/2301.00001v1"), "2301.00001v1");
        assert_eq!(arxiv_id("2301.00001v1"), "2301.00001v1");
    }
}
