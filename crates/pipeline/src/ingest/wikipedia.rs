//! Encyclopedia ingestion via the MediaWiki API.
//!
//! Accepts either a bare article title or a full article URL. Lookup is
//! exact-match first (with redirects followed); when the page is missing,
//! one auto-suggest round picks the closest title and retries.

use serde_json::Value;

use mosaic_db::models::notebook::Artefact;

use crate::error::PipelineError;

const API_BASE: &str = "https://en.wikipedia.org/w/api.php";

/// Ingest one encyclopedia reference as a `"Wikipedia: <title>"` artefact.
pub async fn fetch_article(
    http: &reqwest::Client,
    reference: &str,
) -> Result<Artefact, PipelineError> {
    let title = title_from_reference(reference);
    if title.is_empty() {
        return Err(PipelineError::Validation(format!(
            "empty encyclopedia reference: {reference}"
        )));
    }

    if let Some((resolved, extract)) = fetch_extract(http, &title).await? {
        return Ok(article_artefact(&resolved, &extract));
    }

    // Exact match failed: one auto-suggest round.
    let Some(suggestion) = suggest_title(http, &title).await? else {
        return Err(PipelineError::Validation(format!(
            "no encyclopedia article found for '{title}'"
        )));
    };
    tracing::debug!(%title, %suggestion, "Exact article lookup missed, using suggestion");
    match fetch_extract(http, &suggestion).await? {
        Some((resolved, extract)) => Ok(article_artefact(&resolved, &extract)),
        None => Err(PipelineError::Validation(format!(
            "no encyclopedia article found for '{title}'"
        ))),
    }
}

fn article_artefact(title: &str, extract: &str) -> Artefact {
    Artefact {
        filename: format!("Wikipedia: {title}"),
        content: extract.to_string(),
        kind: "wikipedia".to_string(),
        is_loaded: true,
    }
}

/// Plain-text extract of a page, with redirects followed. `None` when the
/// page does not exist.
async fn fetch_extract(
    http: &reqwest::Client,
    title: &str,
) -> Result<Option<(String, String)>, PipelineError> {
    let response = http
        .get(API_BASE)
        .query(&[
            ("action", "query"),
            ("prop", "extracts"),
            ("explaintext", "1"),
            ("redirects", "1"),
            ("format", "json"),
            ("titles", title),
        ])
        .send()
        .await?
        .error_for_status()?;
    let body: Value = response.json().await?;

    let Some(pages) = body["query"]["pages"].as_object() else {
        return Ok(None);
    };
    for page in pages.values() {
        if page.get("missing").is_some() {
            continue;
        }
        let resolved = page["title"].as_str().unwrap_or(title);
        if let Some(extract) = page["extract"].as_str().filter(|e| !e.trim().is_empty()) {
            return Ok(Some((resolved.to_string(), extract.to_string())));
        }
    }
    Ok(None)
}

/// First opensearch suggestion for a title, if any.
async fn suggest_title(
    http: &reqwest::Client,
    title: &str,
) -> Result<Option<String>, PipelineError> {
    let response = http
        .get(API_BASE)
        .query(&[
            ("action", "opensearch"),
            ("limit", "1"),
            ("format", "json"),
            ("search", title),
        ])
        .send()
        .await?
        .error_for_status()?;
    let body: Value = response.json().await?;
    Ok(body[1][0].as_str().map(str::to_string))
}

/// Normalise a reference: article URLs yield their title segment,
/// anything else is treated as a title already.
pub fn title_from_reference(reference: &str) -> String {
    let trimmed = reference.trim();
    if let Some(rest) = trimmed.split_once("/wiki/").map(|(_, rest)| rest) {
        let title = rest.split(['?', '#']).next().unwrap_or(rest);
        return title.replace('_', " ").trim().to_string();
    }
    trimmed.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_title_passes_through() {
        assert_eq!(title_from_reference(" Alan Turing "), "Alan Turing");
    }

    #[test]
    fn article_url_yields_title() {
        assert_eq!(
            title_from_reference("https://en.wikipedia.org/wiki/Alan_Turing"),
            "Alan Turing"
        );
    }

    #[test]
    fn url_fragments_and_queries_are_dropped() {
        assert_eq!(
            title_from_reference("https://en.wikipedia.org/wiki/Rust_(programming_language)#History"),
            "Rust (programming language)"
        );
    }

    #[test]
    fn artefact_name_carries_the_title() {
        let a = article_artefact("Alan Turing", "content");
        assert_eq!(a.filename, "Wikipedia: Alan Turing");
        assert_eq!(a.kind, "wikipedia");
        assert!(a.is_loaded);
    }
}
