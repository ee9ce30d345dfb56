//! Video transcript ingestion via the timedtext endpoint.
//!
//! The preferred language is tried first, then English. The timedtext XML
//! is a flat list of `<text>` elements; no proper XML parser is needed for
//! that shape.

use regex::Regex;

use mosaic_db::models::notebook::Artefact;

use crate::error::PipelineError;
use crate::ingest::web::decode_entities;

const TIMEDTEXT_BASE: &str = "https://video.google.com/timedtext";

/// Ingest one video transcript as a `"YouTube: <url>"` artefact.
pub async fn fetch_transcript(
    http: &reqwest::Client,
    url: &str,
    language: Option<&str>,
) -> Result<Artefact, PipelineError> {
    let video_id = video_id_from_url(url).ok_or_else(|| {
        PipelineError::Validation(format!("could not extract a video id from {url}"))
    })?;

    let mut languages = vec![language.unwrap_or("en")];
    if languages[0] != "en" {
        languages.push("en");
    }

    for lang in languages {
        let response = http
            .get(TIMEDTEXT_BASE)
            .query(&[("v", video_id.as_str()), ("lang", lang)])
            .send()
            .await?;
        if !response.status().is_success() {
            continue;
        }
        let xml = response.text().await?;
        let transcript = parse_transcript_xml(&xml);
        if !transcript.is_empty() {
            return Ok(Artefact {
                filename: format!("YouTube: {url}"),
                content: transcript,
                kind: "youtube".to_string(),
                is_loaded: true,
            });
        }
    }

    Err(PipelineError::Validation(format!(
        "no transcript available for {url}"
    )))
}

/// Extract the video id from the common URL shapes (`watch?v=`,
/// `youtu.be/`, `shorts/`, `embed/`).
pub fn video_id_from_url(url: &str) -> Option<String> {
    let re = Regex::new(
        r"(?:v=|youtu\.be/|shorts/|embed/)([A-Za-z0-9_-]{11})",
    )
    .ok()?;
    re.captures(url).map(|c| c[1].to_string())
}

/// Flatten timedtext XML into plain text, one caption per line.
pub fn parse_transcript_xml(xml: &str) -> String {
    let Ok(re) = Regex::new(r"(?s)<text[^>]*>(.*?)</text>") else {
        return String::new();
    };
    let mut lines = Vec::new();
    for caps in re.captures_iter(xml) {
        // Timedtext captions are double-escaped ("&amp;#39;"), so decode
        // twice.
        let line = decode_entities(&decode_entities(&caps[1])).trim().to_string();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_url_yields_id() {
        assert_eq!(
            video_id_from_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn short_url_yields_id() {
        assert_eq!(
            video_id_from_url("https://youtu.be/dQw4w9WgXcQ?t=30").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn shorts_url_yields_id() {
        assert_eq!(
            video_id_from_url("https://www.youtube.com/shorts/abcDEF12345").as_deref(),
            Some("abcDEF12345")
        );
    }

    #[test]
    fn non_video_url_yields_none() {
        assert!(video_id_from_url("https://example.org/page").is_none());
    }

    #[test]
    fn transcript_xml_flattens_to_lines() {
        let xml = r#"<?xml version="1.0"?><transcript>
            <text start="0" dur="2">Hello there</text>
            <text start="2" dur="3">it&amp;#39;s a test</text>
        </transcript>"#;
        let text = parse_transcript_xml(xml);
        assert_eq!(text, "Hello there\nit's a test");
    }

    #[test]
    fn empty_transcript_is_empty_string() {
        assert_eq!(parse_transcript_xml("<transcript></transcript>"), "");
    }
}
