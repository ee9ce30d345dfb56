//! Web page ingestion: fetch a URL and reduce it to readable Markdown-ish
//! text.
//!
//! Extraction is deliberately lightweight: drop scripts, styles, and
//! navigation chrome, prefer the `<article>`/`<main>` region when the page
//! has one, and strip the remaining markup. Good enough as grounding
//! material; pixel-perfect readability is not the goal.

use regex::Regex;

use mosaic_db::models::notebook::Artefact;

use crate::error::PipelineError;

/// Fetch one page and wrap it as a `"Web: <url>"` artefact.
pub async fn fetch_web_page(
    http: &reqwest::Client,
    url: &str,
) -> Result<Artefact, PipelineError> {
    let response = http.get(url).send().await?.error_for_status()?;
    let html = response.text().await?;
    let content = extract_main_content(&html);
    if content.trim().is_empty() {
        return Err(PipelineError::Validation(format!(
            "no readable content found at {url}"
        )));
    }
    Ok(Artefact {
        filename: format!("Web: {url}"),
        content,
        kind: "web".to_string(),
        is_loaded: true,
    })
}

/// Reduce raw HTML to readable text.
pub fn extract_main_content(html: &str) -> String {
    let mut text = html.to_string();
    for tag in ["script", "style", "noscript"] {
        text = strip_pattern(&text, &format!(r"(?is)<{tag}\b.*?</{tag}>"));
    }
    text = strip_pattern(&text, r"(?s)<!--.*?-->");

    // Prefer the semantic content region when the page marks one.
    for region in [r"(?is)<article\b.*?>(.*)</article>", r"(?is)<main\b.*?>(.*)</main>"] {
        if let Some(inner) = capture_first(&text, region) {
            text = inner;
            break;
        }
    }

    // Block-level tags become line breaks, list items become dashes.
    text = replace_pattern(&text, r"(?i)<li\b[^>]*>", "\n- ");
    text = replace_pattern(&text, r"(?i)<(/p|/div|/h[1-6]|br\s*/?|/li|/tr)\b[^>]*>", "\n");
    text = strip_pattern(&text, r"(?s)<[^>]+>");
    text = decode_entities(&text);

    // Collapse the whitespace left behind by stripped markup.
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

fn strip_pattern(input: &str, pattern: &str) -> String {
    replace_pattern(input, pattern, "")
}

fn replace_pattern(input: &str, pattern: &str, with: &str) -> String {
    let Ok(re) = Regex::new(pattern) else {
        return input.to_string();
    };
    re.replace_all(input, with).to_string()
}

fn capture_first(input: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    re.captures(input).map(|c| c[1].to_string())
}

/// Decode the handful of entities that dominate scraped text.
pub fn decode_entities(text: &str) -> String {
    let mut out = text
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    // Numeric references, decimal only; rare enough to handle per match.
    if let Ok(re) = Regex::new(r"&#(\d+);") {
        out = re
            .replace_all(&out, |caps: &regex::Captures| {
                caps[1]
                    .parse::<u32>()
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_default()
            })
            .to_string();
    }
    // `&amp;` last, so `&amp;lt;` does not double-decode.
    out.replace("&amp;", "&")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_and_styles_are_dropped() {
        let html = "<html><head><style>.x{}</style></head>\
                    <body><script>alert(1)</script><p>Real text</p></body></html>";
        let text = extract_main_content(html);
        assert_eq!(text, "Real text");
    }

    #[test]
    fn article_region_is_preferred() {
        let html = "<body><nav>menu menu</nav><article><p>The story.</p></article>\
                    <footer>legal</footer></body>";
        let text = extract_main_content(html);
        assert_eq!(text, "The story.");
    }

    #[test]
    fn list_items_become_dashes() {
        let html = "<ul><li>first</li><li>second</li></ul>";
        let text = extract_main_content(html);
        assert!(text.contains("- first"));
        assert!(text.contains("- second"));
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt; &#233;"), "a & b <c> é");
    }

    #[test]
    fn blank_runs_are_collapsed() {
        let html = "<p>one</p><div></div><div></div><div></div><p>two</p>";
        let text = extract_main_content(html);
        assert_eq!(text, "one\n\ntwo");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(extract_main_content("just words"), "just words");
    }
}
