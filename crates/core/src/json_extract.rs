//! Robust JSON extraction from model output.
//!
//! Language models asked for "raw JSON" return fenced code blocks, prose
//! around the payload, line comments, and trailing commas. The ladder here
//! tries progressively more forgiving strategies; the first parse that
//! succeeds wins. On total failure the caller falls back to a placeholder
//! plan, so this module never panics and never errors.

use regex::Regex;
use serde_json::Value;

/// Extract a JSON value from arbitrary model output.
///
/// Strategy order:
/// 1. fenced code block (```json ... ``` or ``` ... ```),
/// 2. first `{`/`[` to last `}`/`]` substring,
/// 3. strip `// ...` line comments and retry,
/// 4. remove trailing commas before `]`/`}` and retry.
///
/// Returns `None` when every strategy fails.
pub fn extract_json(raw: &str) -> Option<Value> {
    let candidates = [
        fenced_block(raw),
        bracket_span(raw),
        Some(raw.to_string()),
    ];

    for candidate in candidates.iter().flatten() {
        if let Ok(v) = serde_json::from_str::<Value>(candidate) {
            return Some(v);
        }
        let uncommented = strip_line_comments(candidate);
        if let Ok(v) = serde_json::from_str::<Value>(&uncommented) {
            return Some(v);
        }
        let repaired = fix_trailing_commas(&uncommented);
        if let Ok(v) = serde_json::from_str::<Value>(&repaired) {
            return Some(v);
        }
    }

    None
}

/// Pull the body of the first fenced code block, if any.
fn fenced_block(raw: &str) -> Option<String> {
    // `(?s)` so `.` spans newlines; the language tag is optional.
    let re = Regex::new(r"(?s)```(?:json)?\s*(.*?)```").ok()?;
    re.captures(raw)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Slice from the first opening bracket to the last matching closer.
fn bracket_span(raw: &str) -> Option<String> {
    let start = raw.find(['{', '['])?;
    let opener = raw.as_bytes()[start];
    let closer = if opener == b'{' { '}' } else { ']' };
    let end = raw.rfind(closer)?;
    if end <= start {
        return None;
    }
    Some(raw[start..=end].to_string())
}

/// Remove `// ...` comments outside of string literals.
fn strip_line_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for line in input.lines() {
        let mut in_string = false;
        let mut escaped = false;
        let mut cut = line.len();
        let bytes = line.as_bytes();
        for i in 0..bytes.len() {
            let c = bytes[i];
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                b'\\' if in_string => escaped = true,
                b'"' => in_string = !in_string,
                b'/' if !in_string && i + 1 < bytes.len() && bytes[i + 1] == b'/' => {
                    cut = i;
                    break;
                }
                _ => {}
            }
        }
        out.push_str(line[..cut].trim_end());
        out.push('\n');
    }
    out
}

/// Drop commas that directly precede a closing bracket or brace.
fn fix_trailing_commas(input: &str) -> String {
    // Safe outside string literals only in pathological cases; model output
    // with `",]"` inside a string is rare enough that a parse failure there
    // falls through to the placeholder path anyway.
    let Ok(re) = Regex::new(r",\s*([\]}])") else {
        return input.to_string();
    };
    re.replace_all(input, "$1").to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_json_parses() {
        let v = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn fenced_json_block() {
        let raw = "Here is the plan:\n```json\n{\"slides\": []}\n```\nDone.";
        let v = extract_json(raw).unwrap();
        assert_eq!(v, json!({"slides": []}));
    }

    #[test]
    fn fenced_block_without_language_tag() {
        let raw = "```\n[1, 2, 3]\n```";
        assert_eq!(extract_json(raw).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn json_buried_in_prose() {
        let raw = "Sure! The result you asked for is {\"title\": \"Intro\"} as requested.";
        let v = extract_json(raw).unwrap();
        assert_eq!(v, json!({"title": "Intro"}));
    }

    #[test]
    fn array_buried_in_prose() {
        let raw = "The list: [\"a\", \"b\"], hope that helps.";
        assert_eq!(extract_json(raw).unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn line_comments_are_stripped() {
        let raw = "{\n  \"a\": 1, // the first field\n  \"b\": 2\n}";
        assert_eq!(extract_json(raw).unwrap(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn comment_inside_string_survives() {
        let raw = r#"{"url": "https://example.org"}"#;
        let v = extract_json(raw).unwrap();
        assert_eq!(v["url"], "https://example.org");
    }

    #[test]
    fn trailing_commas_are_repaired() {
        let raw = "{\"items\": [1, 2, 3,], \"n\": 3,}";
        assert_eq!(extract_json(raw).unwrap(), json!({"items": [1, 2, 3], "n": 3}));
    }

    #[test]
    fn comments_and_trailing_commas_together() {
        let raw = "```json\n{\n \"a\": [1,], // count\n}\n```";
        assert_eq!(extract_json(raw).unwrap(), json!({"a": [1]}));
    }

    #[test]
    fn garbage_returns_none() {
        assert!(extract_json("not json at all").is_none());
    }

    #[test]
    fn empty_input_returns_none() {
        assert!(extract_json("").is_none());
    }

    #[test]
    fn unbalanced_braces_return_none() {
        assert!(extract_json("{ \"a\": ").is_none());
    }
}
