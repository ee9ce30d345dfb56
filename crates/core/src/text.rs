//! Text utilities: token estimation, overlapping chunking, and TTS input
//! sanitisation.
//!
//! Token counts are estimates. Back-ends tokenise differently, so the
//! long-context processor treats these numbers as budgets with a safety
//! margin rather than exact counts.

/// Rough characters-per-token ratio for English-like text.
const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a string.
///
/// Uses a chars/4 heuristic. Always returns at least 1 for non-empty input.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    if chars == 0 {
        0
    } else {
        (chars / CHARS_PER_TOKEN).max(1)
    }
}

/// Split `text` into chunks of at most `chunk_tokens` tokens, with
/// `overlap_tokens` of trailing context repeated at the start of the next
/// chunk.
///
/// Chunks are split on character boundaries; ordering follows the input.
/// Returns an empty vec for empty input.
pub fn chunk_with_overlap(text: &str, chunk_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    if text.is_empty() || chunk_tokens == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let chunk_chars = chunk_tokens * CHARS_PER_TOKEN;
    // The overlap must be strictly smaller than the chunk or the loop
    // would not advance.
    let overlap_chars = (overlap_tokens * CHARS_PER_TOKEN).min(chunk_chars.saturating_sub(1));

    if chars.len() <= chunk_chars {
        return vec![text.to_string()];
    }

    let step = chunk_chars - overlap_chars;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Sanitise a string for text-to-speech input.
///
/// Strips Markdown emphasis and heading markers, drops emoji and other
/// supplementary-plane characters that trip up TTS front-ends, collapses
/// runs of whitespace, and trims.
pub fn sanitize_for_tts(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for line in text.lines() {
        let line = line.trim_start_matches(['#', '>']).trim_start();
        for c in line.chars() {
            match c {
                '*' | '_' | '`' | '~' => {}
                c if (c as u32) > 0xFFFF => {}
                // Misc symbols / dingbats blocks in the BMP are emoji too.
                c if ('\u{2600}'..='\u{27BF}').contains(&c) => {}
                c if ('\u{FE00}'..='\u{FE0F}').contains(&c) => {}
                c => cleaned.push(c),
            }
        }
        cleaned.push(' ');
    }

    // Collapse whitespace runs left behind by stripped markup.
    let mut out = String::with_capacity(cleaned.len());
    let mut last_was_space = false;
    for c in cleaned.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- estimate_tokens --

    #[test]
    fn empty_text_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn short_text_is_at_least_one_token() {
        assert_eq!(estimate_tokens("hi"), 1);
    }

    #[test]
    fn estimate_uses_char_ratio() {
        let text = "a".repeat(400);
        assert_eq!(estimate_tokens(&text), 100);
    }

    // -- chunk_with_overlap --

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_with_overlap("", 100, 10).is_empty());
    }

    #[test]
    fn input_below_budget_is_a_single_chunk() {
        let chunks = chunk_with_overlap("short text", 100, 10);
        assert_eq!(chunks, vec!["short text".to_string()]);
    }

    #[test]
    fn chunks_cover_input_in_order() {
        let text = "abcdefghij".repeat(20); // 200 chars
        let chunks = chunk_with_overlap(&text, 10, 0); // 40-char chunks
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn overlap_repeats_trailing_context() {
        let text: String = ('a'..='z').cycle().take(100).collect();
        let chunks = chunk_with_overlap(&text, 10, 5); // 40-char chunks, 20 overlap
        assert!(chunks.len() > 1);
        let first_tail: String = chunks[0].chars().skip(20).collect();
        let second_head: String = chunks[1].chars().take(20).collect();
        assert_eq!(first_tail, second_head);
    }

    #[test]
    fn multibyte_input_splits_on_char_boundaries() {
        let text = "é".repeat(100);
        let chunks = chunk_with_overlap(&text, 10, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }

    // -- sanitize_for_tts --

    #[test]
    fn markdown_emphasis_is_stripped() {
        assert_eq!(sanitize_for_tts("**bold** and _italic_"), "bold and italic");
    }

    #[test]
    fn heading_markers_are_stripped() {
        assert_eq!(sanitize_for_tts("## Heading"), "Heading");
    }

    #[test]
    fn emoji_are_dropped() {
        assert_eq!(sanitize_for_tts("Launch day 🚀 is here ☀"), "Launch day is here");
    }

    #[test]
    fn whitespace_is_collapsed_and_trimmed() {
        assert_eq!(sanitize_for_tts("  a   b  \n\n  c  "), "a b c");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(sanitize_for_tts("Hello, world."), "Hello, world.");
    }
}
