//! Long-context processor: compresses arbitrarily large source text into a
//! token-budgeted knowledge core.
//!
//! The reduction runs as an explicit loop with a round cap, never as
//! recursion: chunk the input, extract each chunk, concatenate the
//! extractions, and repeat until the concatenation fits a single call.
//! Chunks are processed sequentially and joined in input order, so the
//! output is deterministic for a deterministic backend.

use tokio_util::sync::CancellationToken;

use mosaic_clients::{GenerateOptions, TextGenerator};
use mosaic_core::text::{chunk_with_overlap, estimate_tokens};

use crate::error::PipelineError;

/// Token budgets for the reduction loop.
///
/// Exact numbers differ per backend, so they are configuration rather
/// than constants; the defaults suit mid-sized local models.
#[derive(Debug, Clone)]
pub struct LcpConfig {
    /// Share of the usable context window a single chunk may fill, 1-100.
    pub context_fill_percentage: u8,
    /// Tokens of trailing context repeated between adjacent chunks.
    pub overlap_tokens: usize,
    /// Tokens reserved for the model's answer on every call.
    pub max_generation_tokens: u32,
    /// Hard cap on reduction rounds. Each round shrinks the text, so this
    /// only triggers on pathological non-compressing backends.
    pub max_rounds: usize,
}

impl Default for LcpConfig {
    fn default() -> Self {
        Self {
            context_fill_percentage: 60,
            overlap_tokens: 256,
            max_generation_tokens: 1024,
            max_rounds: 8,
        }
    }
}

/// Distil `input` into a bounded knowledge core guided by
/// `contextual_prompt`.
///
/// Empty input returns an empty string without a single model call. If
/// cancellation fires mid-reduction, the best summary so far is returned;
/// the surrounding task decides what to do with it.
pub async fn process(
    client: &dyn TextGenerator,
    input: &str,
    contextual_prompt: &str,
    system_prompt: &str,
    config: &LcpConfig,
    cancel: &CancellationToken,
) -> Result<String, PipelineError> {
    if input.trim().is_empty() {
        return Ok(String::new());
    }

    let budget = chunk_budget(client, contextual_prompt, system_prompt, config);
    let options = GenerateOptions {
        system_prompt: Some(system_prompt.to_string()),
        max_new_tokens: Some(config.max_generation_tokens),
        temperature: None,
    };

    let mut current = input.to_string();
    for round in 0..config.max_rounds {
        if cancel.is_cancelled() {
            return Ok(current);
        }
        if estimate_tokens(&current) <= budget {
            return consolidate(client, &current, contextual_prompt, &options).await;
        }

        let chunks = chunk_with_overlap(&current, budget, config.overlap_tokens);
        tracing::debug!(round, chunks = chunks.len(), "Reducing long-context input");

        let mut extractions = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            if cancel.is_cancelled() {
                return Ok(current);
            }
            let prompt = format!(
                "{contextual_prompt}\n\nExtract the information relevant to the \
                 objective above from the following material:\n\n{chunk}"
            );
            extractions.push(client.generate_text(&prompt, &options).await?);
        }
        current = extractions.join("\n\n");
    }

    // Round cap reached: consolidate whatever fits in one call.
    let head = chunk_with_overlap(&current, budget, 0)
        .into_iter()
        .next()
        .unwrap_or_default();
    consolidate(client, &head, contextual_prompt, &options).await
}

/// Final pass merging the surviving extractions into one coherent summary.
async fn consolidate(
    client: &dyn TextGenerator,
    text: &str,
    contextual_prompt: &str,
    options: &GenerateOptions,
) -> Result<String, PipelineError> {
    let prompt = format!(
        "{contextual_prompt}\n\nConsolidate the following notes into a single \
         coherent knowledge summary, keeping every fact needed for the \
         objective above:\n\n{text}"
    );
    Ok(client.generate_text(&prompt, options).await?)
}

/// Tokens a single chunk may occupy after reserving room for the answer
/// and the prompt framing.
fn chunk_budget(
    client: &dyn TextGenerator,
    contextual_prompt: &str,
    system_prompt: &str,
    config: &LcpConfig,
) -> usize {
    let framing = estimate_tokens(contextual_prompt) + estimate_tokens(system_prompt) + 64;
    let usable = client
        .context_window_tokens()
        .saturating_sub(config.max_generation_tokens as usize)
        .saturating_sub(framing);
    let fill = config.context_fill_percentage.clamp(1, 100) as usize;
    (usable * fill / 100).max(256)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mosaic_clients::ClientError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that answers every call with a fixed short string and
    /// counts invocations.
    struct FixedBackend {
        calls: AtomicUsize,
        window: usize,
    }

    impl FixedBackend {
        fn new(window: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                window,
            }
        }
        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for FixedBackend {
        async fn generate_text(
            &self,
            _prompt: &str,
            _options: &GenerateOptions,
        ) -> Result<String, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("summary".to_string())
        }

        async fn generate_structured(
            &self,
            _prompt: &str,
            _schema: &serde_json::Value,
            _options: &GenerateOptions,
        ) -> Result<serde_json::Value, ClientError> {
            unimplemented!("not used by the reduction loop")
        }

        fn context_window_tokens(&self) -> usize {
            self.window
        }
    }

    fn config() -> LcpConfig {
        LcpConfig {
            context_fill_percentage: 60,
            overlap_tokens: 8,
            max_generation_tokens: 128,
            max_rounds: 8,
        }
    }

    #[tokio::test]
    async fn empty_input_makes_no_model_calls() {
        let backend = FixedBackend::new(4096);
        let out = process(&backend, "  \n ", "goal", "sys", &config(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "");
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn small_input_is_a_single_consolidation_call() {
        let backend = FixedBackend::new(4096);
        let out = process(
            &backend,
            "a short note about something",
            "goal",
            "sys",
            &config(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(out, "summary");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn oversized_input_reduces_then_consolidates() {
        // Window 1024, gen 128, framing ~66 → budget ≈ (830 * 60%) ≈ 498
        // tokens; 4000 tokens of input needs a chunking round first.
        let backend = FixedBackend::new(1024);
        let input = "word ".repeat(3200); // 16000 chars ≈ 4000 tokens
        let out = process(&backend, &input, "goal", "sys", &config(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "summary");
        // Several chunk extractions plus exactly one consolidation.
        assert!(backend.call_count() > 2);
    }

    #[tokio::test]
    async fn cancellation_returns_current_text_without_finishing() {
        let backend = FixedBackend::new(1024);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let input = "word ".repeat(3200);
        let out = process(&backend, &input, "goal", "sys", &config(), &cancel)
            .await
            .unwrap();
        assert_eq!(out, input);
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn budget_is_never_zero() {
        let backend = FixedBackend::new(64); // window smaller than reservations
        let b = chunk_budget(&backend, "goal", "sys", &config());
        assert_eq!(b, 256);
    }
}
