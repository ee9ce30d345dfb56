//! Media synthesis: per-item image and audio generation through the
//! pluggable backends.
//!
//! Asset filenames are randomised per call, so regeneration always adds a
//! variant instead of overwriting; the item's current choice is the
//! `selected_image_index` into its `images` list. A missing backend is a
//! normal condition: the helpers return `Ok(None)` and the caller leaves
//! the item without media.

use std::path::Path;

use mosaic_clients::{GenerateOptions, ModelClients};
use mosaic_core::paths::{asset_url, unique_asset_filename};
use mosaic_core::text::sanitize_for_tts;
use mosaic_core::types::DbId;

use crate::design::{MediaAsset, Orientation};
use crate::error::PipelineError;

/// Default exclusions for image generation.
pub const DEFAULT_NEGATIVE_PROMPT: &str =
    "text, letters, words, blurry, deformed, low quality, watermark";

/// Which media a synthesis pass produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaPass {
    All,
    ImagesOnly,
    AudioOnly,
}

impl MediaPass {
    pub fn wants_images(self) -> bool {
        matches!(self, Self::All | Self::ImagesOnly)
    }

    pub fn wants_audio(self) -> bool {
        matches!(self, Self::All | Self::AudioOnly)
    }
}

/// Mutable view over a slide or scene the media loops work with.
pub trait MediaItem {
    /// Visual description used as the image prompt base.
    fn visual_prompt(&self) -> &str;
    fn negative_prompt(&self) -> Option<&str>;
    /// Text spoken over the item (speaker notes or narration).
    fn speech_text(&self) -> &str;
    fn images_mut(&mut self) -> &mut Vec<MediaAsset>;
    fn set_selected_image(&mut self, index: usize);
    fn selected_image(&self) -> Option<&MediaAsset>;
    fn set_audio(&mut self, url: Option<String>);
    fn audio_url(&self) -> Option<&str>;
}

impl MediaItem for crate::design::Slide {
    fn visual_prompt(&self) -> &str {
        &self.image_prompt
    }
    fn negative_prompt(&self) -> Option<&str> {
        self.negative_image_prompt.as_deref()
    }
    fn speech_text(&self) -> &str {
        &self.notes
    }
    fn images_mut(&mut self) -> &mut Vec<MediaAsset> {
        &mut self.images
    }
    fn set_selected_image(&mut self, index: usize) {
        self.selected_image_index = Some(index);
    }
    fn selected_image(&self) -> Option<&MediaAsset> {
        let index = self.selected_image_index.or(self.images.len().checked_sub(1))?;
        self.images.get(index)
    }
    fn set_audio(&mut self, url: Option<String>) {
        self.audio_src = url;
    }
    fn audio_url(&self) -> Option<&str> {
        self.audio_src.as_deref()
    }
}

impl MediaItem for crate::design::Scene {
    fn visual_prompt(&self) -> &str {
        &self.image_prompt
    }
    fn negative_prompt(&self) -> Option<&str> {
        self.negative_image_prompt.as_deref()
    }
    fn speech_text(&self) -> &str {
        &self.script
    }
    fn images_mut(&mut self) -> &mut Vec<MediaAsset> {
        &mut self.images
    }
    fn set_selected_image(&mut self, index: usize) {
        self.selected_image_index = Some(index);
    }
    fn selected_image(&self) -> Option<&MediaAsset> {
        let index = self.selected_image_index.or(self.images.len().checked_sub(1))?;
        self.images.get(index)
    }
    fn set_audio(&mut self, url: Option<String>) {
        self.audio_src = url;
    }
    fn audio_url(&self) -> Option<&str> {
        self.audio_src.as_deref()
    }
}

/// Pick the output language: notebook setting, then user preference,
/// then English.
pub fn resolve_language<'a>(notebook: Option<&'a str>, user: Option<&'a str>) -> &'a str {
    notebook
        .filter(|l| !l.is_empty())
        .or(user.filter(|l| !l.is_empty()))
        .unwrap_or("en")
}

/// Fuse the item's visual description with research snippets (one extra
/// model call) and append the global style preset.
///
/// A failing fusion call falls back to the raw description; the image is
/// worth more than the polish.
pub async fn fuse_image_prompt(
    clients: &ModelClients,
    visual: &str,
    research: Option<&str>,
    style_preset: Option<&str>,
) -> String {
    let mut prompt = match research.filter(|r| !r.trim().is_empty()) {
        Some(research) => {
            let fusion_prompt = format!(
                "Rewrite this image description so it stays faithful to the \
                 research notes. Answer with the description only.\n\n\
                 Description: {visual}\n\nResearch notes: {research}"
            );
            match clients
                .text
                .generate_text(&fusion_prompt, &GenerateOptions::default())
                .await
            {
                Ok(fused) if !fused.trim().is_empty() => fused.trim().to_string(),
                Ok(_) => visual.to_string(),
                Err(e) => {
                    tracing::warn!(error = %e, "Prompt fusion failed, using raw description");
                    visual.to_string()
                }
            }
        }
        None => visual.to_string(),
    };
    if let Some(style) = style_preset.filter(|s| !s.trim().is_empty()) {
        prompt.push_str(", ");
        prompt.push_str(style);
    }
    prompt
}

/// Generate one image for an item and write it under the notebook's asset
/// directory.
///
/// Returns `Ok(None)` when no image backend is configured. Errors mean the
/// backend was present but the call or the write failed; callers log a
/// warning and continue with the remaining items.
pub async fn generate_item_image(
    clients: &ModelClients,
    prompt: &str,
    negative_prompt: &str,
    orientation: Orientation,
    assets_dir: &Path,
    notebook_id: DbId,
) -> Result<Option<MediaAsset>, PipelineError> {
    let Some(tti) = &clients.tti else {
        return Ok(None);
    };
    let (width, height) = orientation.dimensions();
    let bytes = tti
        .generate_image(prompt, Some(negative_prompt), width, height)
        .await?;

    tokio::fs::create_dir_all(assets_dir).await?;
    let filename = unique_asset_filename("img", "png");
    tokio::fs::write(assets_dir.join(&filename), &bytes).await?;

    Ok(Some(MediaAsset {
        path: asset_url(notebook_id, &filename),
        prompt: prompt.to_string(),
        negative_prompt: negative_prompt.to_string(),
        created_at: chrono::Utc::now(),
    }))
}

/// Synthesise speech for an item and write the WAV under the notebook's
/// asset directory.
///
/// Returns `Ok(None)` when no speech backend is configured, when the text
/// sanitises to nothing, or when the backend answers with a zero-length
/// file; the composer then falls back to a default still duration.
pub async fn generate_item_audio(
    clients: &ModelClients,
    voice_sample: Option<&str>,
    text: &str,
    language: &str,
    assets_dir: &Path,
    notebook_id: DbId,
) -> Result<Option<String>, PipelineError> {
    let Some(tts) = &clients.tts else {
        return Ok(None);
    };
    let cleaned = sanitize_for_tts(text);
    if cleaned.is_empty() {
        return Ok(None);
    }

    // The voice clone sample only counts when its file actually exists.
    let voice = voice_sample.filter(|sample| Path::new(sample).is_file());
    let bytes = tts.synthesize(&cleaned, voice, language).await?;
    if bytes.is_empty() {
        tracing::warn!("Speech backend produced a zero-length file, treating as no audio");
        return Ok(None);
    }

    tokio::fs::create_dir_all(assets_dir).await?;
    let filename = unique_asset_filename("audio", "wav");
    tokio::fs::write(assets_dir.join(&filename), &bytes).await?;
    Ok(Some(asset_url(notebook_id, &filename)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_fallback_chain() {
        assert_eq!(resolve_language(Some("fr"), Some("de")), "fr");
        assert_eq!(resolve_language(None, Some("de")), "de");
        assert_eq!(resolve_language(Some(""), Some("de")), "de");
        assert_eq!(resolve_language(None, None), "en");
        assert_eq!(resolve_language(Some(""), None), "en");
    }

    #[test]
    fn default_negative_prompt_excludes_text_artifacts() {
        assert!(DEFAULT_NEGATIVE_PROMPT.contains("watermark"));
        assert!(DEFAULT_NEGATIVE_PROMPT.contains("text"));
    }
}
