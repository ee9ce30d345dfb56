//! Structured design stage: turns a knowledge core and a user objective
//! into a validated deck, storyboard, or book outline.
//!
//! Generation is a three-step ladder: schema-guided structured output,
//! then plain generation with robust JSON recovery, then a single
//! "generation failed" placeholder so downstream stages never see an
//! empty plan.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use mosaic_clients::{GenerateOptions, TextGenerator};
use mosaic_core::json_extract::extract_json;
use mosaic_core::types::Timestamp;

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// Visual arrangement of a slide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlideLayout {
    #[default]
    TitleImageBody,
    ImageOnly,
    TextOnly,
    TitleOnly,
}

/// Output frame orientation for the composed video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Landscape,
    /// Shorts / TikTok style vertical frame.
    Portrait,
}

impl Orientation {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Landscape => (1280, 720),
            Self::Portrait => (720, 1280),
        }
    }
}

/// One generated media variant attached to a slide or scene.
///
/// `path` is the asset URL form, never a filesystem path. Regeneration
/// appends a new variant instead of overwriting, so earlier variants stay
/// selectable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub path: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub created_at: Timestamp,
}

/// One slide of a deck plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slide {
    pub title: String,
    #[serde(default)]
    pub bullets: Vec<String>,
    #[serde(default)]
    pub image_prompt: String,
    #[serde(default)]
    pub negative_image_prompt: Option<String>,
    /// Speaker notes; also the TTS source text.
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub layout: SlideLayout,
    #[serde(default)]
    pub images: Vec<MediaAsset>,
    #[serde(default)]
    pub selected_image_index: Option<usize>,
    #[serde(default)]
    pub audio_src: Option<String>,
}

/// Top-level deck plan stored as the slides tab's JSON content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckPlan {
    pub slides: Vec<Slide>,
    /// Global visual style appended to every image prompt.
    #[serde(default)]
    pub style_preset: Option<String>,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub video_src: Option<String>,
}

/// One scene of a video storyboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub title: String,
    /// Narration text spoken over the scene.
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub image_prompt: String,
    #[serde(default)]
    pub negative_image_prompt: Option<String>,
    #[serde(default)]
    pub images: Vec<MediaAsset>,
    #[serde(default)]
    pub selected_image_index: Option<usize>,
    #[serde(default)]
    pub audio_src: Option<String>,
}

/// A presenter persona used by the scripted-video pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Personality {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub voice: Option<String>,
}

/// Top-level storyboard plan stored as the storyboard tab's JSON content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptPlan {
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub personalities: Vec<Personality>,
    #[serde(default)]
    pub style_preset: Option<String>,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub video_src: Option<String>,
}

/// One chapter of a book outline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Filled in by the write-chapter action, absent in a fresh outline.
    #[serde(default)]
    pub content: Option<String>,
}

/// Top-level book outline stored as the book tab's JSON content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookPlan {
    pub title: String,
    pub chapters: Vec<Chapter>,
}

// ---------------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------------

pub fn deck_schema() -> Value {
    json!({
        "type": "object",
        "required": ["slides"],
        "properties": {
            "slides": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["title", "bullets", "image_prompt", "notes", "layout"],
                    "properties": {
                        "title": {"type": "string"},
                        "bullets": {"type": "array", "items": {"type": "string"}},
                        "image_prompt": {"type": "string"},
                        "negative_image_prompt": {"type": ["string", "null"]},
                        "notes": {"type": "string"},
                        "layout": {
                            "type": "string",
                            "enum": ["TitleImageBody", "ImageOnly", "TextOnly", "TitleOnly"],
                        },
                    },
                },
            },
            "style_preset": {"type": ["string", "null"]},
        },
    })
}

pub fn script_schema() -> Value {
    json!({
        "type": "object",
        "required": ["scenes"],
        "properties": {
            "scenes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["title", "script", "image_prompt"],
                    "properties": {
                        "title": {"type": "string"},
                        "script": {"type": "string"},
                        "image_prompt": {"type": "string"},
                        "negative_image_prompt": {"type": ["string", "null"]},
                    },
                },
            },
            "style_preset": {"type": ["string", "null"]},
        },
    })
}

pub fn book_schema() -> Value {
    json!({
        "type": "object",
        "required": ["title", "chapters"],
        "properties": {
            "title": {"type": "string"},
            "chapters": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["title", "summary"],
                    "properties": {
                        "title": {"type": "string"},
                        "summary": {"type": "string"},
                    },
                },
            },
        },
    })
}

pub fn personalities_schema() -> Value {
    json!({
        "type": "object",
        "required": ["personalities"],
        "properties": {
            "personalities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "description"],
                    "properties": {
                        "name": {"type": "string"},
                        "description": {"type": "string"},
                        "voice": {"type": ["string", "null"]},
                    },
                },
            },
        },
    })
}

// ---------------------------------------------------------------------------
// Generation ladder
// ---------------------------------------------------------------------------

/// Attempt structured generation, then plain generation with robust JSON
/// recovery. Returns `None` when both rungs fail to produce a value that
/// deserializes into `T`.
pub async fn generate_plan<T: DeserializeOwned>(
    client: &dyn TextGenerator,
    prompt: &str,
    system_prompt: &str,
    schema: &Value,
) -> Option<T> {
    let options = GenerateOptions {
        system_prompt: Some(system_prompt.to_string()),
        ..Default::default()
    };

    match client.generate_structured(prompt, schema, &options).await {
        Ok(value) => {
            if let Ok(plan) = serde_json::from_value(value) {
                return Some(plan);
            }
            tracing::warn!("Structured output did not match the plan shape, retrying as raw JSON");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Structured generation failed, retrying as raw JSON");
        }
    }

    let raw_prompt =
        format!("{prompt}\n\nAnswer with raw JSON only. No prose, no code fences, no commentary.");
    let raw = client.generate_text(&raw_prompt, &options).await.ok()?;
    let value = extract_json(&raw)?;
    serde_json::from_value(value).ok()
}

/// Single-slide deck explaining that generation failed.
pub fn placeholder_deck(reason: &str) -> DeckPlan {
    DeckPlan {
        slides: vec![Slide {
            title: "Generation failed".to_string(),
            bullets: vec![reason.to_string()],
            image_prompt: String::new(),
            negative_image_prompt: None,
            notes: reason.to_string(),
            layout: SlideLayout::TextOnly,
            images: Vec::new(),
            selected_image_index: None,
            audio_src: None,
        }],
        style_preset: None,
        orientation: Orientation::default(),
        video_src: None,
    }
}

/// Single-scene storyboard explaining that generation failed.
pub fn placeholder_script(reason: &str) -> ScriptPlan {
    ScriptPlan {
        scenes: vec![Scene {
            title: "Generation failed".to_string(),
            script: reason.to_string(),
            image_prompt: String::new(),
            negative_image_prompt: None,
            images: Vec::new(),
            selected_image_index: None,
            audio_src: None,
        }],
        personalities: Vec::new(),
        style_preset: None,
        orientation: Orientation::default(),
        video_src: None,
    }
}

/// Single-chapter outline explaining that generation failed.
pub fn placeholder_book(reason: &str) -> BookPlan {
    BookPlan {
        title: "Generation failed".to_string(),
        chapters: vec![Chapter {
            title: "Generation failed".to_string(),
            summary: reason.to_string(),
            content: None,
        }],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mosaic_clients::ClientError;

    /// Backend scripted with fixed answers for both generation modes.
    struct Scripted {
        structured: Result<Value, ()>,
        text: String,
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate_text(
            &self,
            _prompt: &str,
            _options: &GenerateOptions,
        ) -> Result<String, ClientError> {
            Ok(self.text.clone())
        }

        async fn generate_structured(
            &self,
            _prompt: &str,
            _schema: &Value,
            _options: &GenerateOptions,
        ) -> Result<Value, ClientError> {
            self.structured
                .clone()
                .map_err(|_| ClientError::Backend("no structured mode".into()))
        }

        fn context_window_tokens(&self) -> usize {
            8192
        }
    }

    fn valid_deck_value() -> Value {
        json!({
            "slides": [{
                "title": "Intro",
                "bullets": ["one", "two"],
                "image_prompt": "a sunrise",
                "notes": "welcome",
                "layout": "TitleImageBody",
            }]
        })
    }

    #[tokio::test]
    async fn structured_mode_is_accepted_directly() {
        let backend = Scripted {
            structured: Ok(valid_deck_value()),
            text: String::new(),
        };
        let plan: DeckPlan = generate_plan(&backend, "make a deck", "sys", &deck_schema())
            .await
            .unwrap();
        assert_eq!(plan.slides.len(), 1);
        assert_eq!(plan.slides[0].layout, SlideLayout::TitleImageBody);
    }

    #[tokio::test]
    async fn json_buried_in_prose_is_recovered() {
        let backend = Scripted {
            structured: Err(()),
            text: format!("Sure! Here is the plan: {} hope it helps", valid_deck_value()),
        };
        let plan: DeckPlan = generate_plan(&backend, "make a deck", "sys", &deck_schema())
            .await
            .unwrap();
        assert_eq!(plan.slides[0].title, "Intro");
    }

    #[tokio::test]
    async fn total_garbage_yields_none() {
        let backend = Scripted {
            structured: Err(()),
            text: "I cannot help with that.".to_string(),
        };
        let plan: Option<DeckPlan> =
            generate_plan(&backend, "make a deck", "sys", &deck_schema()).await;
        assert!(plan.is_none());
    }

    #[test]
    fn placeholder_deck_is_a_single_text_slide() {
        let plan = placeholder_deck("backend unreachable");
        assert_eq!(plan.slides.len(), 1);
        assert_eq!(plan.slides[0].layout, SlideLayout::TextOnly);
        assert!(plan.slides[0].notes.contains("backend unreachable"));
    }

    #[test]
    fn deck_round_trips_through_extraction() {
        let plan = placeholder_deck("x");
        let rendered = serde_json::to_string(&plan).unwrap();
        let recovered = extract_json(&rendered).unwrap();
        let parsed: DeckPlan = serde_json::from_value(recovered).unwrap();
        assert_eq!(parsed.slides[0].title, plan.slides[0].title);
    }

    #[test]
    fn layout_serialises_as_variant_name() {
        assert_eq!(serde_json::to_value(SlideLayout::ImageOnly).unwrap(), "ImageOnly");
    }

    #[test]
    fn orientation_dimensions() {
        assert_eq!(Orientation::Landscape.dimensions(), (1280, 720));
        assert_eq!(Orientation::Portrait.dimensions(), (720, 1280));
    }

    #[test]
    fn missing_optional_slide_fields_default() {
        let raw = json!({"slides": [{"title": "t"}]});
        let plan: DeckPlan = serde_json::from_value(raw).unwrap();
        assert!(plan.slides[0].images.is_empty());
        assert!(plan.slides[0].selected_image_index.is_none());
        assert_eq!(plan.orientation, Orientation::Landscape);
    }
}
