//! Production action dispatch.
//!
//! The four full pipelines (initial process, script, book plan, chapter)
//! live in [`crate::produce`]; everything else here is a thin per-item
//! operation over the stored plan, run as its own task. Unknown action
//! names are rejected before any work starts.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use mosaic_clients::GenerateOptions;
use mosaic_core::types::DbId;
use mosaic_db::models::notebook::{Notebook, Tab, TabKind};
use mosaic_db::repositories::NotebookRepo;
use mosaic_tasks::TaskHandle;

use crate::design::{
    self, generate_plan, BookPlan, DeckPlan, Personality, ScriptPlan, Slide,
};
use crate::error::PipelineError;
use crate::media::{self, MediaItem, MediaPass, DEFAULT_NEGATIVE_PROMPT};
use crate::produce;
use crate::PipelineContext;

/// Everything the `process` operation can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionAction {
    InitialProcess,
    GenerateScript,
    GenerateBookPlan,
    WriteBookChapter,
    GenerateSlidesText,
    Images,
    RefineImage,
    GenerateNotes,
    GenerateSlideTitle,
    GenerateSlideHtml,
    GenerateAudio,
    AddFullSlide,
    GeneratePersonalities,
    RegeneratePersonality,
    GenerateSceneImage,
    GenerateAnimation,
}

impl ProductionAction {
    pub fn parse(name: &str) -> Option<Self> {
        serde_json::from_value(Value::String(name.to_string())).ok()
    }
}

/// Run one production action as a task target.
pub async fn run_action(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook_id: DbId,
    action: &str,
    params: Value,
) -> Result<Value, PipelineError> {
    let Some(action) = ProductionAction::parse(action) else {
        return Err(PipelineError::Validation(format!(
            "unknown production action '{action}'"
        )));
    };
    let notebook = NotebookRepo::find_by_id(&ctx.pool, notebook_id)
        .await?
        .ok_or(PipelineError::NotebookNotFound(notebook_id))?;
    let prompt = params["prompt"].as_str().map(str::to_string);

    match action {
        ProductionAction::InitialProcess => {
            produce::initial_process(ctx, handle, &notebook, prompt.as_deref()).await
        }
        ProductionAction::GenerateScript => {
            produce::generate_script(ctx, handle, &notebook, prompt.as_deref()).await
        }
        ProductionAction::GenerateBookPlan => {
            produce::generate_book_plan(ctx, handle, &notebook, prompt.as_deref()).await
        }
        ProductionAction::WriteBookChapter => {
            write_book_chapter(ctx, handle, &notebook, &params).await
        }
        ProductionAction::GenerateSlidesText => {
            generate_slides_text(ctx, handle, &notebook, prompt.as_deref()).await
        }
        ProductionAction::Images => {
            media_pass(ctx, handle, &notebook, MediaPass::ImagesOnly).await
        }
        ProductionAction::GenerateAudio => {
            media_pass(ctx, handle, &notebook, MediaPass::AudioOnly).await
        }
        ProductionAction::RefineImage => refine_image(ctx, handle, &notebook, &params).await,
        ProductionAction::GenerateNotes => generate_notes(ctx, handle, &notebook, &params).await,
        ProductionAction::GenerateSlideTitle => {
            generate_slide_title(ctx, &notebook, &params).await
        }
        ProductionAction::GenerateSlideHtml => {
            generate_slide_html(ctx, &notebook, &params).await
        }
        ProductionAction::AddFullSlide => add_full_slide(ctx, handle, &notebook, &params).await,
        ProductionAction::GeneratePersonalities => {
            generate_personalities(ctx, &notebook, prompt.as_deref()).await
        }
        ProductionAction::RegeneratePersonality => {
            regenerate_personality(ctx, &notebook, &params).await
        }
        ProductionAction::GenerateSceneImage => {
            generate_scene_image(ctx, handle, &notebook, &params).await
        }
        ProductionAction::GenerateAnimation => {
            handle
                .warn("No animation backend is configured, skipping")
                .await;
            Ok(json!({"skipped": true}))
        }
    }
}

// ---------------------------------------------------------------------------
// Plan loading helpers
// ---------------------------------------------------------------------------

fn production_tab(notebook: &Notebook) -> Result<&Tab, PipelineError> {
    notebook
        .production_tab()
        .ok_or_else(|| PipelineError::Validation("notebook has no production tab yet".into()))
}

fn load_deck(notebook: &Notebook) -> Result<(Tab, DeckPlan), PipelineError> {
    let tab = production_tab(notebook)?;
    if tab.kind != TabKind::Slides {
        return Err(PipelineError::Validation(
            "this action needs a slides notebook".into(),
        ));
    }
    let plan = serde_json::from_str(&tab.content)
        .map_err(|e| PipelineError::Validation(format!("deck content is not valid: {e}")))?;
    Ok((tab.clone(), plan))
}

fn load_script(notebook: &Notebook) -> Result<(Tab, ScriptPlan), PipelineError> {
    let tab = production_tab(notebook)?;
    if tab.kind != TabKind::YoutubeStoryboard {
        return Err(PipelineError::Validation(
            "this action needs a video notebook".into(),
        ));
    }
    let plan = serde_json::from_str(&tab.content)
        .map_err(|e| PipelineError::Validation(format!("storyboard content is not valid: {e}")))?;
    Ok((tab.clone(), plan))
}

fn load_book(notebook: &Notebook) -> Result<(Tab, BookPlan), PipelineError> {
    let tab = production_tab(notebook)?;
    if tab.kind != TabKind::BookPlan {
        return Err(PipelineError::Validation(
            "this action needs a book notebook".into(),
        ));
    }
    let plan = serde_json::from_str(&tab.content)
        .map_err(|e| PipelineError::Validation(format!("book content is not valid: {e}")))?;
    Ok((tab.clone(), plan))
}

async fn save_plan<T: Serialize>(
    ctx: &PipelineContext,
    notebook_id: DbId,
    tab_id: &str,
    plan: &T,
) -> Result<(), PipelineError> {
    let content = serde_json::to_string(plan)?;
    NotebookRepo::set_tab_content(&ctx.pool, notebook_id, tab_id, &content).await?;
    Ok(())
}

fn index_param(params: &Value, key: &str) -> Result<usize, PipelineError> {
    params[key]
        .as_u64()
        .map(|v| v as usize)
        .ok_or_else(|| PipelineError::Validation(format!("missing or invalid '{key}'")))
}

fn text_options() -> GenerateOptions {
    GenerateOptions {
        system_prompt: Some(
            "You are a precise content editor. Answer with the requested text only.".to_string(),
        ),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Thin per-item operations
// ---------------------------------------------------------------------------

async fn write_book_chapter(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook: &Notebook,
    params: &Value,
) -> Result<Value, PipelineError> {
    let index = index_param(params, "chapter_index")?;
    let (tab, mut plan) = load_book(notebook)?;
    if index >= plan.chapters.len() {
        return Err(PipelineError::Validation(format!(
            "chapter {index} does not exist"
        )));
    }

    handle.set_description("Extracting knowledge core").await;
    let core = produce::knowledge_core(ctx, handle, notebook, None).await?;
    handle.set_progress(40).await;

    let outline = plan
        .chapters
        .iter()
        .map(|c| format!("- {}: {}", c.title, c.summary))
        .collect::<Vec<_>>()
        .join("\n");
    let chapter = &plan.chapters[index];
    handle
        .set_description(&format!("Writing chapter: {}", chapter.title))
        .await;
    let request = format!(
        "Write the full Markdown text of one book chapter.\n\nBook: {}\n\
         Outline:\n{outline}\n\nChapter to write: {} ({})\n\nKnowledge:\n{core}",
        plan.title, chapter.title, chapter.summary,
    );
    let text = ctx
        .clients
        .text
        .generate_text(&request, &text_options())
        .await?;

    plan.chapters[index].content = Some(text);
    save_plan(ctx, notebook.id, &tab.id, &plan).await?;
    Ok(json!({"chapter": index}))
}

/// Regenerate the deck's textual content while keeping existing media,
/// matched by slide position.
async fn generate_slides_text(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook: &Notebook,
    prompt: Option<&str>,
) -> Result<Value, PipelineError> {
    let (tab, old) = load_deck(notebook)?;

    handle.set_description("Extracting knowledge core").await;
    let core = produce::knowledge_core(ctx, handle, notebook, prompt).await?;
    handle.set_progress(40).await;

    handle.set_description("Rewriting slide text").await;
    let request = format!(
        "Rewrite this slide deck's textual content (titles, bullets, notes, \
         image prompts). Keep the slide count close to the current {}.\n\n\
         Objective: {}\n{}\n\nKnowledge:\n{core}",
        old.slides.len(),
        notebook.title,
        prompt.map(|p| format!("Instruction: {p}")).unwrap_or_default(),
    );
    let mut plan = generate_plan::<DeckPlan>(
        ctx.clients.text.as_ref(),
        &request,
        "You are a meticulous slide-deck editor.",
        &design::deck_schema(),
    )
    .await
    .filter(|p| !p.slides.is_empty())
    .ok_or_else(|| PipelineError::Validation("the model did not return a usable deck".into()))?;

    for (index, slide) in plan.slides.iter_mut().enumerate() {
        if let Some(previous) = old.slides.get(index) {
            slide.images = previous.images.clone();
            slide.selected_image_index = previous.selected_image_index;
            slide.audio_src = previous.audio_src.clone();
        }
    }
    plan.style_preset = old.style_preset.clone();
    plan.orientation = old.orientation;
    plan.video_src = old.video_src.clone();

    save_plan(ctx, notebook.id, &tab.id, &plan).await?;
    Ok(json!({"slides": plan.slides.len()}))
}

/// Run an image-only or audio-only media pass over every plan item.
async fn media_pass(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook: &Notebook,
    pass: MediaPass,
) -> Result<Value, PipelineError> {
    let tab = production_tab(notebook)?.clone();
    match tab.kind {
        TabKind::Slides => {
            let (_, mut plan) = load_deck(notebook)?;
            let orientation = plan.orientation;
            let style = plan.style_preset.clone();
            produce::synthesize_media(
                ctx,
                handle,
                notebook,
                &mut plan.slides,
                style.as_deref(),
                orientation,
                None,
                (0, 95),
                pass,
            )
            .await?;
            save_plan(ctx, notebook.id, &tab.id, &plan).await?;
            Ok(json!({"items": plan.slides.len()}))
        }
        TabKind::YoutubeStoryboard => {
            let (_, mut plan) = load_script(notebook)?;
            let orientation = plan.orientation;
            let style = plan.style_preset.clone();
            produce::synthesize_media(
                ctx,
                handle,
                notebook,
                &mut plan.scenes,
                style.as_deref(),
                orientation,
                None,
                (0, 95),
                pass,
            )
            .await?;
            save_plan(ctx, notebook.id, &tab.id, &plan).await?;
            Ok(json!({"items": plan.scenes.len()}))
        }
        _ => Err(PipelineError::Validation(
            "media passes need a slides or video notebook".into(),
        )),
    }
}

/// Generate one more image variant steered by user instructions and make
/// it the selection.
async fn refine_image(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook: &Notebook,
    params: &Value,
) -> Result<Value, PipelineError> {
    let index = index_param(params, "item_index")?;
    let instructions = params["instructions"].as_str().unwrap_or_default();
    if ctx.clients.tti.is_none() {
        handle.warn("No image backend is configured, skipping").await;
        return Ok(json!({"skipped": true}));
    }

    let tab = production_tab(notebook)?.clone();
    let assets_dir = ctx.data_root.assets_dir(&notebook.owner, notebook.id);

    macro_rules! refine_item {
        ($plan:expr, $items:expr, $orientation:expr, $style:expr) => {{
            let item = $items.get_mut(index).ok_or_else(|| {
                PipelineError::Validation(format!("item {index} does not exist"))
            })?;
            let base = item
                .selected_image()
                .map(|a| a.prompt.clone())
                .unwrap_or_else(|| item.visual_prompt().to_string());
            let prompt = if instructions.trim().is_empty() {
                base
            } else {
                format!("{base}, {instructions}")
            };
            let prompt =
                media::fuse_image_prompt(&ctx.clients, &prompt, None, $style.as_deref()).await;
            let negative = item
                .negative_prompt()
                .unwrap_or(DEFAULT_NEGATIVE_PROMPT)
                .to_string();
            let asset = media::generate_item_image(
                &ctx.clients,
                &prompt,
                &negative,
                $orientation,
                &assets_dir,
                notebook.id,
            )
            .await?
            .ok_or_else(|| {
                PipelineError::Validation("no image backend is configured".into())
            })?;
            let images = item.images_mut();
            images.push(asset);
            let selected = images.len() - 1;
            item.set_selected_image(selected);
            save_plan(ctx, notebook.id, &tab.id, &$plan).await?;
            Ok(json!({"item": index, "selected_image_index": selected}))
        }};
    }

    match tab.kind {
        TabKind::Slides => {
            let (_, mut plan) = load_deck(notebook)?;
            let orientation = plan.orientation;
            let style = plan.style_preset.clone();
            refine_item!(plan, plan.slides, orientation, style)
        }
        TabKind::YoutubeStoryboard => {
            let (_, mut plan) = load_script(notebook)?;
            let orientation = plan.orientation;
            let style = plan.style_preset.clone();
            refine_item!(plan, plan.scenes, orientation, style)
        }
        _ => Err(PipelineError::Validation(
            "image refinement needs a slides or video notebook".into(),
        )),
    }
}

async fn generate_notes(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook: &Notebook,
    params: &Value,
) -> Result<Value, PipelineError> {
    let (tab, mut plan) = load_deck(notebook)?;
    let only = params["item_index"].as_u64().map(|v| v as usize);
    let mut updated = 0usize;

    for (index, slide) in plan.slides.iter_mut().enumerate() {
        if only.is_some_and(|i| i != index) {
            continue;
        }
        if handle.is_cancelled() {
            break;
        }
        let request = format!(
            "Write concise speaker notes for this slide.\n\nTitle: {}\nBullets:\n{}",
            slide.title,
            slide
                .bullets
                .iter()
                .map(|b| format!("- {b}"))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        match ctx
            .clients
            .text
            .generate_text(&request, &text_options())
            .await
        {
            Ok(notes) => {
                slide.notes = notes.trim().to_string();
                updated += 1;
            }
            Err(e) => {
                handle
                    .warn(format!("Notes generation failed for slide {index}: {e}"))
                    .await;
            }
        }
    }

    save_plan(ctx, notebook.id, &tab.id, &plan).await?;
    Ok(json!({"updated": updated}))
}

async fn generate_slide_title(
    ctx: &PipelineContext,
    notebook: &Notebook,
    params: &Value,
) -> Result<Value, PipelineError> {
    let index = index_param(params, "item_index")?;
    let (tab, mut plan) = load_deck(notebook)?;
    let slide = plan
        .slides
        .get_mut(index)
        .ok_or_else(|| PipelineError::Validation(format!("slide {index} does not exist")))?;

    let request = format!(
        "Write a short, punchy title for a slide with this content. Answer \
         with the title only.\n\nBullets:\n{}\n\nNotes: {}",
        slide
            .bullets
            .iter()
            .map(|b| format!("- {b}"))
            .collect::<Vec<_>>()
            .join("\n"),
        slide.notes,
    );
    let title = ctx
        .clients
        .text
        .generate_text(&request, &text_options())
        .await?;
    slide.title = title.trim().trim_matches('"').to_string();

    save_plan(ctx, notebook.id, &tab.id, &plan).await?;
    Ok(json!({"item": index, "title": plan.slides[index].title}))
}

/// Render one slide as a standalone HTML tab.
async fn generate_slide_html(
    ctx: &PipelineContext,
    notebook: &Notebook,
    params: &Value,
) -> Result<Value, PipelineError> {
    let index = index_param(params, "item_index")?;
    let (_, plan) = load_deck(notebook)?;
    let slide = plan
        .slides
        .get(index)
        .ok_or_else(|| PipelineError::Validation(format!("slide {index} does not exist")))?;

    let request = format!(
        "Render this slide as a single self-contained HTML page. Answer with \
         the HTML only.\n\nTitle: {}\nBullets:\n{}\nNotes: {}",
        slide.title,
        slide
            .bullets
            .iter()
            .map(|b| format!("- {b}"))
            .collect::<Vec<_>>()
            .join("\n"),
        slide.notes,
    );
    let html = ctx
        .clients
        .text
        .generate_text(&request, &text_options())
        .await?;

    let tab = Tab::new(format!("Slide {}: HTML", index + 1), TabKind::Html, html);
    NotebookRepo::add_tab(&ctx.pool, notebook.id, &tab).await?;
    Ok(json!({"tab_id": tab.id}))
}

/// Design one extra slide about a topic and insert it into the deck.
async fn add_full_slide(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook: &Notebook,
    params: &Value,
) -> Result<Value, PipelineError> {
    let topic = params["topic"]
        .as_str()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| PipelineError::Validation("missing 'topic'".into()))?;
    let (tab, mut plan) = load_deck(notebook)?;

    let request = format!(
        "Design one slide about the topic below, fitting this deck.\n\n\
         Deck objective: {}\nTopic: {topic}",
        notebook.title,
    );
    let slide_schema = design::deck_schema()["properties"]["slides"]["items"].clone();
    let mut slide = generate_plan::<Slide>(
        ctx.clients.text.as_ref(),
        &request,
        "You are a meticulous slide-deck editor.",
        &slide_schema,
    )
    .await
    .ok_or_else(|| PipelineError::Validation("the model did not return a usable slide".into()))?;

    let orientation = plan.orientation;
    let style = plan.style_preset.clone();
    produce::synthesize_media(
        ctx,
        handle,
        notebook,
        std::slice::from_mut(&mut slide),
        style.as_deref(),
        orientation,
        None,
        (50, 90),
        MediaPass::All,
    )
    .await?;

    let position = params["position"]
        .as_u64()
        .map(|v| v as usize)
        .unwrap_or(plan.slides.len())
        .min(plan.slides.len());
    plan.slides.insert(position, slide);

    save_plan(ctx, notebook.id, &tab.id, &plan).await?;
    Ok(json!({"position": position, "slides": plan.slides.len()}))
}

async fn generate_personalities(
    ctx: &PipelineContext,
    notebook: &Notebook,
    prompt: Option<&str>,
) -> Result<Value, PipelineError> {
    let (tab, mut plan) = load_script(notebook)?;

    #[derive(serde::Deserialize)]
    struct PersonalityList {
        personalities: Vec<Personality>,
    }

    let request = format!(
        "Invent two or three distinct presenter personalities for this video \
         (name, one-paragraph description each).\n\nVideo: {}\n{}",
        notebook.title,
        prompt.map(|p| format!("Instruction: {p}")).unwrap_or_default(),
    );
    let list = generate_plan::<PersonalityList>(
        ctx.clients.text.as_ref(),
        &request,
        "You are a creative casting director.",
        &design::personalities_schema(),
    )
    .await
    .filter(|l| !l.personalities.is_empty())
    .ok_or_else(|| {
        PipelineError::Validation("the model did not return usable personalities".into())
    })?;

    plan.personalities = list.personalities;
    save_plan(ctx, notebook.id, &tab.id, &plan).await?;
    Ok(json!({"personalities": plan.personalities.len()}))
}

async fn regenerate_personality(
    ctx: &PipelineContext,
    notebook: &Notebook,
    params: &Value,
) -> Result<Value, PipelineError> {
    let index = index_param(params, "item_index")?;
    let (tab, mut plan) = load_script(notebook)?;
    let current = plan.personalities.get(index).ok_or_else(|| {
        PipelineError::Validation(format!("personality {index} does not exist"))
    })?;

    let others = plan
        .personalities
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, p)| p.name.clone())
        .collect::<Vec<_>>()
        .join(", ");
    let request = format!(
        "Replace the presenter personality '{}' with a fresh one that \
         contrasts with: {others}. Answer as JSON with a single-element \
         `personalities` array.",
        current.name,
    );
    #[derive(serde::Deserialize)]
    struct PersonalityList {
        personalities: Vec<Personality>,
    }
    let list = generate_plan::<PersonalityList>(
        ctx.clients.text.as_ref(),
        &request,
        "You are a creative casting director.",
        &design::personalities_schema(),
    )
    .await
    .filter(|l| !l.personalities.is_empty())
    .ok_or_else(|| {
        PipelineError::Validation("the model did not return a usable personality".into())
    })?;

    plan.personalities[index] = list.personalities.into_iter().next().ok_or_else(|| {
        PipelineError::Validation("the model did not return a usable personality".into())
    })?;
    save_plan(ctx, notebook.id, &tab.id, &plan).await?;
    Ok(json!({"item": index}))
}

async fn generate_scene_image(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook: &Notebook,
    params: &Value,
) -> Result<Value, PipelineError> {
    let index = index_param(params, "item_index")?;
    let (tab, mut plan) = load_script(notebook)?;
    if index >= plan.scenes.len() {
        return Err(PipelineError::Validation(format!(
            "scene {index} does not exist"
        )));
    }

    let orientation = plan.orientation;
    let style = plan.style_preset.clone();
    produce::synthesize_media(
        ctx,
        handle,
        notebook,
        &mut plan.scenes[index..=index],
        style.as_deref(),
        orientation,
        None,
        (10, 90),
        MediaPass::ImagesOnly,
    )
    .await?;

    save_plan(ctx, notebook.id, &tab.id, &plan).await?;
    Ok(json!({"item": index}))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_documented_action_parses() {
        for name in [
            "initial_process",
            "generate_script",
            "generate_book_plan",
            "write_book_chapter",
            "generate_slides_text",
            "images",
            "refine_image",
            "generate_notes",
            "generate_slide_title",
            "generate_slide_html",
            "generate_audio",
            "add_full_slide",
            "generate_personalities",
            "regenerate_personality",
            "generate_scene_image",
            "generate_animation",
        ] {
            assert!(ProductionAction::parse(name).is_some(), "{name} should parse");
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(ProductionAction::parse("rm_rf_everything").is_none());
        assert!(ProductionAction::parse("").is_none());
        assert!(ProductionAction::parse("InitialProcess").is_none());
    }

    #[test]
    fn index_param_requires_a_number() {
        assert_eq!(index_param(&json!({"item_index": 3}), "item_index").unwrap(), 3);
        assert!(index_param(&json!({"item_index": "3"}), "item_index").is_err());
        assert!(index_param(&json!({}), "item_index").is_err());
    }
}
