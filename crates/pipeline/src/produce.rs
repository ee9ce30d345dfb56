//! The main production pipelines: knowledge extraction followed by deck,
//! storyboard, report, or book-outline generation, and the per-item media
//! pass.

use serde_json::{json, Value};

use mosaic_clients::GenerateOptions;
use mosaic_db::models::notebook::{Notebook, Tab};
use mosaic_db::models::status::NotebookKind;
use mosaic_db::repositories::NotebookRepo;
use mosaic_tasks::TaskHandle;

use crate::design::{
    self, generate_plan, placeholder_book, placeholder_deck, placeholder_script, BookPlan,
    DeckPlan, Orientation, ScriptPlan,
};
use crate::error::PipelineError;
use crate::lcp;
use crate::media::{self, MediaItem, MediaPass, DEFAULT_NEGATIVE_PROMPT};
use crate::PipelineContext;

const SYSTEM_PROMPT: &str =
    "You are a meticulous research and content-design assistant. Ground every \
     statement in the provided material and never invent sources.";

/// Distil the notebook's loaded artefacts into a bounded knowledge core.
///
/// A notebook without loaded artefacts yields an empty core; production can
/// still run from the user's prompt alone.
pub async fn knowledge_core(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook: &Notebook,
    prompt: Option<&str>,
) -> Result<String, PipelineError> {
    let material = notebook
        .artefacts
        .0
        .iter()
        .filter(|a| a.is_loaded)
        .map(|a| format!("## {}\n\n{}", a.filename, a.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let contextual = match prompt {
        Some(p) => format!("Objective: {}. Instruction: {p}", notebook.title),
        None => format!("Objective: {}", notebook.title),
    };
    lcp::process(
        ctx.clients.text.as_ref(),
        &material,
        &contextual,
        SYSTEM_PROMPT,
        &ctx.lcp,
        handle.cancellation_token(),
    )
    .await
}

/// Write `content` into the notebook's production tab, creating the tab on
/// first production. Returns the tab id.
pub async fn upsert_production_tab(
    ctx: &PipelineContext,
    notebook: &Notebook,
    title: &str,
    content: &str,
) -> Result<String, PipelineError> {
    if let Some(tab) = notebook.production_tab() {
        NotebookRepo::set_tab_content(&ctx.pool, notebook.id, &tab.id, content).await?;
        return Ok(tab.id.clone());
    }
    let kind = notebook
        .production_tab_kind()
        .ok_or_else(|| PipelineError::Validation("unknown notebook kind".into()))?;
    let tab = Tab::new(title, kind, content);
    NotebookRepo::add_tab(&ctx.pool, notebook.id, &tab).await?;
    Ok(tab.id)
}

/// Generate images and audio for every item, warn-and-continue per item.
///
/// Progress interpolates across `progress_range` so callers can embed the
/// pass into their own 0-100 scale.
pub async fn synthesize_media<T: MediaItem>(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook: &Notebook,
    items: &mut [T],
    style_preset: Option<&str>,
    orientation: Orientation,
    research: Option<&str>,
    progress_range: (i16, i16),
    pass: MediaPass,
) -> Result<(), PipelineError> {
    let assets_dir = ctx.data_root.assets_dir(&notebook.owner, notebook.id);
    let language = media::resolve_language(
        notebook.language.as_deref(),
        ctx.settings.language.as_deref(),
    )
    .to_string();
    let total = items.len().max(1);
    let (lo, hi) = progress_range;

    for (index, item) in items.iter_mut().enumerate() {
        if handle.is_cancelled() {
            break;
        }

        let visual = item.visual_prompt().to_string();
        if pass.wants_images() && !visual.trim().is_empty() {
            let prompt =
                media::fuse_image_prompt(&ctx.clients, &visual, research, style_preset).await;
            let negative = item
                .negative_prompt()
                .unwrap_or(DEFAULT_NEGATIVE_PROMPT)
                .to_string();
            match media::generate_item_image(
                &ctx.clients,
                &prompt,
                &negative,
                orientation,
                &assets_dir,
                notebook.id,
            )
            .await
            {
                Ok(Some(asset)) => {
                    let images = item.images_mut();
                    images.push(asset);
                    let selected = images.len() - 1;
                    item.set_selected_image(selected);
                }
                Ok(None) => {} // no image backend configured
                Err(e) => {
                    handle
                        .warn(format!("Image generation failed for item {index}: {e}"))
                        .await;
                }
            }
        }

        let speech = item.speech_text().to_string();
        if pass.wants_audio() && !speech.trim().is_empty() {
            match media::generate_item_audio(
                &ctx.clients,
                ctx.settings.voice_sample.as_deref(),
                &speech,
                &language,
                &assets_dir,
                notebook.id,
            )
            .await
            {
                Ok(url) => {
                    if url.is_some() {
                        item.set_audio(url);
                    }
                }
                Err(e) => {
                    handle
                        .warn(format!("Audio generation failed for item {index}: {e}"))
                        .await;
                }
            }
        }

        let progress =
            lo as i32 + ((index + 1) as i32 * (hi - lo) as i32) / total as i32;
        handle.set_progress(progress as i16).await;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

/// The default production for a notebook: a Markdown report for generic
/// notebooks, a full deck for slide notebooks; video and book notebooks
/// are routed to their dedicated pipelines.
pub async fn initial_process(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook: &Notebook,
    prompt: Option<&str>,
) -> Result<Value, PipelineError> {
    match notebook.kind() {
        Some(NotebookKind::YoutubeVideo) => generate_script(ctx, handle, notebook, prompt).await,
        Some(NotebookKind::BookBuilding) => {
            generate_book_plan(ctx, handle, notebook, prompt).await
        }
        Some(NotebookKind::SlidesMaking) => produce_deck(ctx, handle, notebook, prompt).await,
        _ => produce_report(ctx, handle, notebook, prompt).await,
    }
}

async fn produce_report(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook: &Notebook,
    prompt: Option<&str>,
) -> Result<Value, PipelineError> {
    handle.set_description("Extracting knowledge core").await;
    let core = knowledge_core(ctx, handle, notebook, prompt).await?;
    handle.set_progress(50).await;

    let content = if core.is_empty() && prompt.is_none() {
        "# Report\n\nNo sources or prompt were provided, nothing to produce.".to_string()
    } else {
        handle.set_description("Writing report").await;
        let request = format!(
            "Write a well-structured Markdown report.\n\nObjective: {}\n{}\n\nMaterial:\n{core}",
            notebook.title,
            prompt.map(|p| format!("Instruction: {p}")).unwrap_or_default(),
        );
        let options = GenerateOptions {
            system_prompt: Some(SYSTEM_PROMPT.to_string()),
            ..Default::default()
        };
        ctx.clients.text.generate_text(&request, &options).await?
    };

    let tab_id = upsert_production_tab(ctx, notebook, "Report", &content).await?;
    Ok(json!({"tab_id": tab_id}))
}

async fn produce_deck(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook: &Notebook,
    prompt: Option<&str>,
) -> Result<Value, PipelineError> {
    handle.set_description("Extracting knowledge core").await;
    let core = knowledge_core(ctx, handle, notebook, prompt).await?;
    handle.set_progress(30).await;

    handle.set_description("Designing the deck").await;
    let mut plan = if core.is_empty() && prompt.is_none() {
        placeholder_deck("No sources or prompt were provided")
    } else {
        let request = deck_request(notebook, prompt, &core);
        match generate_plan::<DeckPlan>(
            ctx.clients.text.as_ref(),
            &request,
            SYSTEM_PROMPT,
            &design::deck_schema(),
        )
        .await
        {
            Some(plan) if !plan.slides.is_empty() => plan,
            _ => {
                handle
                    .warn("Deck generation failed after all fallbacks, using placeholder")
                    .await;
                placeholder_deck("The model did not return a usable deck")
            }
        }
    };
    handle.set_progress(40).await;

    handle.set_description("Generating slide media").await;
    let orientation = plan.orientation;
    let style = plan.style_preset.clone();
    let research = if core.is_empty() { None } else { Some(core.as_str()) };
    synthesize_media(
        ctx,
        handle,
        notebook,
        &mut plan.slides,
        style.as_deref(),
        orientation,
        research,
        (40, 90),
        MediaPass::All,
    )
    .await?;

    let content = serde_json::to_string(&plan)?;
    let tab_id = upsert_production_tab(ctx, notebook, "Slides", &content).await?;
    Ok(json!({"tab_id": tab_id, "slides": plan.slides.len()}))
}

/// The scripted-video pipeline: storyboard design plus per-scene media.
pub async fn generate_script(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook: &Notebook,
    prompt: Option<&str>,
) -> Result<Value, PipelineError> {
    handle.set_description("Extracting knowledge core").await;
    let core = knowledge_core(ctx, handle, notebook, prompt).await?;
    handle.set_progress(30).await;

    handle.set_description("Writing the storyboard").await;
    let mut plan = if core.is_empty() && prompt.is_none() {
        placeholder_script("No sources or prompt were provided")
    } else {
        let request = format!(
            "Design a scene-by-scene video storyboard. Every scene needs a \
             title, narration text under `script`, and an `image_prompt` \
             describing its visual.\n\nObjective: {}\n{}\n\nKnowledge:\n{core}",
            notebook.title,
            prompt.map(|p| format!("Instruction: {p}")).unwrap_or_default(),
        );
        match generate_plan::<ScriptPlan>(
            ctx.clients.text.as_ref(),
            &request,
            SYSTEM_PROMPT,
            &design::script_schema(),
        )
        .await
        {
            Some(plan) if !plan.scenes.is_empty() => plan,
            _ => {
                handle
                    .warn("Storyboard generation failed after all fallbacks, using placeholder")
                    .await;
                placeholder_script("The model did not return a usable storyboard")
            }
        }
    };
    handle.set_progress(40).await;

    handle.set_description("Generating scene media").await;
    let orientation = plan.orientation;
    let style = plan.style_preset.clone();
    let research = if core.is_empty() { None } else { Some(core.as_str()) };
    synthesize_media(
        ctx,
        handle,
        notebook,
        &mut plan.scenes,
        style.as_deref(),
        orientation,
        research,
        (40, 90),
        MediaPass::All,
    )
    .await?;

    let content = serde_json::to_string(&plan)?;
    let tab_id = upsert_production_tab(ctx, notebook, "Storyboard", &content).await?;
    Ok(json!({"tab_id": tab_id, "scenes": plan.scenes.len()}))
}

/// The book pipeline's first stage: outline only, chapters are written
/// one at a time afterwards.
pub async fn generate_book_plan(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook: &Notebook,
    prompt: Option<&str>,
) -> Result<Value, PipelineError> {
    handle.set_description("Extracting knowledge core").await;
    let core = knowledge_core(ctx, handle, notebook, prompt).await?;
    handle.set_progress(50).await;

    handle.set_description("Outlining the book").await;
    let plan = if core.is_empty() && prompt.is_none() {
        placeholder_book("No sources or prompt were provided")
    } else {
        let request = format!(
            "Design a book outline with a title and chapters, each chapter \
             carrying a one-paragraph summary.\n\nObjective: {}\n{}\n\nKnowledge:\n{core}",
            notebook.title,
            prompt.map(|p| format!("Instruction: {p}")).unwrap_or_default(),
        );
        match generate_plan::<BookPlan>(
            ctx.clients.text.as_ref(),
            &request,
            SYSTEM_PROMPT,
            &design::book_schema(),
        )
        .await
        {
            Some(plan) if !plan.chapters.is_empty() => plan,
            _ => {
                handle
                    .warn("Outline generation failed after all fallbacks, using placeholder")
                    .await;
                placeholder_book("The model did not return a usable outline")
            }
        }
    };

    let content = serde_json::to_string(&plan)?;
    let tab_id = upsert_production_tab(ctx, notebook, "Book plan", &content).await?;
    Ok(json!({"tab_id": tab_id, "chapters": plan.chapters.len()}))
}

fn deck_request(notebook: &Notebook, prompt: Option<&str>, core: &str) -> String {
    format!(
        "Design a slide deck with between 3 and 20 slides. Every slide needs \
         a title, bullets, speaker `notes`, an `image_prompt` describing its \
         visual, and a `layout`.\n\nObjective: {}\n{}\n\nKnowledge:\n{core}",
        notebook.title,
        prompt.map(|p| format!("Instruction: {p}")).unwrap_or_default(),
    )
}
