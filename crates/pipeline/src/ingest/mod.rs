//! Ingestion engine: fans out across source handlers and writes artefacts
//! into the notebook.
//!
//! Sources run in a fixed order (encyclopedia, web, video, files, papers)
//! and each completed source moves progress proportionally through 0-90%.
//! One failing source logs a warning and the engine continues; artefact
//! writes are idempotent by filename and committed per source, so a crash
//! or cancellation keeps everything acquired so far. At 95% the engine
//! chains the production task when there is anything to produce from.

pub mod files;
pub mod papers;
pub mod web;
pub mod wikipedia;
pub mod youtube;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use mosaic_core::types::DbId;
use mosaic_db::models::notebook::{Artefact, Notebook};
use mosaic_db::models::status::NotebookKind;
use mosaic_db::repositories::NotebookRepo;
use mosaic_tasks::TaskHandle;

use crate::error::PipelineError;
use crate::PipelineContext;

use files::LocalFile;
use papers::PaperSelection;

/// A video source with its preferred transcript language.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoSource {
    pub url: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// Everything one ingestion run works through.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub notebook_id: DbId,
    pub encyclopedia_refs: Vec<String>,
    pub urls: Vec<String>,
    pub videos: Vec<VideoSource>,
    pub files: Vec<LocalFile>,
    pub paper_queries: Vec<String>,
    pub selected_papers: Vec<PaperSelection>,
    /// Extra instruction carried into the chained production task.
    pub followup_prompt: Option<String>,
}

/// One unit of acquisition work.
enum Source {
    Encyclopedia(String),
    Web(String),
    Video(VideoSource),
    File(LocalFile),
    PaperSearch(String),
    Paper(PaperSelection),
}

impl Source {
    fn describe(&self) -> String {
        match self {
            Self::Encyclopedia(r) => format!("Fetching encyclopedia article: {r}"),
            Self::Web(url) => format!("Scraping page: {url}"),
            Self::Video(v) => format!("Fetching transcript: {}", v.url),
            Self::File(f) => format!("Converting file: {}", f.filename),
            Self::PaperSearch(q) => format!("Searching papers: {q}"),
            Self::Paper(p) => format!("Fetching paper: {}", p.entry_id),
        }
    }

    async fn acquire(&self, ctx: &PipelineContext) -> Result<Vec<Artefact>, PipelineError> {
        match self {
            Self::Encyclopedia(r) => Ok(vec![wikipedia::fetch_article(&ctx.http, r).await?]),
            Self::Web(url) => Ok(vec![web::fetch_web_page(&ctx.http, url).await?]),
            Self::Video(v) => Ok(vec![
                youtube::fetch_transcript(&ctx.http, &v.url, v.language.as_deref()).await?,
            ]),
            Self::File(f) => Ok(vec![files::convert_file(f).await?]),
            Self::PaperSearch(q) => {
                let results = papers::search_papers(&ctx.http, q).await?;
                if results.is_empty() {
                    return Ok(Vec::new());
                }
                let listing = results
                    .iter()
                    .map(|p| format!("- {} ({})", p.title, p.entry_id))
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(vec![Artefact {
                    filename: format!("Paper search: {q}"),
                    content: listing,
                    kind: "paper_search".to_string(),
                    is_loaded: false,
                }])
            }
            Self::Paper(p) => Ok(vec![papers::fetch_selected(&ctx.http, p).await?]),
        }
    }
}

/// Fixed-order acquisition plan for a request.
fn source_plan(request: &IngestRequest) -> Vec<Source> {
    let mut plan = Vec::new();
    plan.extend(request.encyclopedia_refs.iter().cloned().map(Source::Encyclopedia));
    plan.extend(request.urls.iter().cloned().map(Source::Web));
    plan.extend(request.videos.iter().cloned().map(Source::Video));
    plan.extend(request.files.iter().cloned().map(Source::File));
    plan.extend(request.paper_queries.iter().cloned().map(Source::PaperSearch));
    plan.extend(request.selected_papers.iter().cloned().map(Source::Paper));
    plan
}

/// Production action chained after a successful ingestion.
fn production_action(notebook: &Notebook) -> &'static str {
    match notebook.kind() {
        Some(NotebookKind::YoutubeVideo) => "generate_script",
        Some(NotebookKind::BookBuilding) => "generate_book_plan",
        _ => "initial_process",
    }
}

/// Run one ingestion as a task target.
pub async fn run_ingest(
    ctx: Arc<PipelineContext>,
    handle: &TaskHandle,
    request: IngestRequest,
) -> Result<Value, PipelineError> {
    let notebook = NotebookRepo::find_by_id(&ctx.pool, request.notebook_id)
        .await?
        .ok_or(PipelineError::NotebookNotFound(request.notebook_id))?;

    let plan = source_plan(&request);
    let total = plan.len();
    handle.set_file_info("", total as i32).await;

    let mut added = 0usize;
    let mut duplicates = 0usize;
    let mut failed = 0usize;

    for (index, source) in plan.iter().enumerate() {
        if handle.is_cancelled() {
            handle
                .info("Ingestion cancelled, keeping artefacts committed so far")
                .await;
            return Ok(json!({
                "artefacts_added": added,
                "cancelled": true,
            }));
        }

        handle.set_description(&source.describe()).await;
        match source.acquire(&ctx).await {
            Ok(artefacts) => {
                for artefact in artefacts {
                    if NotebookRepo::add_artefact(&ctx.pool, notebook.id, &artefact).await? {
                        added += 1;
                        handle
                            .info(format!("Added artefact '{}'", artefact.filename))
                            .await;
                    } else {
                        duplicates += 1;
                    }
                }
            }
            Err(e) => {
                failed += 1;
                handle.warn(format!("Source failed: {e}")).await;
            }
        }
        handle
            .set_progress((((index + 1) * 90) / total.max(1)) as i16)
            .await;
    }

    handle.set_progress(95).await;

    // Chain production when there is a prompt or any grounding material.
    let refreshed = NotebookRepo::find_by_id(&ctx.pool, notebook.id)
        .await?
        .ok_or(PipelineError::NotebookNotFound(notebook.id))?;
    let has_material = !refreshed.artefacts.0.is_empty();
    let chained_task = if request.followup_prompt.is_some() || has_material {
        let action = production_action(&refreshed);
        let params = json!({"prompt": request.followup_prompt});
        let chain_ctx = ctx.clone();
        let notebook_id = refreshed.id;
        let chained = handle
            .submit_chained(
                &format!("Produce: {}", refreshed.title),
                Some(&format!("Production ({action}) after ingestion")),
                Some(&refreshed.owner),
                move |child| async move {
                    crate::actions::run_action(&chain_ctx, &child, notebook_id, action, params)
                        .await
                        .map_err(Into::into)
                },
            )
            .await?;
        Some(chained)
    } else {
        handle
            .info("No prompt and no artefacts, skipping production")
            .await;
        None
    };

    Ok(json!({
        "artefacts_added": added,
        "duplicates": duplicates,
        "failed_sources": failed,
        "chained_task": chained_task,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_follows_the_fixed_source_order() {
        let request = IngestRequest {
            notebook_id: 1,
            encyclopedia_refs: vec!["Rust".into()],
            urls: vec!["https://a".into(), "https://b".into()],
            videos: vec![VideoSource {
                url: "https://youtu.be/abcDEF12345".into(),
                language: Some("fr".into()),
            }],
            files: vec![],
            paper_queries: vec!["qec".into()],
            selected_papers: vec![PaperSelection {
                entry_id: "2301.00001v1".into(),
                ingest_full: false,
            }],
            followup_prompt: None,
        };
        let plan = source_plan(&request);
        assert_eq!(plan.len(), 6);
        assert!(matches!(plan[0], Source::Encyclopedia(_)));
        assert!(matches!(plan[1], Source::Web(_)));
        assert!(matches!(plan[2], Source::Web(_)));
        assert!(matches!(plan[3], Source::Video(_)));
        assert!(matches!(plan[4], Source::PaperSearch(_)));
        assert!(matches!(plan[5], Source::Paper(_)));
    }

    #[test]
    fn empty_request_plans_nothing() {
        let plan = source_plan(&IngestRequest::default());
        assert!(plan.is_empty());
    }
}
