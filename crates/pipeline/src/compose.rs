//! Video composer: turns a deck or storyboard into one MP4.
//!
//! Each item becomes a still-image clip lasting as long as its audio (or a
//! default still duration when there is none); the clips are concatenated
//! with the ffmpeg concat demuxer. Per-item failures skip the item, so the
//! video is built from whatever survives.

use std::path::PathBuf;

use serde_json::{json, Value};

use mosaic_core::ffmpeg::{audio_duration_secs, concat_args, concat_list, run_ffmpeg, still_clip_args};
use mosaic_core::paths::asset_url;
use mosaic_core::types::DbId;
use mosaic_db::models::notebook::TabKind;
use mosaic_db::repositories::NotebookRepo;
use mosaic_tasks::TaskHandle;

use crate::design::{DeckPlan, Orientation, ScriptPlan};
use crate::error::PipelineError;
use crate::media::MediaItem;
use crate::PipelineContext;

/// Name of the composed video under the notebook's asset directory.
pub const OUTPUT_FILENAME: &str = "presentation.mp4";

/// Visual duration for items without audio.
pub const DEFAULT_STILL_SECS: f64 = 5.0;

/// What the composer needs from one slide or scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeItem {
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
}

/// Flatten plan items into their currently selected media references.
pub fn compose_items<T: MediaItem>(items: &[T]) -> Vec<ComposeItem> {
    items
        .iter()
        .map(|item| ComposeItem {
            image_url: item.selected_image().map(|a| a.path.clone()),
            audio_url: item.audio_url().map(str::to_string),
        })
        .collect()
}

/// Assemble the notebook's production tab into `assets/presentation.mp4`
/// and point the tab's `video_src` at it.
pub async fn compose_video(
    ctx: &PipelineContext,
    handle: &TaskHandle,
    notebook_id: DbId,
) -> Result<Value, PipelineError> {
    let notebook = NotebookRepo::find_by_id(&ctx.pool, notebook_id)
        .await?
        .ok_or(PipelineError::NotebookNotFound(notebook_id))?;
    let tab = notebook
        .production_tab()
        .cloned()
        .ok_or_else(|| PipelineError::Validation("notebook has no production tab".into()))?;

    let (items, orientation) = match tab.kind {
        TabKind::Slides => {
            let plan: DeckPlan = serde_json::from_str(&tab.content)
                .map_err(|e| PipelineError::Validation(format!("deck content is not valid: {e}")))?;
            (compose_items(&plan.slides), plan.orientation)
        }
        TabKind::YoutubeStoryboard => {
            let plan: ScriptPlan = serde_json::from_str(&tab.content).map_err(|e| {
                PipelineError::Validation(format!("storyboard content is not valid: {e}"))
            })?;
            (compose_items(&plan.scenes), plan.orientation)
        }
        _ => {
            return Err(PipelineError::Validation(
                "video composition needs a slides or storyboard tab".into(),
            ))
        }
    };

    let (width, height) = orientation.dimensions();
    let total = items.len();
    let workdir = tempfile::tempdir()?;
    let mut clips: Vec<PathBuf> = Vec::new();

    for (index, item) in items.iter().enumerate() {
        if handle.is_cancelled() {
            break;
        }
        handle
            .set_progress(((index * 80) / total.max(1)) as i16)
            .await;

        let Some(image_url) = &item.image_url else {
            handle
                .warn(format!("Item {index} has no image, skipping"))
                .await;
            continue;
        };
        let image = match ctx
            .data_root
            .resolve_asset_url(&notebook.owner, notebook_id, image_url)
        {
            Ok(path) if path.is_file() => path,
            Ok(path) => {
                handle
                    .warn(format!("Item {index} image missing on disk: {}", path.display()))
                    .await;
                continue;
            }
            Err(e) => {
                handle
                    .warn(format!("Item {index} has a broken image reference: {e}"))
                    .await;
                continue;
            }
        };

        // Zero-length or unreadable audio is treated as "no audio": the
        // clip gets the default still duration and nothing is muxed in.
        let (audio, duration) =
            match resolve_audio(ctx, &notebook.owner, notebook_id, item.audio_url.as_deref()) {
                Some(path) => match audio_duration_secs(&path).await {
                    Ok(secs) if secs > 0.0 => (Some(path), secs),
                    Ok(_) => (None, DEFAULT_STILL_SECS),
                    Err(e) => {
                        handle
                            .warn(format!(
                                "Item {index} audio unreadable ({e}), using still duration"
                            ))
                            .await;
                        (None, DEFAULT_STILL_SECS)
                    }
                },
                None => (None, DEFAULT_STILL_SECS),
            };

        let clip = workdir.path().join(format!("clip_{index:04}.mp4"));
        let args = still_clip_args(&image, audio.as_deref(), duration, width, height, &clip);
        if let Err(e) = run_ffmpeg(&args).await {
            handle
                .warn(format!("Item {index} clip encoding failed: {e}"))
                .await;
            continue;
        }
        clips.push(clip);
    }

    if clips.is_empty() {
        handle
            .warn("No items could be composed, no video was produced")
            .await;
        return Ok(json!({"video_src": null, "skipped": true}));
    }

    let list_path = workdir.path().join("concat.txt");
    let clip_refs: Vec<&std::path::Path> = clips.iter().map(PathBuf::as_path).collect();
    tokio::fs::write(&list_path, concat_list(&clip_refs)).await?;

    let assets_dir = ctx.data_root.assets_dir(&notebook.owner, notebook_id);
    tokio::fs::create_dir_all(&assets_dir).await?;
    let output = assets_dir.join(OUTPUT_FILENAME);
    run_ffmpeg(&concat_args(&list_path, &output)).await?;
    handle.set_progress(95).await;

    // Write video_src into the stored JSON without disturbing other keys.
    let video_src = asset_url(notebook_id, OUTPUT_FILENAME);
    let mut content: Value = serde_json::from_str(&tab.content)?;
    content["video_src"] = json!(video_src);
    NotebookRepo::set_tab_content(&ctx.pool, notebook_id, &tab.id, &content.to_string()).await?;

    handle
        .info(format!("Composed {} clips into {OUTPUT_FILENAME}", clips.len()))
        .await;
    Ok(json!({"video_src": video_src, "clips": clips.len()}))
}

/// Resolve an item's audio URL to an existing file, if any.
fn resolve_audio(
    ctx: &PipelineContext,
    owner: &str,
    notebook_id: DbId,
    audio_url: Option<&str>,
) -> Option<PathBuf> {
    let url = audio_url?;
    let path = ctx.data_root.resolve_asset_url(owner, notebook_id, url).ok()?;
    path.is_file().then_some(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{MediaAsset, Slide, SlideLayout};

    fn asset(path: &str) -> MediaAsset {
        MediaAsset {
            path: path.to_string(),
            prompt: "p".into(),
            negative_prompt: "n".into(),
            created_at: chrono::Utc::now(),
        }
    }

    fn slide(images: Vec<MediaAsset>, selected: Option<usize>, audio: Option<&str>) -> Slide {
        Slide {
            title: "t".into(),
            bullets: vec![],
            image_prompt: String::new(),
            negative_image_prompt: None,
            notes: String::new(),
            layout: SlideLayout::TitleImageBody,
            images,
            selected_image_index: selected,
            audio_src: audio.map(str::to_string),
        }
    }

    #[test]
    fn selected_index_picks_the_image() {
        let s = slide(vec![asset("/a"), asset("/b")], Some(0), None);
        let items = compose_items(&[s]);
        assert_eq!(items[0].image_url.as_deref(), Some("/a"));
    }

    #[test]
    fn missing_selection_defaults_to_latest_variant() {
        let s = slide(vec![asset("/a"), asset("/b")], None, Some("/audio.wav"));
        let items = compose_items(&[s]);
        assert_eq!(items[0].image_url.as_deref(), Some("/b"));
        assert_eq!(items[0].audio_url.as_deref(), Some("/audio.wav"));
    }

    #[test]
    fn item_without_images_has_no_url() {
        let s = slide(vec![], None, None);
        let items = compose_items(&[s]);
        assert!(items[0].image_url.is_none());
        assert!(items[0].audio_url.is_none());
    }
}
