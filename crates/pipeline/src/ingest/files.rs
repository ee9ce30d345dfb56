//! Local file ingestion: convert an uploaded document to Markdown-ish
//! text.
//!
//! Plain-text formats are read directly and HTML goes through the web
//! extractor. Binary document formats (PDF, office files) need an
//! external converter service, which is outside this crate; they are
//! reported as unsupported so the engine logs and moves on.

use std::path::Path;

use mosaic_db::models::notebook::Artefact;

use crate::error::PipelineError;
use crate::ingest::web::extract_main_content;

/// An uploaded file staged for ingestion.
#[derive(Debug, Clone)]
pub struct LocalFile {
    /// Staged location on disk.
    pub path: String,
    /// Original filename shown to the user; also the artefact key.
    pub filename: String,
}

/// Ingest one staged file as a `"File: <filename>"` artefact.
pub async fn convert_file(file: &LocalFile) -> Result<Artefact, PipelineError> {
    let content = convert_to_text(Path::new(&file.path), &file.filename).await?;
    if content.trim().is_empty() {
        return Err(PipelineError::Validation(format!(
            "{} contained no readable text",
            file.filename
        )));
    }
    Ok(Artefact {
        filename: format!("File: {}", file.filename),
        content,
        kind: "file".to_string(),
        is_loaded: true,
    })
}

async fn convert_to_text(path: &Path, filename: &str) -> Result<String, PipelineError> {
    match extension(filename).as_str() {
        "md" | "markdown" | "txt" | "text" | "rst" | "csv" | "json" | "yaml" | "yml" => {
            Ok(tokio::fs::read_to_string(path).await?)
        }
        "html" | "htm" => {
            let html = tokio::fs::read_to_string(path).await?;
            Ok(extract_main_content(&html))
        }
        other => Err(PipelineError::Validation(format!(
            "unsupported document format '.{other}' for {filename}; \
             a document converter backend is required"
        ))),
    }
}

fn extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(dir: &tempfile::TempDir, name: &str, content: &str) -> LocalFile {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        LocalFile {
            path: path.to_string_lossy().to_string(),
            filename: name.to_string(),
        }
    }

    #[tokio::test]
    async fn markdown_file_is_read_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let file = staged(&dir, "notes.md", "# Notes\n\ncontent");
        let artefact = convert_file(&file).await.unwrap();
        assert_eq!(artefact.filename, "File: notes.md");
        assert_eq!(artefact.content, "# Notes\n\ncontent");
        assert_eq!(artefact.kind, "file");
    }

    #[tokio::test]
    async fn html_file_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let file = staged(&dir, "page.html", "<body><p>hello</p></body>");
        let artefact = convert_file(&file).await.unwrap();
        assert_eq!(artefact.content, "hello");
    }

    #[tokio::test]
    async fn binary_format_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let file = staged(&dir, "paper.pdf", "%PDF-1.5");
        let err = convert_file(&file).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = staged(&dir, "empty.txt", "  \n ");
        assert!(convert_file(&file).await.is_err());
    }
}
