//! Notebook entity models: metadata, artefacts, and typed tabs.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use mosaic_core::types::{DbId, Timestamp};

use super::status::{NotebookKind, StatusId};

/// A named text blob attached to a notebook, usable as grounding material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artefact {
    /// Unique within the notebook; insertion is deduplicated on this key.
    pub filename: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_loaded: bool,
}

/// Content type of a notebook tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabKind {
    Slides,
    YoutubeStoryboard,
    BookPlan,
    Html,
    Code,
    Markdown,
}

/// A typed content holder inside a notebook.
///
/// `content` is plain Markdown for the markdown/html/code kinds and a JSON
/// string for the structured kinds (slides, storyboard, book plan).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tab {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: TabKind,
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl Tab {
    pub fn new(title: impl Into<String>, kind: TabKind, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            kind,
            content: content.into(),
            images: Vec::new(),
        }
    }
}

/// A row from the `notebooks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notebook {
    pub id: DbId,
    /// Username of the owning user.
    pub owner: String,
    pub title: String,
    pub kind_id: StatusId,
    pub language: Option<String>,
    /// Free text or a JSON blob holding production metadata.
    pub content: Option<String>,
    pub artefacts: Json<Vec<Artefact>>,
    pub tabs: Json<Vec<Tab>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Notebook {
    pub fn kind(&self) -> Option<NotebookKind> {
        NotebookKind::from_id(self.kind_id)
    }

    /// The tab kind that holds this notebook's production output.
    pub fn production_tab_kind(&self) -> Option<TabKind> {
        match self.kind()? {
            NotebookKind::Generic => Some(TabKind::Markdown),
            NotebookKind::SlidesMaking => Some(TabKind::Slides),
            NotebookKind::YoutubeVideo => Some(TabKind::YoutubeStoryboard),
            NotebookKind::BookBuilding => Some(TabKind::BookPlan),
        }
    }

    /// Find the main production tab. There is at most one per notebook;
    /// the first match wins if older data violates that.
    pub fn production_tab(&self) -> Option<&Tab> {
        let kind = self.production_tab_kind()?;
        self.tabs.0.iter().find(|t| t.kind == kind)
    }

    pub fn has_artefact(&self, filename: &str) -> bool {
        self.artefacts.0.iter().any(|a| a.filename == filename)
    }
}

/// Parameters for creating a notebook.
#[derive(Debug, Clone, Deserialize)]
pub struct NewNotebook {
    pub owner: String,
    pub title: String,
    pub kind: StatusId,
    pub language: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notebook_with(kind: NotebookKind, tabs: Vec<Tab>) -> Notebook {
        Notebook {
            id: 1,
            owner: "alice".into(),
            title: "t".into(),
            kind_id: kind.id(),
            language: None,
            content: None,
            artefacts: Json(vec![]),
            tabs: Json(tabs),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn tab_kind_serialises_snake_case() {
        let v = serde_json::to_value(TabKind::YoutubeStoryboard).unwrap();
        assert_eq!(v, "youtube_storyboard");
    }

    #[test]
    fn artefact_type_field_is_renamed() {
        let a = Artefact {
            filename: "Web: https://example.org".into(),
            content: "text".into(),
            kind: "web".into(),
            is_loaded: true,
        };
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["type"], "web");
    }

    #[test]
    fn production_tab_matches_notebook_kind() {
        let tab = Tab::new("Deck", TabKind::Slides, "{}");
        let nb = notebook_with(
            NotebookKind::SlidesMaking,
            vec![Tab::new("Notes", TabKind::Markdown, "x"), tab.clone()],
        );
        assert_eq!(nb.production_tab().unwrap().id, tab.id);
    }

    #[test]
    fn production_tab_absent_when_not_created_yet() {
        let nb = notebook_with(NotebookKind::YoutubeVideo, vec![]);
        assert!(nb.production_tab().is_none());
    }

    #[test]
    fn has_artefact_checks_filename() {
        let mut nb = notebook_with(NotebookKind::Generic, vec![]);
        nb.artefacts.0.push(Artefact {
            filename: "Wikipedia: Rust".into(),
            content: "...".into(),
            kind: "wikipedia".into(),
            is_loaded: true,
        });
        assert!(nb.has_artefact("Wikipedia: Rust"));
        assert!(!nb.has_artefact("Web: x"));
    }
}
