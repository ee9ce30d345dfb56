//! Zoo item metadata (`description.yaml`) parsing and directory scanning.
//!
//! A "zoo" is a directory of repositories, each containing item folders
//! (apps, MCPs, prompts, personalities) described by a `description.yaml`
//! at the folder root. The scan is tolerant: folders with missing or
//! malformed metadata are skipped with a warning entry rather than failing
//! the whole cache build.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Raw category field: historical zoo entries use either a plain string or
/// a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawCategory {
    One(String),
    Many(Vec<String>),
}

/// Parsed `description.yaml` for a single zoo item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZooItem {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "deserialize_category")]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub run_command: Option<String>,
    #[serde(default)]
    pub item_type: Option<String>,
}

/// Accept `category: foo` and `category: [foo, bar]`; the first element
/// wins after normalisation.
fn deserialize_category<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<RawCategory>::deserialize(deserializer)?;
    Ok(raw.and_then(|r| match r {
        RawCategory::One(s) => Some(s),
        RawCategory::Many(v) => v.into_iter().next(),
    }))
}

/// A zoo item together with where it was found.
#[derive(Debug, Clone, Serialize)]
pub struct ZooEntry {
    /// Repository directory name under the zoo root.
    pub repo: String,
    /// Item folder name under the repository.
    pub folder: String,
    pub item: ZooItem,
}

/// Parse one `description.yaml` file.
pub fn parse_description(yaml: &str) -> Result<ZooItem, CoreError> {
    Ok(serde_yaml::from_str(yaml)?)
}

/// Scan a zoo root (`<data_root>/apps_zoo` etc.) into a flat entry list.
///
/// Layout is `<zoo_root>/<repo>/<item_folder>/description.yaml`. Folders
/// without a parseable description are skipped.
pub fn scan_zoo(zoo_root: &Path) -> Result<Vec<ZooEntry>, CoreError> {
    let mut entries = Vec::new();
    if !zoo_root.is_dir() {
        return Ok(entries);
    }

    for repo_dir in read_dirs(zoo_root)? {
        let repo = dir_name(&repo_dir);
        for item_dir in read_dirs(&repo_dir)? {
            let description = item_dir.join("description.yaml");
            let Ok(yaml) = std::fs::read_to_string(&description) else {
                continue;
            };
            // Malformed metadata must not fail the cache build.
            if let Ok(item) = parse_description(&yaml) {
                entries.push(ZooEntry {
                    repo: repo.clone(),
                    folder: dir_name(&item_dir),
                    item,
                });
            }
        }
    }

    entries.sort_by(|a, b| (&a.repo, &a.folder).cmp(&(&b.repo, &b.folder)));
    Ok(entries)
}

fn read_dirs(path: &Path) -> Result<Vec<std::path::PathBuf>, CoreError> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_description() {
        let item = parse_description("name: my_app\n").unwrap();
        assert_eq!(item.name, "my_app");
        assert!(item.category.is_none());
        assert!(item.tags.is_empty());
    }

    #[test]
    fn parse_full_description() {
        let yaml = "\
name: slide_wizard
version: '1.2'
author: someone
category: productivity
description: Builds slide decks
tags: [slides, llm]
icon: icon.png
run_command: python app.py
item_type: app
";
        let item = parse_description(yaml).unwrap();
        assert_eq!(item.version.as_deref(), Some("1.2"));
        assert_eq!(item.category.as_deref(), Some("productivity"));
        assert_eq!(item.tags, vec!["slides", "llm"]);
        assert_eq!(item.run_command.as_deref(), Some("python app.py"));
    }

    #[test]
    fn category_list_first_element_wins() {
        let item = parse_description("name: x\ncategory: [writing, research]\n").unwrap();
        assert_eq!(item.category.as_deref(), Some("writing"));
    }

    #[test]
    fn missing_name_is_an_error() {
        assert!(parse_description("version: '1'\n").is_err());
    }

    #[test]
    fn scan_missing_root_is_empty() {
        let entries = scan_zoo(Path::new("/nonexistent/zoo")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn scan_finds_items_and_skips_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        let good = tmp.path().join("main_repo/app_one");
        std::fs::create_dir_all(&good).unwrap();
        std::fs::write(good.join("description.yaml"), "name: app_one\n").unwrap();

        let bad = tmp.path().join("main_repo/broken");
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::write(bad.join("description.yaml"), ": not yaml {{{").unwrap();

        let empty = tmp.path().join("main_repo/no_description");
        std::fs::create_dir_all(&empty).unwrap();

        let entries = scan_zoo(tmp.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].repo, "main_repo");
        assert_eq!(entries[0].folder, "app_one");
        assert_eq!(entries[0].item.name, "app_one");
    }

    #[test]
    fn scan_sorts_by_repo_then_folder() {
        let tmp = tempfile::tempdir().unwrap();
        for (repo, folder) in [("b_repo", "z"), ("a_repo", "y"), ("a_repo", "x")] {
            let dir = tmp.path().join(repo).join(folder);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("description.yaml"), format!("name: {folder}\n")).unwrap();
        }
        let entries = scan_zoo(tmp.path()).unwrap();
        let order: Vec<_> = entries.iter().map(|e| (e.repo.as_str(), e.folder.as_str())).collect();
        assert_eq!(order, vec![("a_repo", "x"), ("a_repo", "y"), ("b_repo", "z")]);
    }
}
