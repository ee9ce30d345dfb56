//! Filesystem layout under the platform data root.
//!
//! ```text
//! <data_root>/users/<username>/notebooks/<notebook_id>/assets/*
//! <data_root>/apps_zoo/<repo>/<app_folder>/
//! <data_root>/mcps_zoo/<repo>/<mcp_folder>/
//! <data_root>/prompts_zoo/<repo>/<prompt_folder>/
//! <data_root>/personalities_zoo/<repo>/<personality_folder>/
//! ```
//!
//! Tab content stores asset references in URL form
//! (`/api/notebooks/<id>/assets/<file>`), never as filesystem paths. The
//! conversion helpers here are the single point of truth for that mapping.

use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::types::DbId;

/// Zoo directory names directly under the data root.
pub const ZOO_DIRS: &[&str] = &["apps_zoo", "mcps_zoo", "prompts_zoo", "personalities_zoo"];

/// URL prefix for notebook asset references stored in tab content.
const ASSET_URL_PREFIX: &str = "/api/notebooks";

/// Resolves filesystem locations under a single data root.
#[derive(Debug, Clone)]
pub struct DataRoot {
    root: PathBuf,
}

impl DataRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a user's notebooks.
    pub fn user_dir(&self, username: &str) -> PathBuf {
        self.root.join("users").join(username)
    }

    /// Directory for one notebook.
    pub fn notebook_dir(&self, username: &str, notebook_id: DbId) -> PathBuf {
        self.user_dir(username)
            .join("notebooks")
            .join(notebook_id.to_string())
    }

    /// Asset directory for one notebook. Generated images, audio, and the
    /// composed video all live here.
    pub fn assets_dir(&self, username: &str, notebook_id: DbId) -> PathBuf {
        self.notebook_dir(username, notebook_id).join("assets")
    }

    /// A zoo directory (`apps_zoo`, `mcps_zoo`, ...) under the data root.
    pub fn zoo_dir(&self, zoo: &str) -> PathBuf {
        self.root.join(zoo)
    }

    /// Resolve an asset URL back to a file under the notebook's asset
    /// directory.
    ///
    /// Rejects URLs for other notebooks and anything that would escape the
    /// asset directory via path traversal.
    pub fn resolve_asset_url(
        &self,
        username: &str,
        notebook_id: DbId,
        url: &str,
    ) -> Result<PathBuf, CoreError> {
        let filename = asset_filename_from_url(url, notebook_id)?;
        Ok(self.assets_dir(username, notebook_id).join(filename))
    }
}

/// Build the URL-form reference for an asset file, as stored in tab JSON.
pub fn asset_url(notebook_id: DbId, filename: &str) -> String {
    format!("{ASSET_URL_PREFIX}/{notebook_id}/assets/{filename}")
}

/// Extract and validate the filename component of an asset URL.
pub fn asset_filename_from_url(url: &str, notebook_id: DbId) -> Result<String, CoreError> {
    let expected_prefix = format!("{ASSET_URL_PREFIX}/{notebook_id}/assets/");
    let filename = url.strip_prefix(&expected_prefix).ok_or_else(|| {
        CoreError::Validation(format!(
            "Asset URL '{url}' does not belong to notebook {notebook_id}"
        ))
    })?;
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
    {
        return Err(CoreError::Validation(format!(
            "Invalid asset filename in URL '{url}'"
        )));
    }
    Ok(filename.to_string())
}

/// Generate a unique asset filename with the given prefix and extension.
///
/// Regeneration must produce a new variant rather than overwrite an earlier
/// one, so every call returns a fresh name.
pub fn unique_asset_filename(prefix: &str, extension: &str) -> String {
    format!("{prefix}_{}.{extension}", uuid::Uuid::new_v4().simple())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assets_dir_layout() {
        let root = DataRoot::new("/data");
        assert_eq!(
            root.assets_dir("alice", 7),
            PathBuf::from("/data/users/alice/notebooks/7/assets")
        );
    }

    #[test]
    fn zoo_dir_layout() {
        let root = DataRoot::new("/data");
        assert_eq!(root.zoo_dir("apps_zoo"), PathBuf::from("/data/apps_zoo"));
    }

    #[test]
    fn asset_url_round_trip() {
        let url = asset_url(42, "img_abc.png");
        assert_eq!(url, "/api/notebooks/42/assets/img_abc.png");
        assert_eq!(asset_filename_from_url(&url, 42).unwrap(), "img_abc.png");
    }

    #[test]
    fn asset_url_for_other_notebook_rejected() {
        let url = asset_url(42, "img.png");
        assert!(asset_filename_from_url(&url, 43).is_err());
    }

    #[test]
    fn traversal_in_asset_url_rejected() {
        assert!(asset_filename_from_url("/api/notebooks/1/assets/../../etc", 1).is_err());
        assert!(asset_filename_from_url("/api/notebooks/1/assets/a/b.png", 1).is_err());
    }

    #[test]
    fn empty_asset_filename_rejected() {
        assert!(asset_filename_from_url("/api/notebooks/1/assets/", 1).is_err());
    }

    #[test]
    fn unique_filenames_differ() {
        let a = unique_asset_filename("img", "png");
        let b = unique_asset_filename("img", "png");
        assert_ne!(a, b);
        assert!(a.starts_with("img_") && a.ends_with(".png"));
    }

    #[test]
    fn resolve_asset_url_joins_assets_dir() {
        let root = DataRoot::new("/data");
        let path = root
            .resolve_asset_url("bob", 3, "/api/notebooks/3/assets/voice.wav")
            .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/data/users/bob/notebooks/3/assets/voice.wav")
        );
    }
}
