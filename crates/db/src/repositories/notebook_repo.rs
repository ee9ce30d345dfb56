//! Repository for the `notebooks` table.
//!
//! Artefact insertion is idempotent by filename so that re-running an
//! ingestion with identical inputs leaves the notebook unchanged. Tabs are
//! stored as a JSONB array and rewritten whole under a row lock.

use sqlx::types::Json;
use sqlx::PgPool;

use mosaic_core::types::DbId;

use crate::models::notebook::{Artefact, NewNotebook, Notebook, Tab};

/// Column list for `notebooks` queries.
const COLUMNS: &str = "\
    id, owner, title, kind_id, language, content, artefacts, tabs, \
    created_at, updated_at";

/// Provides CRUD operations for notebooks.
pub struct NotebookRepo;

impl NotebookRepo {
    /// Create a notebook with empty artefacts and tabs.
    pub async fn create(pool: &PgPool, input: &NewNotebook) -> Result<Notebook, sqlx::Error> {
        let query = format!(
            "INSERT INTO notebooks (owner, title, kind_id, language) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Notebook>(&query)
            .bind(&input.owner)
            .bind(&input.title)
            .bind(input.kind)
            .bind(&input.language)
            .fetch_one(pool)
            .await
    }

    /// Find a notebook by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Notebook>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notebooks WHERE id = $1");
        sqlx::query_as::<_, Notebook>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's notebooks, newest first.
    pub async fn list_for_user(pool: &PgPool, owner: &str) -> Result<Vec<Notebook>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM notebooks WHERE owner = $1 ORDER BY created_at DESC");
        sqlx::query_as::<_, Notebook>(&query)
            .bind(owner)
            .fetch_all(pool)
            .await
    }

    /// Replace the free-form metadata blob.
    pub async fn update_content(
        pool: &PgPool,
        id: DbId,
        content: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE notebooks SET content = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(content)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Append an artefact unless one with the same filename already exists.
    ///
    /// Returns `true` when the artefact was inserted, `false` when it was
    /// suppressed as a duplicate. The filename check and the append happen
    /// in a single statement, so concurrent appends cannot double-insert.
    pub async fn add_artefact(
        pool: &PgPool,
        id: DbId,
        artefact: &Artefact,
    ) -> Result<bool, sqlx::Error> {
        let payload = serde_json::to_value(artefact).map_err(|e| sqlx::Error::Encode(e.into()))?;
        let res = sqlx::query(
            "UPDATE notebooks \
             SET artefacts = artefacts || jsonb_build_array($2::jsonb), updated_at = NOW() \
             WHERE id = $1 \
               AND NOT EXISTS ( \
                   SELECT 1 FROM jsonb_array_elements(artefacts) AS a \
                   WHERE a->>'filename' = $3 \
               )",
        )
        .bind(id)
        .bind(payload)
        .bind(&artefact.filename)
        .execute(pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Rewrite the whole tab array.
    pub async fn set_tabs(pool: &PgPool, id: DbId, tabs: &[Tab]) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE notebooks SET tabs = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(Json(tabs))
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Replace the content of one tab, identified by its ID.
    ///
    /// The read-modify-write runs under a row lock so interleaved tab
    /// updates cannot lose writes. Returns `false` when the tab is absent.
    pub async fn set_tab_content(
        pool: &PgPool,
        id: DbId,
        tab_id: &str,
        content: &str,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let tabs: Option<Json<Vec<Tab>>> =
            sqlx::query_scalar("SELECT tabs FROM notebooks WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(Json(mut tabs)) = tabs else {
            return Ok(false);
        };

        let Some(tab) = tabs.iter_mut().find(|t| t.id == tab_id) else {
            return Ok(false);
        };
        tab.content = content.to_string();

        sqlx::query("UPDATE notebooks SET tabs = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(Json(&tabs))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Append a tab and return it.
    pub async fn add_tab(pool: &PgPool, id: DbId, tab: &Tab) -> Result<(), sqlx::Error> {
        let payload = serde_json::to_value(tab).map_err(|e| sqlx::Error::Encode(e.into()))?;
        sqlx::query(
            "UPDATE notebooks \
             SET tabs = tabs || jsonb_build_array($2::jsonb), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(payload)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete a notebook, returning the deleted row so the caller can
    /// remove its asset directory.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<Option<Notebook>, sqlx::Error> {
        let query = format!("DELETE FROM notebooks WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, Notebook>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
