//! Repository for the `tasks` table.
//!
//! All task lifecycle transitions go through here so that every worker
//! process observes the same durable state. Terminal statuses are sticky:
//! the guards on each UPDATE refuse further mutation once a task has
//! completed, failed, or been cancelled.

use sqlx::PgPool;

use mosaic_core::types::DbId;

use crate::models::status::{StatusId, TaskStatus};
use crate::models::task::{NewTask, Task, TaskListQuery, TaskLogEntry};

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, name, description, status_id, progress, logs, result, error, \
    owner, file_name, total_files, \
    created_at, started_at, completed_at, updated_at";

/// Maximum page size for task listing.
const MAX_LIMIT: i64 = 200;

/// Default page size for task listing.
const DEFAULT_LIMIT: i64 = 50;

/// Terminal statuses: completed, failed, cancelled.
const TERMINAL_STATUSES: [StatusId; 3] = [
    TaskStatus::Completed as StatusId,
    TaskStatus::Failed as StatusId,
    TaskStatus::Cancelled as StatusId,
];

/// Provides CRUD operations for background task records.
pub struct TaskRepo;

impl TaskRepo {
    /// Create a new pending task record. Returns immediately with the row.
    pub async fn submit(pool: &PgPool, input: &NewTask) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks (name, description, status_id, owner) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(&input.name)
            .bind(&input.description)
            .bind(TaskStatus::Pending.id())
            .bind(&input.owner)
            .fetch_one(pool)
            .await
    }

    /// Transition a pending task to running and set `started_at`.
    pub async fn mark_started(pool: &PgPool, task_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, started_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(task_id)
        .bind(TaskStatus::Running.id())
        .bind(TaskStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Update progress. Clamped to [0, 100] and monotone non-decreasing
    /// while the task is running; ignored once terminal.
    pub async fn update_progress(
        pool: &PgPool,
        task_id: DbId,
        percent: i16,
    ) -> Result<(), sqlx::Error> {
        let percent = percent.clamp(0, 100);
        sqlx::query(
            "UPDATE tasks \
             SET progress = GREATEST(progress, $2), updated_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(task_id)
        .bind(percent)
        .bind(TaskStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Append one log entry. The JSONB `||` concatenation is atomic with
    /// respect to concurrent appends on the same row.
    pub async fn append_log(
        pool: &PgPool,
        task_id: DbId,
        entry: &TaskLogEntry,
    ) -> Result<(), sqlx::Error> {
        let payload = serde_json::to_value(entry).map_err(|e| sqlx::Error::Encode(e.into()))?;
        sqlx::query(
            "UPDATE tasks \
             SET logs = logs || jsonb_build_array($2::jsonb), updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($3, $4, $5)",
        )
        .bind(task_id)
        .bind(payload)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Replace the human-readable description of a running task.
    pub async fn set_description(
        pool: &PgPool,
        task_id: DbId,
        description: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tasks SET description = $2, updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($3, $4, $5)",
        )
        .bind(task_id)
        .bind(description)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record the file currently being processed and the total file count.
    pub async fn set_file_info(
        pool: &PgPool,
        task_id: DbId,
        file_name: &str,
        total_files: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tasks SET file_name = $2, total_files = $3, updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($4, $5, $6)",
        )
        .bind(task_id)
        .bind(file_name)
        .bind(total_files)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a task as completed with its result payload.
    ///
    /// Sets `progress` to 100. Returns `false` when the task had already
    /// reached a terminal state (e.g. cancelled while the target was
    /// finishing up).
    pub async fn complete(
        pool: &PgPool,
        task_id: DbId,
        result: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, result = $3, progress = 100, \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($4, $5, $6)",
        )
        .bind(task_id)
        .bind(TaskStatus::Completed.id())
        .bind(result)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .execute(pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Mark a task as failed with an error message. No automatic retry.
    pub async fn fail(pool: &PgPool, task_id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, error = $3, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($4, $5, $6)",
        )
        .bind(task_id)
        .bind(TaskStatus::Failed.id())
        .bind(error)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .execute(pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Cancel a task if it is not already in a terminal state.
    ///
    /// Returns `true` if the row was transitioned, `false` otherwise. This
    /// is also how zombie tasks left behind by a crashed worker are cleaned
    /// up: no live handle is needed.
    pub async fn cancel(pool: &PgPool, task_id: DbId) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($3, $4, $5)",
        )
        .bind(task_id)
        .bind(TaskStatus::Cancelled.id())
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .execute(pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Find a task by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List tasks for a specific owner with optional status filter.
    pub async fn list_for_user(
        pool: &PgPool,
        owner: &str,
        params: &TaskListQuery,
    ) -> Result<Vec<Task>, sqlx::Error> {
        Self::list_tasks(pool, Some(owner), params).await
    }

    /// List all tasks (admin view).
    pub async fn list_all(pool: &PgPool, params: &TaskListQuery) -> Result<Vec<Task>, sqlx::Error> {
        Self::list_tasks(pool, None, params).await
    }

    /// Delete tasks in terminal status, optionally scoped to one owner.
    /// Running and pending tasks are untouched. Returns the deleted count.
    pub async fn clear_finished(pool: &PgPool, owner: Option<&str>) -> Result<u64, sqlx::Error> {
        let res = match owner {
            Some(owner) => {
                sqlx::query(
                    "DELETE FROM tasks WHERE status_id IN ($1, $2, $3) AND owner = $4",
                )
                .bind(TERMINAL_STATUSES[0])
                .bind(TERMINAL_STATUSES[1])
                .bind(TERMINAL_STATUSES[2])
                .bind(owner)
                .execute(pool)
                .await?
            }
            None => {
                sqlx::query("DELETE FROM tasks WHERE status_id IN ($1, $2, $3)")
                    .bind(TERMINAL_STATUSES[0])
                    .bind(TERMINAL_STATUSES[1])
                    .bind(TERMINAL_STATUSES[2])
                    .execute(pool)
                    .await?
            }
        };
        Ok(res.rows_affected())
    }

    /// Shared listing query builder. When `owner` is `Some`, filters to
    /// that user's tasks; when `None`, returns all tasks.
    async fn list_tasks(
        pool: &PgPool,
        owner: Option<&str>,
        params: &TaskListQuery,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if owner.is_some() {
            conditions.push(format!("owner = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.status_id.is_some() {
            conditions.push(format!("status_id = ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             {where_clause} \
             ORDER BY created_at DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, Task>(&query);
        if let Some(owner) = owner {
            q = q.bind(owner);
        }
        if let Some(sid) = params.status_id {
            q = q.bind(sid);
        }
        q = q.bind(limit).bind(offset);

        q.fetch_all(pool).await
    }
}
