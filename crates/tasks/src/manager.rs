//! Task submission, execution, and cancellation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sqlx::PgPool;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use mosaic_core::types::DbId;
use mosaic_db::models::status::TaskStatus;
use mosaic_db::models::task::{LogLevel, NewTask, Task, TaskListQuery, TaskLogEntry};
use mosaic_db::repositories::TaskRepo;
use mosaic_events::{BroadcastBus, BroadcastMessage, MessageKind};

use crate::handle::TaskHandle;

/// Errors surfaced by the task manager.
#[derive(Debug, thiserror::Error)]
pub enum TaskManagerError {
    /// The durable store is unavailable. Submission fails loudly.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    /// No task with that id exists.
    #[error("task {0} not found")]
    NotFound(DbId),
}

/// Transient per-task state held only in the spawning process.
struct ActiveTask {
    cancel: CancellationToken,
    process: Arc<AsyncMutex<Option<tokio::process::Child>>>,
}

/// Shared state behind every [`TaskManager`] clone and [`TaskHandle`].
pub struct ManagerInner {
    pub(crate) pool: PgPool,
    pub(crate) bus: Arc<BroadcastBus>,
    active: Mutex<HashMap<DbId, ActiveTask>>,
}

/// Submits, runs, cancels, and lists background tasks.
///
/// Cheap to clone; all clones share the same active-task registry. Each
/// worker process constructs exactly one during startup.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<ManagerInner>,
}

impl TaskManager {
    pub fn new(pool: PgPool, bus: Arc<BroadcastBus>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                pool,
                bus,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ManagerInner>) -> Self {
        Self { inner }
    }

    /// Create a pending record and launch the target on the runtime.
    /// Returns the record immediately; the target runs concurrently.
    ///
    /// The target receives a [`TaskHandle`] and returns a JSON-serializable
    /// result. Normal return completes the task with `progress = 100`;
    /// an error return fails it with the error string recorded.
    pub async fn submit<F, Fut>(
        &self,
        name: &str,
        description: Option<&str>,
        owner: Option<&str>,
        target: F,
    ) -> Result<Task, TaskManagerError>
    where
        F: FnOnce(TaskHandle) -> Fut + Send + 'static,
        Fut: std::future::Future<
                Output = Result<serde_json::Value, Box<dyn std::error::Error + Send + Sync>>,
            > + Send
            + 'static,
    {
        let record = TaskRepo::submit(
            &self.inner.pool,
            &NewTask {
                name: name.to_string(),
                description: description.map(str::to_string),
                owner: owner.map(str::to_string),
            },
        )
        .await?;

        let cancel = CancellationToken::new();
        let process = Arc::new(AsyncMutex::new(None));
        {
            let mut active = self.inner.active.lock().unwrap_or_else(|e| e.into_inner());
            active.insert(
                record.id,
                ActiveTask {
                    cancel: cancel.clone(),
                    process: process.clone(),
                },
            );
        }

        let handle = TaskHandle {
            task_id: record.id,
            inner: self.inner.clone(),
            cancel,
            process,
        };
        let inner = self.inner.clone();
        let task_id = record.id;
        tokio::spawn(async move {
            Self::run_task(inner, task_id, handle, target).await;
        });

        self.publish_update(record.id).await;
        Ok(record)
    }

    /// Drive one task from `running` to a terminal state.
    async fn run_task<F, Fut>(inner: Arc<ManagerInner>, task_id: DbId, handle: TaskHandle, target: F)
    where
        F: FnOnce(TaskHandle) -> Fut + Send + 'static,
        Fut: std::future::Future<
                Output = Result<serde_json::Value, Box<dyn std::error::Error + Send + Sync>>,
            > + Send
            + 'static,
    {
        if let Err(e) = TaskRepo::mark_started(&inner.pool, task_id).await {
            tracing::error!(task_id, error = %e, "Failed to mark task started");
        }
        Self::publish_on(&inner, task_id).await;

        let cancel = handle.cancel.clone();
        let outcome = target(handle).await;

        // Cancellation wins over whatever the target returned: a target
        // that noticed the flag and exited early did not "complete".
        let transition = if cancel.is_cancelled() {
            TaskRepo::cancel(&inner.pool, task_id).await.map(|_| ())
        } else {
            match outcome {
                Ok(result) => TaskRepo::complete(&inner.pool, task_id, &result)
                    .await
                    .map(|_| ()),
                Err(e) => {
                    let message = e.to_string();
                    let entry = TaskLogEntry::new(LogLevel::Error, message.clone());
                    if let Err(log_err) =
                        TaskRepo::append_log(&inner.pool, task_id, &entry).await
                    {
                        tracing::error!(task_id, error = %log_err, "Failed to record task error log");
                    }
                    TaskRepo::fail(&inner.pool, task_id, &message).await.map(|_| ())
                }
            }
        };
        if let Err(e) = transition {
            tracing::error!(task_id, error = %e, "Failed to finalise task record");
        }

        {
            let mut active = inner.active.lock().unwrap_or_else(|e| e.into_inner());
            active.remove(&task_id);
        }
        Self::publish_on(&inner, task_id).await;
    }

    /// Cancel a task.
    ///
    /// If the task is running in this process, its cancellation token is
    /// triggered and any attached child process is terminated; the final
    /// `cancelled` transition happens when the target returns. If the task
    /// exists in the store in a non-terminal state but is not active here
    /// (zombie from a crashed worker, or hosted by another process), it is
    /// transitioned to `cancelled` directly.
    pub async fn cancel(&self, task_id: DbId) -> Result<bool, TaskManagerError> {
        let local = {
            let active = self.inner.active.lock().unwrap_or_else(|e| e.into_inner());
            active
                .get(&task_id)
                .map(|a| (a.cancel.clone(), a.process.clone()))
        };

        if let Some((cancel, process)) = local {
            cancel.cancel();
            if let Some(mut child) = process.lock().await.take() {
                if let Err(e) = child.kill().await {
                    tracing::warn!(task_id, error = %e, "Failed to kill attached child process");
                }
            }
            self.publish_update(task_id).await;
            return Ok(true);
        }

        let Some(record) = TaskRepo::find_by_id(&self.inner.pool, task_id).await? else {
            return Err(TaskManagerError::NotFound(task_id));
        };
        if TaskStatus::from_id(record.status_id).is_some_and(TaskStatus::is_terminal) {
            return Ok(false);
        }
        let cancelled = TaskRepo::cancel(&self.inner.pool, task_id).await?;
        if cancelled {
            self.publish_update(task_id).await;
        }
        Ok(cancelled)
    }

    /// Trigger cancellation for every task active in this process and
    /// return how many were signalled. Used during worker shutdown; each
    /// record transitions to `cancelled` as its target observes the token.
    pub fn cancel_all_local(&self) -> usize {
        let active = self.inner.active.lock().unwrap_or_else(|e| e.into_inner());
        for task in active.values() {
            task.cancel.cancel();
        }
        active.len()
    }

    /// Fetch one task record.
    pub async fn get(&self, task_id: DbId) -> Result<Option<Task>, TaskManagerError> {
        Ok(TaskRepo::find_by_id(&self.inner.pool, task_id).await?)
    }

    /// List all tasks (admin view).
    pub async fn list_all(&self, params: &TaskListQuery) -> Result<Vec<Task>, TaskManagerError> {
        Ok(TaskRepo::list_all(&self.inner.pool, params).await?)
    }

    /// List one user's tasks.
    pub async fn list_for_user(
        &self,
        owner: &str,
        params: &TaskListQuery,
    ) -> Result<Vec<Task>, TaskManagerError> {
        Ok(TaskRepo::list_for_user(&self.inner.pool, owner, params).await?)
    }

    /// Delete finished tasks, optionally scoped to one user. Running tasks
    /// are untouched.
    pub async fn clear_finished(&self, owner: Option<&str>) -> Result<u64, TaskManagerError> {
        Ok(TaskRepo::clear_finished(&self.inner.pool, owner).await?)
    }

    /// The database pool shared with repositories.
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// The broadcast bus shared with the relay.
    pub fn bus(&self) -> &Arc<BroadcastBus> {
        &self.inner.bus
    }

    async fn publish_update(&self, task_id: DbId) {
        Self::publish_on(&self.inner, task_id).await;
    }

    async fn publish_on(inner: &Arc<ManagerInner>, task_id: DbId) {
        inner.bus.publish(
            BroadcastMessage::new(MessageKind::TaskUpdated)
                .with_payload(serde_json::json!({"task_id": task_id})),
        );
    }
}
