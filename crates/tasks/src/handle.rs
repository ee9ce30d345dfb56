//! The live handle a task target works with.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use mosaic_core::types::DbId;
use mosaic_db::models::task::{LogLevel, TaskLogEntry};
use mosaic_db::repositories::TaskRepo;
use mosaic_events::{BroadcastMessage, MessageKind};

use crate::manager::ManagerInner;

/// Handle passed to a running task target.
///
/// All mutations go through the durable store and are followed by a
/// `task_updated` broadcast, so any process (and the UI) can observe
/// progress. The handle itself holds only transient state: the
/// cancellation token and an optionally attached child process.
#[derive(Clone)]
pub struct TaskHandle {
    pub(crate) task_id: DbId,
    pub(crate) inner: Arc<ManagerInner>,
    pub(crate) cancel: CancellationToken,
    /// Child process to terminate when the task is cancelled. Targets that
    /// spawn subprocesses must attach them before blocking.
    pub(crate) process: Arc<Mutex<Option<tokio::process::Child>>>,
}

impl TaskHandle {
    /// Durable id of the task this handle belongs to.
    pub fn task_id(&self) -> DbId {
        self.task_id
    }

    /// Append a log entry at the given level.
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!(task_id = self.task_id, "{message}"),
            LogLevel::Warning => tracing::warn!(task_id = self.task_id, "{message}"),
            LogLevel::Error => tracing::error!(task_id = self.task_id, "{message}"),
        }
        let entry = TaskLogEntry::new(level, message);
        if let Err(e) = TaskRepo::append_log(&self.inner.pool, self.task_id, &entry).await {
            tracing::error!(task_id = self.task_id, error = %e, "Failed to append task log");
        }
        self.notify().await;
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message).await;
    }

    /// Report progress in percent. Clamped and monotone at the store.
    pub async fn set_progress(&self, percent: i16) {
        if let Err(e) = TaskRepo::update_progress(&self.inner.pool, self.task_id, percent).await {
            tracing::error!(task_id = self.task_id, error = %e, "Failed to update task progress");
        }
        self.notify().await;
    }

    /// Replace the task's human-readable description.
    pub async fn set_description(&self, description: &str) {
        if let Err(e) =
            TaskRepo::set_description(&self.inner.pool, self.task_id, description).await
        {
            tracing::error!(task_id = self.task_id, error = %e, "Failed to update task description");
        }
        self.notify().await;
    }

    /// Record the file currently being processed.
    pub async fn set_file_info(&self, file_name: &str, total_files: i32) {
        if let Err(e) =
            TaskRepo::set_file_info(&self.inner.pool, self.task_id, file_name, total_files).await
        {
            tracing::error!(task_id = self.task_id, error = %e, "Failed to update task file info");
        }
        self.notify().await;
    }

    /// Whether cancellation was requested. Targets poll this at natural
    /// checkpoints (per file, per scene, per chunk) and exit promptly.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The cancellation token, for `tokio::select!` against long awaits.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Attach a child process so that cancellation can terminate it.
    pub async fn attach_process(&self, child: tokio::process::Child) {
        *self.process.lock().await = Some(child);
    }

    /// Detach and return the child process, if still attached.
    pub async fn take_process(&self) -> Option<tokio::process::Child> {
        self.process.lock().await.take()
    }

    /// Submit another task from inside this target (task chaining).
    ///
    /// The child runs independently with its own record; this task is not
    /// blocked on it and concludes once its own work is done.
    pub async fn submit_chained<F, Fut>(
        &self,
        name: &str,
        description: Option<&str>,
        owner: Option<&str>,
        target: F,
    ) -> Result<DbId, crate::manager::TaskManagerError>
    where
        F: FnOnce(TaskHandle) -> Fut + Send + 'static,
        Fut: std::future::Future<
                Output = Result<serde_json::Value, Box<dyn std::error::Error + Send + Sync>>,
            > + Send
            + 'static,
    {
        crate::manager::TaskManager::from_inner(self.inner.clone())
            .submit(name, description, owner, target)
            .await
            .map(|task| task.id)
    }

    async fn notify(&self) {
        let payload = serde_json::json!({"task_id": self.task_id});
        self.inner
            .bus
            .publish(BroadcastMessage::new(MessageKind::TaskUpdated).with_payload(payload));
    }
}
