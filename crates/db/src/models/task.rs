//! Task entity models for the background task manager.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use mosaic_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// Log severity for task log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One append-only log line on a task record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLogEntry {
    pub timestamp: Timestamp,
    pub level: LogLevel,
    pub message: String,
}

impl TaskLogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// A row from the `tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub status_id: StatusId,
    /// Monotone while running; 100 on completion.
    pub progress: i16,
    pub logs: Json<Vec<TaskLogEntry>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Username of the submitting user; `NULL` for system tasks.
    pub owner: Option<String>,
    /// Name of the file currently being processed, when applicable.
    pub file_name: Option<String>,
    pub total_files: Option<i32>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

/// Parameters for creating a new pending task record.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<String>,
}

/// Pagination for task listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskListQuery {
    /// Filter by status ID.
    pub status_id: Option<StatusId>,
    /// Maximum number of results. Defaults to 50, capped at 200.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_serialises_lowercase_level() {
        let entry = TaskLogEntry::new(LogLevel::Warning, "slow source");
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["level"], "warning");
        assert_eq!(v["message"], "slow source");
        assert!(v["timestamp"].is_string());
    }

    #[test]
    fn log_entry_round_trips() {
        let entry = TaskLogEntry::new(LogLevel::Error, "boom");
        let json = serde_json::to_string(&entry).unwrap();
        let back: TaskLogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.level, LogLevel::Error);
        assert_eq!(back.message, "boom");
    }
}
