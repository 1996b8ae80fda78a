//! Task aggregate and its integration events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::registry::{EventRegistry, EventRegistryBuilder, PartitionKey};

pub const TASK_TOPIC: &str = "task";
pub const TASK_AGGREGATE: &str = "task";

pub const TASK_CREATED: &str = "task.created";
pub const TASK_UPDATED: &str = "task.updated";
pub const TASK_DELETED: &str = "task.deleted";

/// Task domain errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("Task already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("Invalid task: {0}")]
    Invalid(String),

    /// Entity or outbox write failed; nothing was committed
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Task {0} cannot be marked as completed")]
    CannotComplete(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(TaskError::Invalid(format!("unknown status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub assignee_id: Uuid,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: Uuid,
        title: impl Into<String>,
        description: impl Into<String>,
        assignee_id: Uuid,
    ) -> Result<Self, TaskError> {
        let now = Utc::now();
        let task = Self {
            id,
            title: title.into(),
            description: description.into(),
            assignee_id,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        if task.title.trim().is_empty() {
            return Err(TaskError::Invalid("title must not be empty".to_string()));
        }
        Ok(task)
    }

    /// Only pending tasks can be completed
    pub fn complete(&mut self) -> Result<(), TaskError> {
        if self.status != TaskStatus::Pending {
            return Err(TaskError::CannotComplete(self.id));
        }
        self.status = TaskStatus::Completed;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn fail(&mut self) {
        self.status = TaskStatus::Failed;
        self.updated_at = Utc::now();
    }

    pub fn update(&mut self, title: impl Into<String>, description: impl Into<String>) {
        self.title = title.into();
        self.description = description.into();
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCreated {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(rename = "assigneeId")]
    pub assignee_id: Uuid,
}

/// Full snapshot of the mutable task fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpdated {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDeleted {
    pub id: Uuid,
}

impl From<&Task> for TaskCreated {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            assignee_id: task.assignee_id,
        }
    }
}

impl From<&Task> for TaskUpdated {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status,
        }
    }
}

impl PartitionKey for TaskCreated {
    fn partition_key(&self) -> Option<String> {
        Some(self.id.to_string())
    }
}

impl PartitionKey for TaskUpdated {
    fn partition_key(&self) -> Option<String> {
        Some(self.id.to_string())
    }
}

impl PartitionKey for TaskDeleted {
    fn partition_key(&self) -> Option<String> {
        Some(self.id.to_string())
    }
}

/// Event declarations of the task domain
pub fn event_registry() -> EventRegistryBuilder {
    EventRegistry::builder()
        .register::<TaskCreated>(TASK_CREATED, TASK_TOPIC)
        .register::<TaskUpdated>(TASK_UPDATED, TASK_TOPIC)
        .register::<TaskDeleted>(TASK_DELETED, TASK_TOPIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task() -> Task {
        Task::new(Uuid::now_v7(), "Write docs", "", Uuid::now_v7()).unwrap()
    }

    #[test]
    fn test_complete_only_from_pending() {
        let mut task = task();
        task.complete().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.complete(), Err(TaskError::CannotComplete(task.id)));
    }

    #[test]
    fn test_fail_and_update() {
        let mut task = task();
        task.fail();
        assert_eq!(task.status, TaskStatus::Failed);

        task.update("Write more docs", "chapter 2");
        assert_eq!(task.title, "Write more docs");
        assert_eq!(task.description, "chapter 2");
    }

    #[test]
    fn test_created_event_wire_names() {
        let task = task();
        let wire = serde_json::to_value(TaskCreated::from(&task)).unwrap();
        assert_eq!(wire["assigneeId"], json!(task.assignee_id));
        assert!(wire.get("assignee_id").is_none());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("failed".parse::<TaskStatus>().unwrap(), TaskStatus::Failed);
        assert!("done".parse::<TaskStatus>().is_err());
        assert_eq!(
            serde_json::to_value(TaskStatus::Completed).unwrap(),
            json!("completed")
        );
    }

    #[test]
    fn test_empty_title_rejected() {
        assert!(Task::new(Uuid::now_v7(), "  ", "", Uuid::now_v7()).is_err());
    }
}
