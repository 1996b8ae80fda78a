//! In-memory task service

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::{NewTask, TaskService};
use crate::domain::task::{
    Task, TaskCreated, TaskDeleted, TaskError, TaskUpdated, TASK_AGGREGATE, TASK_CREATED,
    TASK_DELETED, TASK_UPDATED,
};
use crate::outbox::{InMemoryOutboxStore, OutboxEvent};
use crate::relay::RelayQueue;

/// Task service over a hash map and an in-memory outbox
pub struct InMemoryTaskService {
    tasks: Mutex<HashMap<Uuid, Task>>,
    outbox: Option<Arc<InMemoryOutboxStore>>,
    relay: Option<RelayQueue>,
}

impl InMemoryTaskService {
    pub fn new(outbox: Arc<InMemoryOutboxStore>) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            outbox: Some(outbox),
            relay: None,
        }
    }

    /// Consumer-side replica without an outbox
    pub fn replica() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            outbox: None,
            relay: None,
        }
    }

    pub fn with_relay_queue(mut self, queue: RelayQueue) -> Self {
        self.relay = Some(queue);
        self
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    async fn stage<E: Serialize>(
        &self,
        task_id: Uuid,
        event_type: &str,
        event: &E,
    ) -> Result<Option<OutboxEvent>, TaskError> {
        let Some(outbox) = &self.outbox else {
            return Ok(None);
        };

        let row = OutboxEvent::for_event(TASK_AGGREGATE, task_id.to_string(), event_type, event)
            .map_err(|e| TaskError::Storage(e.to_string()))?;
        outbox
            .insert(row.clone())
            .await
            .map_err(|e| TaskError::Storage(e.to_string()))?;

        Ok(Some(row))
    }

    fn after_commit(&self, row: Option<OutboxEvent>) {
        if let (Some(queue), Some(row)) = (&self.relay, row) {
            queue.enqueue(row);
        }
    }

    /// Apply `change` to a stored task and stage `task.updated` for the result
    async fn modify<F>(&self, id: Uuid, change: F) -> Result<Task, TaskError>
    where
        F: FnOnce(&mut Task) -> Result<(), TaskError> + Send,
    {
        let (task, row) = {
            let mut tasks = self.tasks.lock().await;
            let mut task = tasks.get(&id).cloned().ok_or(TaskError::NotFound(id))?;
            change(&mut task)?;

            let row = self.stage(id, TASK_UPDATED, &TaskUpdated::from(&task)).await?;
            tasks.insert(id, task.clone());
            (task, row)
        };
        self.after_commit(row);
        Ok(task)
    }
}

#[async_trait]
impl TaskService for InMemoryTaskService {
    async fn create_task(&self, new_task: NewTask) -> Result<Task, TaskError> {
        let id = new_task.id.unwrap_or_else(Uuid::now_v7);
        let task = Task::new(id, new_task.title, new_task.description, new_task.assignee_id)?;

        let row = {
            let mut tasks = self.tasks.lock().await;
            if tasks.contains_key(&id) {
                return Err(TaskError::AlreadyExists(id));
            }
            let row = self.stage(id, TASK_CREATED, &TaskCreated::from(&task)).await?;
            tasks.insert(id, task.clone());
            row
        };
        self.after_commit(row);

        info!(task_id = %id, assignee_id = %task.assignee_id, "Task created");
        Ok(task)
    }

    async fn get_task(&self, id: Uuid) -> Result<Task, TaskError> {
        self.tasks
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(TaskError::NotFound(id))
    }

    async fn update_task(&self, task: Task) -> Result<Task, TaskError> {
        if task.title.trim().is_empty() {
            return Err(TaskError::Invalid("title must not be empty".to_string()));
        }

        let updated = self
            .modify(task.id, |current| {
                current.update(task.title, task.description);
                current.status = task.status;
                Ok(())
            })
            .await?;

        info!(task_id = %updated.id, status = %updated.status, "Task updated");
        Ok(updated)
    }

    async fn delete_task(&self, id: Uuid) -> Result<(), TaskError> {
        let row = {
            let mut tasks = self.tasks.lock().await;
            if !tasks.contains_key(&id) {
                return Err(TaskError::NotFound(id));
            }
            let row = self.stage(id, TASK_DELETED, &TaskDeleted { id }).await?;
            tasks.remove(&id);
            row
        };
        self.after_commit(row);

        info!(task_id = %id, "Task deleted");
        Ok(())
    }

    async fn complete_task(&self, id: Uuid) -> Result<Task, TaskError> {
        let task = self.modify(id, |task| task.complete()).await?;
        info!(task_id = %id, "Task completed");
        Ok(task)
    }

    async fn fail_task(&self, id: Uuid) -> Result<Task, TaskError> {
        let task = self
            .modify(id, |task| {
                task.fail();
                Ok(())
            })
            .await?;
        info!(task_id = %id, "Task failed");
        Ok(task)
    }
}
