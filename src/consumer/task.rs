//! Task event consumer

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::dispatch::{DispatchOutcome, EventDispatcher, HandleOutcome, HandlerError};
use super::MessageHandler;
use crate::domain::task::{
    TaskCreated, TaskDeleted, TaskError, TaskUpdated, TASK_CREATED, TASK_DELETED, TASK_UPDATED,
};
use crate::service::{NewTask, TaskService};

impl From<TaskError> for HandlerError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::AlreadyExists(id) => HandlerError::AlreadyExists(id.to_string()),
            TaskError::NotFound(id) => HandlerError::NotFound(id.to_string()),
            TaskError::Invalid(reason) => HandlerError::Invalid(reason),
            TaskError::CannotComplete(id) => {
                HandlerError::Invalid(format!("task {} cannot be completed", id))
            }
            TaskError::Storage(reason) => HandlerError::Other(reason),
        }
    }
}

async fn on_created(
    service: Arc<dyn TaskService>,
    event: TaskCreated,
) -> Result<HandleOutcome, HandlerError> {
    match service.get_task(event.id).await {
        Ok(_) => {
            debug!(task_id = %event.id, "Task already exists");
            return Ok(HandleOutcome::Duplicate);
        }
        Err(TaskError::NotFound(_)) => {}
        Err(err) => return Err(err.into()),
    }

    let new_task =
        NewTask::new(event.title, event.description, event.assignee_id).with_id(event.id);
    service.create_task(new_task).await?;
    Ok(HandleOutcome::Applied)
}

/// Last write wins; the snapshot carries the status as well
async fn on_updated(
    service: Arc<dyn TaskService>,
    event: TaskUpdated,
) -> Result<HandleOutcome, HandlerError> {
    let mut task = service.get_task(event.id).await?;
    task.title = event.title;
    task.description = event.description;
    task.status = event.status;

    service.update_task(task).await?;
    Ok(HandleOutcome::Applied)
}

async fn on_deleted(
    service: Arc<dyn TaskService>,
    event: TaskDeleted,
) -> Result<HandleOutcome, HandlerError> {
    match service.delete_task(event.id).await {
        Ok(()) => Ok(HandleOutcome::Applied),
        Err(TaskError::NotFound(_)) => Ok(HandleOutcome::Duplicate),
        Err(err) => Err(err.into()),
    }
}

/// Consumer of the `task` topic
#[derive(Debug)]
pub struct TaskConsumer {
    dispatcher: EventDispatcher,
}

impl TaskConsumer {
    pub fn new(service: Arc<dyn TaskService>, handler_timeout: Duration) -> Self {
        let created = service.clone();
        let updated = service.clone();
        let deleted = service;

        let dispatcher = EventDispatcher::new("task-consumer", handler_timeout)
            .on::<TaskCreated, _, _>(TASK_CREATED, move |event| {
                on_created(created.clone(), event)
            })
            .on::<TaskUpdated, _, _>(TASK_UPDATED, move |event| {
                on_updated(updated.clone(), event)
            })
            .on::<TaskDeleted, _, _>(TASK_DELETED, move |event| {
                on_deleted(deleted.clone(), event)
            });

        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub async fn dispatch(&self, key: Option<&str>, payload: &[u8]) -> DispatchOutcome {
        self.dispatcher.dispatch(key, payload).await
    }
}

#[async_trait]
impl MessageHandler for TaskConsumer {
    async fn handle_message(&self, key: Option<&str>, payload: &[u8]) {
        self.dispatcher.handle_message(key, payload).await;
    }
}
