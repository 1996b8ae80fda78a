// Copyright (c) 2025 - Cowboy AI, Inc.

//! Write-side Services
//!
//! Application services for the user and task domains. Every mutation
//! commits the entity change and its outbox row as one unit:
//!
//! ```text
//! create/update/delete
//!     ↓
//! ┌──────────── critical section ────────────┐
//! │ validate → stage outbox row → write entity │
//! └────────────────────────────────────────────┘
//!     ↓
//! RelayQueue::enqueue (optional, after commit)
//! ```
//!
//! If staging the outbox row fails, the entity is left untouched and the
//! caller gets a `Storage` error. Nothing is published from here; delivery
//! belongs to the relay.
//!
//! The same traits serve the consuming side. A consumer-side replica is built
//! without an outbox, so applying a delivered event never stages a new one.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::{Task, TaskError, User, UserError};

pub mod task;
pub mod user;

pub use task::InMemoryTaskService;
pub use user::InMemoryUserService;

/// Input of [`UserService::create_user`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub id: Option<Uuid>,
    pub email: String,
    pub name: String,
    pub birth_date: NaiveDate,
}

impl NewUser {
    pub fn new(email: impl Into<String>, name: impl Into<String>, birth_date: NaiveDate) -> Self {
        Self {
            id: None,
            email: email.into(),
            name: name.into(),
            birth_date,
        }
    }

    /// Create with a known id instead of a fresh one
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }
}

/// Input of [`TaskService::create_task`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub assignee_id: Uuid,
}

impl NewTask {
    pub fn new(title: impl Into<String>, description: impl Into<String>, assignee_id: Uuid) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: description.into(),
            assignee_id,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }
}

/// User application service
#[async_trait]
pub trait UserService: Send + Sync {
    /// Create a user and stage `user.created`
    ///
    /// # Errors
    /// - `AlreadyExists` if the id is taken
    /// - `Invalid` if the user fails validation
    async fn create_user(&self, new_user: NewUser) -> Result<User, UserError>;

    /// Current state of a user
    async fn get_user(&self, id: Uuid) -> Result<User, UserError>;

    /// Replace the mutable fields of an existing user and stage `user.updated`
    async fn update_user(&self, user: User) -> Result<User, UserError>;

    /// Remove a user and stage `user.deleted`
    async fn delete_user(&self, id: Uuid) -> Result<(), UserError>;
}

/// Task application service
#[async_trait]
pub trait TaskService: Send + Sync {
    /// Create a pending task and stage `task.created`
    async fn create_task(&self, new_task: NewTask) -> Result<Task, TaskError>;

    async fn get_task(&self, id: Uuid) -> Result<Task, TaskError>;

    /// Replace title, description and status; stages `task.updated`
    async fn update_task(&self, task: Task) -> Result<Task, TaskError>;

    async fn delete_task(&self, id: Uuid) -> Result<(), TaskError>;

    /// Move a pending task to completed
    ///
    /// # Errors
    /// - `CannotComplete` unless the task is pending
    async fn complete_task(&self, id: Uuid) -> Result<Task, TaskError>;

    /// Move a task to failed
    async fn fail_task(&self, id: Uuid) -> Result<Task, TaskError>;
}
