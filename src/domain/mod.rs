// Copyright (c) 2025 - Cowboy AI, Inc.

//! Business domains that write to the outbox
//!
//! Each domain owns its aggregate, its integration event types and the
//! registry declarations for them:
//!
//! - [`user`] - `user.created`, `user.updated`, `user.deleted` on topic `user`
//! - [`task`] - `task.created`, `task.updated`, `task.deleted` on topic `task`
//!
//! [`event_registry`] merges every domain into the single registry the relay
//! runs with.

pub mod task;
pub mod user;

pub use task::{Task, TaskCreated, TaskDeleted, TaskError, TaskStatus, TaskUpdated};
pub use user::{User, UserCreated, UserDeleted, UserError, UserUpdated};

use crate::registry::{EventRegistry, RegistryError};

/// Registry of every domain event known to this process
pub fn event_registry() -> Result<EventRegistry, RegistryError> {
    user::event_registry().merge(task::event_registry()).build()
}
