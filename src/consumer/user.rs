// Copyright (c) 2025 - Cowboy AI, Inc.

//! User event consumer
//!
//! Applies delivered `user.*` events to a [`UserService`]. Delivery is
//! at-least-once, so every handler tolerates seeing the same event again:
//!
//! - `user.created` checks for the id first and creates with the id carried
//!   by the event. A create that loses a race to another delivery fails with
//!   `AlreadyExists`, which the dispatcher treats as a duplicate.
//! - `user.updated` overwrites the stored fields with the snapshot.
//! - `user.deleted` on a missing user is a duplicate.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::dispatch::{DispatchOutcome, EventDispatcher, HandleOutcome, HandlerError};
use super::MessageHandler;
use crate::domain::user::{
    UserCreated, UserDeleted, UserError, UserUpdated, USER_CREATED, USER_DELETED, USER_UPDATED,
};
use crate::service::{NewUser, UserService};

impl From<UserError> for HandlerError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::AlreadyExists(id) => HandlerError::AlreadyExists(id.to_string()),
            UserError::NotFound(id) => HandlerError::NotFound(id.to_string()),
            UserError::Invalid(reason) => HandlerError::Invalid(reason),
            UserError::Storage(reason) => HandlerError::Other(reason),
        }
    }
}

async fn on_created(
    service: Arc<dyn UserService>,
    event: UserCreated,
) -> Result<HandleOutcome, HandlerError> {
    match service.get_user(event.id).await {
        Ok(_) => {
            debug!(user_id = %event.id, "User already exists");
            return Ok(HandleOutcome::Duplicate);
        }
        Err(UserError::NotFound(_)) => {}
        Err(err) => return Err(err.into()),
    }

    let new_user = NewUser::new(event.email, event.name, event.birth_date).with_id(event.id);
    service.create_user(new_user).await?;
    Ok(HandleOutcome::Applied)
}

async fn on_updated(
    service: Arc<dyn UserService>,
    event: UserUpdated,
) -> Result<HandleOutcome, HandlerError> {
    let mut user = service.get_user(event.id).await?;
    user.email = event.email;
    user.name = event.name;
    user.birth_date = event.birth_date;

    service.update_user(user).await?;
    Ok(HandleOutcome::Applied)
}

async fn on_deleted(
    service: Arc<dyn UserService>,
    event: UserDeleted,
) -> Result<HandleOutcome, HandlerError> {
    match service.delete_user(event.id).await {
        Ok(()) => Ok(HandleOutcome::Applied),
        Err(UserError::NotFound(_)) => Ok(HandleOutcome::Duplicate),
        Err(err) => Err(err.into()),
    }
}

/// Consumer of the `user` topic
#[derive(Debug)]
pub struct UserConsumer {
    dispatcher: EventDispatcher,
}

impl UserConsumer {
    pub fn new(service: Arc<dyn UserService>, handler_timeout: Duration) -> Self {
        let created = service.clone();
        let updated = service.clone();
        let deleted = service;

        let dispatcher = EventDispatcher::new("user-consumer", handler_timeout)
            .on::<UserCreated, _, _>(USER_CREATED, move |event| {
                on_created(created.clone(), event)
            })
            .on::<UserUpdated, _, _>(USER_UPDATED, move |event| {
                on_updated(updated.clone(), event)
            })
            .on::<UserDeleted, _, _>(USER_DELETED, move |event| {
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
impl MessageHandler for UserConsumer {
    async fn handle_message(&self, key: Option<&str>, payload: &[u8]) {
        self.dispatcher.handle_message(key, payload).await;
    }
}
