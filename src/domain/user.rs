// Copyright (c) 2025 - Cowboy AI, Inc.

//! User aggregate and its integration events

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::registry::{EventRegistry, EventRegistryBuilder, PartitionKey};

pub const USER_TOPIC: &str = "user";
pub const USER_AGGREGATE: &str = "user";

pub const USER_CREATED: &str = "user.created";
pub const USER_UPDATED: &str = "user.updated";
pub const USER_DELETED: &str = "user.deleted";

/// User domain errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UserError {
    #[error("User not found: {0}")]
    NotFound(Uuid),

    #[error("User already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("Invalid user: {0}")]
    Invalid(String),

    /// Entity or outbox write failed; nothing was committed
    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub birth_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        id: Uuid,
        email: impl Into<String>,
        name: impl Into<String>,
        birth_date: NaiveDate,
    ) -> Result<Self, UserError> {
        let user = Self {
            id,
            email: email.into(),
            name: name.into(),
            birth_date,
            created_at: Utc::now(),
        };
        user.validate()?;
        Ok(user)
    }

    pub fn validate(&self) -> Result<(), UserError> {
        if self.name.trim().is_empty() {
            return Err(UserError::Invalid("name must not be empty".to_string()));
        }
        if !self.email.contains('@') {
            return Err(UserError::Invalid(format!(
                "'{}' is not an email address",
                self.email
            )));
        }
        Ok(())
    }

    /// Age in full years today
    pub fn age(&self) -> u32 {
        self.age_on(Utc::now().date_naive())
    }

    /// Age in full years on `date`
    pub fn age_on(&self, date: NaiveDate) -> u32 {
        let mut years = date.year() - self.birth_date.year();
        if (date.month(), date.day()) < (self.birth_date.month(), self.birth_date.day()) {
            years -= 1;
        }
        years.max(0) as u32
    }
}

/// Cache key of a user read model
pub fn cache_key(id: Uuid) -> String {
    format!("user:id:{}", id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub birth_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdated {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub birth_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeleted {
    pub id: Uuid,
}

impl From<&User> for UserCreated {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            birth_date: user.birth_date,
        }
    }
}

impl From<&User> for UserUpdated {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            birth_date: user.birth_date,
        }
    }
}

impl PartitionKey for UserCreated {
    fn partition_key(&self) -> Option<String> {
        Some(self.id.to_string())
    }
}

impl PartitionKey for UserUpdated {
    fn partition_key(&self) -> Option<String> {
        Some(self.id.to_string())
    }
}

impl PartitionKey for UserDeleted {
    fn partition_key(&self) -> Option<String> {
        Some(self.id.to_string())
    }
}

/// Event declarations of the user domain
pub fn event_registry() -> EventRegistryBuilder {
    EventRegistry::builder()
        .register::<UserCreated>(USER_CREATED, USER_TOPIC)
        .register::<UserUpdated>(USER_UPDATED, USER_TOPIC)
        .register::<UserDeleted>(USER_DELETED, USER_TOPIC)
}
