// Copyright (c) 2025 - Cowboy AI, Inc.

//! In-memory user service

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{NewUser, UserService};
use crate::cache::TtlCache;
use crate::domain::user::{
    cache_key, User, UserCreated, UserDeleted, UserError, UserUpdated, USER_AGGREGATE,
    USER_CREATED, USER_DELETED, USER_UPDATED,
};
use crate::outbox::{InMemoryOutboxStore, OutboxEvent};
use crate::relay::RelayQueue;
use crate::tasks::BackgroundTasks;

struct ReadCache {
    cache: Arc<TtlCache<User>>,
    tasks: BackgroundTasks,
}

impl ReadCache {
    fn refresh(&self, user: User) {
        let cache = self.cache.clone();
        self.tasks.submit("user-cache-set", async move {
            cache.set(cache_key(user.id), user).await;
        });
    }

    fn evict(&self, id: Uuid) {
        let cache = self.cache.clone();
        self.tasks.submit("user-cache-delete", async move {
            cache.delete(&cache_key(id)).await;
        });
    }
}

/// User service over a hash map and an in-memory outbox
pub struct InMemoryUserService {
    users: Mutex<HashMap<Uuid, User>>,
    outbox: Option<Arc<InMemoryOutboxStore>>,
    relay: Option<RelayQueue>,
    cache: Option<ReadCache>,
}

impl InMemoryUserService {
    /// Producing service: every mutation stages an outbox row
    pub fn new(outbox: Arc<InMemoryOutboxStore>) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            outbox: Some(outbox),
            relay: None,
            cache: None,
        }
    }

    /// Consumer-side replica: mutations stage nothing
    pub fn replica() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            outbox: None,
            relay: None,
            cache: None,
        }
    }

    /// Hand staged rows to the relay right after commit
    pub fn with_relay_queue(mut self, queue: RelayQueue) -> Self {
        self.relay = Some(queue);
        self
    }

    /// Serve reads from a TTL cache refreshed in the background
    pub fn with_cache(mut self, cache: Arc<TtlCache<User>>, tasks: BackgroundTasks) -> Self {
        self.cache = Some(ReadCache { cache, tasks });
        self
    }

    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.lock().await.is_empty()
    }

    /// Write the outbox row; callers hold the users lock
    async fn stage<E: Serialize>(
        &self,
        user_id: Uuid,
        event_type: &str,
        event: &E,
    ) -> Result<Option<OutboxEvent>, UserError> {
        let Some(outbox) = &self.outbox else {
            return Ok(None);
        };

        let row = OutboxEvent::for_event(USER_AGGREGATE, user_id.to_string(), event_type, event)
            .map_err(|e| UserError::Storage(e.to_string()))?;
        outbox
            .insert(row.clone())
            .await
            .map_err(|e| UserError::Storage(e.to_string()))?;

        Ok(Some(row))
    }

    fn after_commit(&self, row: Option<OutboxEvent>) {
        if let (Some(queue), Some(row)) = (&self.relay, row) {
            queue.enqueue(row);
        }
    }
}

#[async_trait]
impl UserService for InMemoryUserService {
    async fn create_user(&self, new_user: NewUser) -> Result<User, UserError> {
        let id = new_user.id.unwrap_or_else(Uuid::now_v7);
        let user = User::new(id, new_user.email, new_user.name, new_user.birth_date)?;

        let row = {
            let mut users = self.users.lock().await;
            if users.contains_key(&id) {
                return Err(UserError::AlreadyExists(id));
            }
            let row = self.stage(id, USER_CREATED, &UserCreated::from(&user)).await?;
            users.insert(id, user.clone());
            row
        };
        self.after_commit(row);

        if let Some(cache) = &self.cache {
            cache.refresh(user.clone());
        }

        info!(user_id = %id, "User created");
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<User, UserError> {
        if let Some(cache) = &self.cache {
            if let Some(user) = cache.cache.get(&cache_key(id)).await {
                debug!(user_id = %id, "User cache hit");
                return Ok(user);
            }
        }

        let user = self
            .users
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(UserError::NotFound(id))?;

        if let Some(cache) = &self.cache {
            cache.refresh(user.clone());
        }
        Ok(user)
    }

    async fn update_user(&self, user: User) -> Result<User, UserError> {
        user.validate()?;

        let (updated, row) = {
            let mut users = self.users.lock().await;
            let current = users.get(&user.id).ok_or(UserError::NotFound(user.id))?;

            let updated = User {
                created_at: current.created_at,
                ..user
            };
            let row = self
                .stage(updated.id, USER_UPDATED, &UserUpdated::from(&updated))
                .await?;
            users.insert(updated.id, updated.clone());
            (updated, row)
        };
        self.after_commit(row);

        if let Some(cache) = &self.cache {
            cache.refresh(updated.clone());
        }

        info!(user_id = %updated.id, "User updated");
        Ok(updated)
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), UserError> {
        let row = {
            let mut users = self.users.lock().await;
            if !users.contains_key(&id) {
                return Err(UserError::NotFound(id));
            }
            let row = self.stage(id, USER_DELETED, &UserDeleted { id }).await?;
            users.remove(&id);
            row
        };
        self.after_commit(row);

        if let Some(cache) = &self.cache {
            cache.evict(id);
        }

        info!(user_id = %id, "User deleted");
        Ok(())
    }
}
