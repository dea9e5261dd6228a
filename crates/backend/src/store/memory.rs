use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OAuthStateStore, StoreError, StoreResult, UserStore};
use crate::models::{NewUser, User};

/// In-process store. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    states: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_google_id(&self, google_id: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.google_id.as_deref() == Some(google_id))
            .cloned())
    }

    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let mut users = self.users.write().await;

        let taken = users.values().any(|existing| {
            existing.id == user.id
                || existing.email == user.email
                || (user.google_id.is_some() && existing.google_id == user.google_id)
        });
        if taken {
            return Err(StoreError::Duplicate);
        }

        let user = user.into_user(Utc::now());
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn record_login(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<User> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&user_id).ok_or(StoreError::NotFound)?;

        user.refresh_token = Some(refresh_token.to_string());
        user.last_login_at = Some(at);
        user.updated_at = Utc::now();

        Ok(user.clone())
    }
}

#[async_trait]
impl OAuthStateStore for MemoryStore {
    async fn save(&self, state: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        let mut states = self.states.write().await;
        let now = Utc::now();
        states.retain(|_, expiry| *expiry > now);
        states.insert(state.to_string(), expires_at);
        Ok(())
    }

    async fn consume(&self, state: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut states = self.states.write().await;
        Ok(states
            .remove(state)
            .is_some_and(|expires_at| expires_at > now))
    }
}
