//! Contract with the hosted identity & data service.
//!
//! Everything above this module depends only on [`RemoteService`]; the
//! production implementation is [`SupabaseClient`].

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use shared::{AuthUser, Session, UserMetadata};

use crate::error::RemoteError;

mod events;
mod query;
mod storage;
mod supabase;

pub use events::{AuthEvents, AuthSubscription};
pub use query::{Filter, Order, Query, Table};
pub use storage::SessionFile;
pub use supabase::SupabaseClient;

/// Attributes accepted by [`RemoteService::update_user`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<UserMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl UserUpdate {
    pub fn metadata(data: UserMetadata) -> Self {
        Self {
            data: Some(data),
            password: None,
        }
    }

    pub fn password(password: impl Into<String>) -> Self {
        Self {
            data: None,
            password: Some(password.into()),
        }
    }
}

#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Current session, restored from storage and refreshed when expired
    async fn get_session(&self) -> Result<Option<Session>, RemoteError>;

    /// User behind the current token, as the service sees it right now
    async fn get_user(&self) -> Result<AuthUser, RemoteError>;

    /// Push-style session change stream
    fn subscribe(&self) -> AuthSubscription;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, RemoteError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> Result<AuthUser, RemoteError>;

    async fn sign_out(&self) -> Result<(), RemoteError>;

    async fn update_user(&self, update: UserUpdate) -> Result<AuthUser, RemoteError>;

    async fn select(&self, query: Query) -> Result<Vec<Value>, RemoteError>;

    /// Insert one row, returning the stored representation
    async fn insert(&self, table: Table, row: Value) -> Result<Vec<Value>, RemoteError>;

    /// Patch every row matching `query`, returning the updated rows
    async fn update(&self, query: Query, patch: Value) -> Result<Vec<Value>, RemoteError>;

    /// Delete every row matching `query`, returning the deleted rows
    async fn delete(&self, query: Query) -> Result<Vec<Value>, RemoteError>;
}
