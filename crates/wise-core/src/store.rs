//! Seams between the services and the stores they sit on.
//!
//! The remote side is the hosted backend (auth, tables, object storage).
//! The local side is a string-keyed cache holding JSON documents.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use wise_types::models::{
    AuthUser, Consultation, ConsultationInsert, ConsultationPatch, ConsultationStatus,
    ExpertResponse, ExpertResponseInsert, Profile, UserType,
};
use wise_types::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("backend returned {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("network error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("local store error: {0}")]
    Local(String),
}

// -- Auth --

#[derive(Debug, Clone)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub username: String,
    pub user_type: UserType,
    pub birth_year: Option<i32>,
}

/// A signed-in backend session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve the identity behind the session's access token.
    /// `Ok(None)` when there is no token or the backend rejects it.
    async fn current_user(&self, session: &Session) -> Result<Option<AuthUser>, StoreError>;

    async fn sign_up(&self, request: &SignUp) -> Result<AuthUser, StoreError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, StoreError>;

    async fn sign_out(&self, session: &Session) -> Result<(), StoreError>;
}

// -- Tables --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    NewestCreated,
    NewestUpdated,
}

/// Equality filters over the `consultations` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsultationQuery {
    pub user_id: Option<Uuid>,
    pub expert_id: Option<Uuid>,
    pub status: Option<ConsultationStatus>,
    pub order: SortOrder,
}

impl ConsultationQuery {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn for_expert(expert_id: Uuid) -> Self {
        Self {
            expert_id: Some(expert_id),
            order: SortOrder::NewestUpdated,
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: Option<ConsultationStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn matches(&self, row: &Consultation) -> bool {
        self.user_id.is_none_or(|id| row.user_id == Some(id))
            && self.expert_id.is_none_or(|id| row.expert_id == Some(id))
            && self.status.is_none_or(|status| row.status == status)
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert rows and return them as stored (ids and timestamps assigned).
    async fn insert_consultations(
        &self,
        session: &Session,
        rows: &[ConsultationInsert],
    ) -> Result<Vec<Consultation>, StoreError>;

    async fn find_consultations(
        &self,
        session: &Session,
        query: &ConsultationQuery,
    ) -> Result<Vec<Consultation>, StoreError>;

    async fn get_consultation(
        &self,
        session: &Session,
        id: &str,
    ) -> Result<Option<Consultation>, StoreError>;

    /// Apply a patch; `Ok(None)` when no row has that id.
    async fn update_consultation(
        &self,
        session: &Session,
        id: &str,
        patch: &ConsultationPatch,
    ) -> Result<Option<Consultation>, StoreError>;

    async fn insert_expert_response(
        &self,
        session: &Session,
        row: &ExpertResponseInsert,
    ) -> Result<ExpertResponse, StoreError>;

    async fn expert_responses(
        &self,
        session: &Session,
        consultation_ids: &[String],
    ) -> Result<Vec<ExpertResponse>, StoreError>;

    async fn profiles(&self, session: &Session, ids: &[Uuid]) -> Result<Vec<Profile>, StoreError>;
}

// -- Object storage --

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn upload(
        &self,
        session: &Session,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), StoreError>;
}

// -- Local cache --

/// Synchronous key-value cache. Each call is atomic on its own; sequences
/// of calls are not.
pub trait LocalStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}

/// Read a JSON document. A value that no longer parses is logged and
/// treated as absent.
pub fn read_json<T: DeserializeOwned>(
    store: &dyn LocalStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(raw) = store.get_item(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!("Ignoring unreadable local value under '{}': {}", key, e);
            Ok(None)
        }
    }
}

/// Read a JSON document that is about to be rewritten. A value that does
/// not parse is an error and is left in place.
pub fn read_json_for_update<T: DeserializeOwned>(
    store: &dyn LocalStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(raw) = store.get_item(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| StoreError::Local(format!("unreadable value under '{}': {}", key, e)))
}

pub fn write_json<T: Serialize + ?Sized>(
    store: &dyn LocalStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|e| StoreError::Local(e.to_string()))?;
    store.set_item(key, &raw)
}
