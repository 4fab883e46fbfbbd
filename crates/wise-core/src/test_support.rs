//! In-memory stores with switchable failures.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use wise_types::models::{
    AuthUser, Consultation, ConsultationInsert, ConsultationPatch, ExpertResponse,
    ExpertResponseInsert, Profile, UserType,
};
use wise_types::session::Session;

use crate::store::{
    AttachmentStore, AuthProvider, AuthSession, ConsultationQuery, LocalStore, RemoteStore,
    SignUp, SortOrder, StoreError,
};

#[derive(Default)]
pub struct MemoryLocalStore {
    items: Mutex<HashMap<String, String>>,
    pub fail: AtomicBool,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Local("storage disabled".into()));
        }
        Ok(())
    }
}

impl LocalStore for MemoryLocalStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self.items.lock().unwrap().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        self.items.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.items.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Failure switches for [`MemoryBackend`].
#[derive(Default)]
pub struct Faults {
    pub auth: AtomicBool,
    pub insert: AtomicBool,
    pub query: AtomicBool,
    pub update: AtomicBool,
    pub response_insert: AtomicBool,
}

fn fault(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
    if flag.load(Ordering::SeqCst) {
        return Err(StoreError::Remote {
            status: 503,
            message: format!("{} unavailable", what),
        });
    }
    Ok(())
}

struct Account {
    password: String,
    user: AuthUser,
}

/// Stand-in for the hosted backend: auth, tables and object storage.
#[derive(Default)]
pub struct MemoryBackend {
    accounts: Mutex<HashMap<String, Account>>,
    tokens: Mutex<HashMap<String, AuthUser>>,
    consultations: Mutex<Vec<Consultation>>,
    responses: Mutex<Vec<ExpertResponse>>,
    profiles: Mutex<Vec<Profile>>,
    uploads: Mutex<Vec<(String, String, usize)>>,
    pub faults: Faults,
    pub insert_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account with a profile and a live token; returns a member session.
    pub fn sign_in_as(&self, email: &str) -> Session {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
            username: email.split('@').next().map(str::to_string),
            user_type: Some(UserType::User),
        };
        let token = format!("token-{}", user.id);
        self.add_profile(&user);
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            Account {
                password: "password".into(),
                user: user.clone(),
            },
        );
        self.tokens.lock().unwrap().insert(token.clone(), user.clone());
        Session::member(user.id, email, token)
    }

    pub fn consultations(&self) -> Vec<Consultation> {
        self.consultations.lock().unwrap().clone()
    }

    pub fn seed_consultation(&self, row: Consultation) {
        self.consultations.lock().unwrap().push(row);
    }

    pub fn responses(&self) -> Vec<ExpertResponse> {
        self.responses.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<(String, String, usize)> {
        self.uploads.lock().unwrap().clone()
    }

    fn add_profile(&self, user: &AuthUser) {
        let now = Utc::now();
        self.profiles.lock().unwrap().push(Profile {
            id: user.id,
            username: user.username.clone().unwrap_or_default(),
            email: user.email.clone(),
            created_at: now,
            updated_at: now,
        });
    }

    fn authorize(&self, session: &Session) -> Result<AuthUser, StoreError> {
        session
            .access_token()
            .and_then(|token| self.tokens.lock().unwrap().get(token).cloned())
            .ok_or(StoreError::Unauthenticated)
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn current_user(&self, session: &Session) -> Result<Option<AuthUser>, StoreError> {
        fault(&self.faults.auth, "auth")?;
        Ok(self.authorize(session).ok())
    }

    async fn sign_up(&self, request: &SignUp) -> Result<AuthUser, StoreError> {
        fault(&self.faults.auth, "auth")?;
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(&request.email) {
            return Err(StoreError::Remote {
                status: 422,
                message: "User already registered".into(),
            });
        }
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: request.email.clone(),
            username: Some(request.username.clone()),
            user_type: Some(request.user_type),
        };
        self.add_profile(&user);
        accounts.insert(
            request.email.clone(),
            Account {
                password: request.password.clone(),
                user: user.clone(),
            },
        );
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, StoreError> {
        fault(&self.faults.auth, "auth")?;
        let user = self
            .accounts
            .lock()
            .unwrap()
            .get(email)
            .filter(|account| account.password == password)
            .map(|account| account.user.clone())
            .ok_or(StoreError::Remote {
                status: 400,
                message: "Invalid login credentials".into(),
            })?;
        let token = format!("token-{}", Uuid::new_v4());
        self.tokens.lock().unwrap().insert(token.clone(), user.clone());
        Ok(AuthSession {
            access_token: token,
            refresh_token: None,
            user,
        })
    }

    async fn sign_out(&self, session: &Session) -> Result<(), StoreError> {
        if let Some(token) = session.access_token() {
            self.tokens.lock().unwrap().remove(token);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryBackend {
    async fn insert_consultations(
        &self,
        session: &Session,
        rows: &[ConsultationInsert],
    ) -> Result<Vec<Consultation>, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        fault(&self.faults.insert, "insert")?;
        self.authorize(session)?;
        let now = Utc::now();
        let stored: Vec<Consultation> = rows
            .iter()
            .map(|row| Consultation {
                id: Uuid::new_v4().to_string(),
                user_id: Some(row.user_id),
                expert_id: None,
                title: row.title.clone(),
                description: row.description.clone(),
                kind: row.kind.clone(),
                status: row.status,
                solution_method: row.solution_method.clone(),
                created_at: row.created_at.unwrap_or(now),
                updated_at: row.updated_at.unwrap_or(now),
            })
            .collect();
        self.consultations.lock().unwrap().extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn find_consultations(
        &self,
        _session: &Session,
        query: &ConsultationQuery,
    ) -> Result<Vec<Consultation>, StoreError> {
        fault(&self.faults.query, "query")?;
        let mut rows: Vec<Consultation> = self
            .consultations
            .lock()
            .unwrap()
            .iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        match query.order {
            SortOrder::NewestCreated => rows.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortOrder::NewestUpdated => rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
        }
        Ok(rows)
    }

    async fn get_consultation(
        &self,
        _session: &Session,
        id: &str,
    ) -> Result<Option<Consultation>, StoreError> {
        fault(&self.faults.query, "query")?;
        Ok(self
            .consultations
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.id == id)
            .cloned())
    }

    async fn update_consultation(
        &self,
        session: &Session,
        id: &str,
        patch: &ConsultationPatch,
    ) -> Result<Option<Consultation>, StoreError> {
        fault(&self.faults.update, "update")?;
        self.authorize(session)?;
        let mut rows = self.consultations.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|row| row.id == id) else {
            return Ok(None);
        };
        if let Some(status) = patch.status {
            row.status = status;
        }
        if let Some(expert_id) = patch.expert_id {
            row.expert_id = Some(expert_id);
        }
        row.updated_at = patch.updated_at.unwrap_or_else(Utc::now);
        Ok(Some(row.clone()))
    }

    async fn insert_expert_response(
        &self,
        session: &Session,
        row: &ExpertResponseInsert,
    ) -> Result<ExpertResponse, StoreError> {
        fault(&self.faults.response_insert, "insert")?;
        self.authorize(session)?;
        let response = ExpertResponse {
            id: Uuid::new_v4(),
            expert_id: row.expert_id,
            consultation_id: row.consultation_id.clone(),
            complexity: row.complexity,
            estimated_time: row.estimated_time.clone(),
            suggested_price: row.suggested_price.clone(),
            response_message: row.response_message.clone(),
            status: row.status,
            created_at: Utc::now(),
        };
        self.responses.lock().unwrap().push(response.clone());
        Ok(response)
    }

    async fn expert_responses(
        &self,
        _session: &Session,
        consultation_ids: &[String],
    ) -> Result<Vec<ExpertResponse>, StoreError> {
        fault(&self.faults.query, "query")?;
        Ok(self
            .responses
            .lock()
            .unwrap()
            .iter()
            .filter(|r| consultation_ids.contains(&r.consultation_id))
            .cloned()
            .collect())
    }

    async fn profiles(&self, _session: &Session, ids: &[Uuid]) -> Result<Vec<Profile>, StoreError> {
        fault(&self.faults.query, "query")?;
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AttachmentStore for MemoryBackend {
    async fn upload(
        &self,
        session: &Session,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), StoreError> {
        self.authorize(session)?;
        self.uploads
            .lock()
            .unwrap()
            .push((path.to_string(), content_type.to_string(), bytes.len()));
        Ok(())
    }
}
