//! Expert actions over consultations.
//!
//! `pending --accept--> active --complete--> completed`. Nothing moves back.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use wise_types::ValidationError;
use wise_types::models::{
    AuthUser, Consultation, ConsultationDetail, ConsultationPatch, ConsultationStatus,
    ExpertResponse, ExpertStatistics, NewExpertResponse,
};
use wise_types::session::Session;

use crate::store::{AuthProvider, ConsultationQuery, RemoteStore, StoreError};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("sign in required")]
    Unauthenticated,
    #[error("consultation is assigned to another expert")]
    Unauthorized,
    #[error("consultation {0} not found")]
    NotFound(String),
    #[error("cannot move consultation from {from} to {to}")]
    InvalidTransition {
        from: ConsultationStatus,
        to: ConsultationStatus,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unauthenticated => Self::Unauthenticated,
            other => Self::Store(other),
        }
    }
}

#[derive(Clone)]
pub struct ExpertService {
    auth: Arc<dyn AuthProvider>,
    remote: Arc<dyn RemoteStore>,
}

impl ExpertService {
    pub fn new(auth: Arc<dyn AuthProvider>, remote: Arc<dyn RemoteStore>) -> Self {
        Self { auth, remote }
    }

    /// Take a pending consultation. The row is not checked for an existing
    /// assignee, so two experts accepting at once both succeed and the
    /// later write wins.
    pub async fn accept(&self, session: &Session, id: &str) -> Result<Consultation, WorkflowError> {
        let actor = self.actor(session).await?;
        let current = self.load(session, id).await?;
        ensure_transition(current.status, ConsultationStatus::Active)?;

        let patch = ConsultationPatch {
            status: Some(ConsultationStatus::Active),
            expert_id: Some(actor.id),
            updated_at: Some(Utc::now()),
        };
        let updated = self
            .remote
            .update_consultation(session, id, &patch)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;

        info!("Expert {} accepted consultation {}", actor.id, id);
        Ok(updated)
    }

    pub async fn complete(&self, session: &Session, id: &str) -> Result<Consultation, WorkflowError> {
        let actor = self.actor(session).await?;
        let current = self.load(session, id).await?;
        if current.expert_id != Some(actor.id) {
            warn!("Expert {} tried to complete consultation {} assigned to {:?}", actor.id, id, current.expert_id);
            return Err(WorkflowError::Unauthorized);
        }
        ensure_transition(current.status, ConsultationStatus::Completed)?;

        let patch = ConsultationPatch {
            status: Some(ConsultationStatus::Completed),
            updated_at: Some(Utc::now()),
            ..ConsultationPatch::default()
        };
        let updated = self
            .remote
            .update_consultation(session, id, &patch)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;

        info!("Expert {} completed consultation {}", actor.id, id);
        Ok(updated)
    }

    /// Record an expert's reply. A pending consultation is moved to active
    /// afterwards; if that second write fails the reply still stands.
    pub async fn save_response(
        &self,
        session: &Session,
        response: NewExpertResponse,
    ) -> Result<ExpertResponse, WorkflowError> {
        let actor = self.actor(session).await?;
        response.validate()?;

        let parent = self.load(session, &response.consultation_id).await?;
        if parent.status == ConsultationStatus::Completed {
            return Err(WorkflowError::InvalidTransition {
                from: ConsultationStatus::Completed,
                to: ConsultationStatus::Active,
            });
        }

        let saved = self
            .remote
            .insert_expert_response(session, &response.to_insert(actor.id))
            .await?;
        info!("Expert {} responded to consultation {}", actor.id, parent.id);

        if parent.status == ConsultationStatus::Pending {
            let patch = ConsultationPatch {
                status: Some(ConsultationStatus::Active),
                updated_at: Some(Utc::now()),
                ..ConsultationPatch::default()
            };
            match self.remote.update_consultation(session, &parent.id, &patch).await {
                Ok(Some(_)) => {}
                Ok(None) => warn!("Consultation {} vanished before it could be activated", parent.id),
                Err(e) => warn!("Response {} saved but consultation {} stayed pending: {}", saved.id, parent.id, e),
            }
        }

        Ok(saved)
    }

    /// Open requests, newest first.
    pub async fn pending(&self, session: &Session) -> Result<Vec<ConsultationDetail>, WorkflowError> {
        self.actor(session).await?;
        let query = ConsultationQuery::default().with_status(Some(ConsultationStatus::Pending));
        let rows = self.remote.find_consultations(session, &query).await?;
        self.hydrate(session, rows).await
    }

    pub async fn get(&self, session: &Session, id: &str) -> Result<ConsultationDetail, WorkflowError> {
        self.actor(session).await?;
        let row = self.load(session, id).await?;
        let mut details = self.hydrate(session, vec![row]).await?;
        details.pop().ok_or_else(|| WorkflowError::NotFound(id.to_string()))
    }

    /// Consultations assigned to the caller, most recently touched first.
    pub async fn assigned(
        &self,
        session: &Session,
        status: Option<ConsultationStatus>,
    ) -> Result<Vec<ConsultationDetail>, WorkflowError> {
        let actor = self.actor(session).await?;
        let query = ConsultationQuery::for_expert(actor.id).with_status(status);
        let rows = self.remote.find_consultations(session, &query).await?;
        self.hydrate(session, rows).await
    }

    pub async fn statistics(&self, session: &Session) -> Result<ExpertStatistics, WorkflowError> {
        let actor = self.actor(session).await?;
        let rows = self
            .remote
            .find_consultations(session, &ConsultationQuery::for_expert(actor.id))
            .await?;
        Ok(ExpertStatistics::from_statuses(rows.iter().map(|c| c.status)))
    }

    async fn actor(&self, session: &Session) -> Result<AuthUser, WorkflowError> {
        self.auth
            .current_user(session)
            .await?
            .ok_or(WorkflowError::Unauthenticated)
    }

    async fn load(&self, session: &Session, id: &str) -> Result<Consultation, WorkflowError> {
        self.remote
            .get_consultation(session, id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))
    }

    /// Attach requester profiles and responses, keeping row order.
    async fn hydrate(
        &self,
        session: &Session,
        rows: Vec<Consultation>,
    ) -> Result<Vec<ConsultationDetail>, WorkflowError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut user_ids: Vec<_> = rows.iter().filter_map(|c| c.user_id).collect();
        user_ids.sort();
        user_ids.dedup();
        let ids: Vec<String> = rows.iter().map(|c| c.id.clone()).collect();

        let profiles: HashMap<_, _> = self
            .remote
            .profiles(session, &user_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut responses: HashMap<String, Vec<ExpertResponse>> = HashMap::new();
        for response in self.remote.expert_responses(session, &ids).await? {
            responses
                .entry(response.consultation_id.clone())
                .or_default()
                .push(response);
        }

        Ok(rows
            .into_iter()
            .map(|consultation| ConsultationDetail {
                requester: consultation.user_id.and_then(|id| profiles.get(&id).cloned()),
                responses: responses.remove(&consultation.id).unwrap_or_default(),
                consultation,
            })
            .collect())
    }
}

fn ensure_transition(from: ConsultationStatus, to: ConsultationStatus) -> Result<(), WorkflowError> {
    if from.can_advance_to(to) {
        Ok(())
    } else {
        Err(WorkflowError::InvalidTransition { from, to })
    }
}
