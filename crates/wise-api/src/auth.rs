use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Datelike;
use uuid::Uuid;

use wise_core::accounts::AccountService;
use wise_core::answer::{AnswerClient, ChatConfig};
use wise_core::attachments::AttachmentService;
use wise_core::consultations::ConsultationService;
use wise_core::expert::ExpertService;
use wise_core::settings::SettingsService;
use wise_types::api::{LoginRequest, RegisterRequest, SessionResponse};
use wise_types::session::Session;

use crate::error::ApiError;
use crate::middleware::{RevokedTokens, TokenId, create_token};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub accounts: AccountService,
    pub consultations: ConsultationService,
    pub expert: ExpertService,
    pub attachments: AttachmentService,
    pub settings: SettingsService,
    pub answers: AnswerClient,
    /// Chatbot endpoint from configuration; admin settings override it.
    pub chat: ChatConfig,
    pub jwt_secret: String,
    pub revoked: RevokedTokens,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let year = chrono::Utc::now().year();
    let user = state.accounts.register(&req, year).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Sign in. A device already held by the caller carries over, so records
/// staged on it are synced into the account on the first listing.
pub async fn login(
    State(state): State<AppState>,
    Extension(current): Extension<Session>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.accounts.sign_in(&req).await?;
    issue(&state, carry_device(session, &current))
}

pub async fn guest(
    State(state): State<AppState>,
    Extension(current): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    issue(&state, carry_device(state.accounts.guest(), &current))
}

/// Anonymous session with its own device slice of the local cache.
pub async fn anonymous(
    State(state): State<AppState>,
    Extension(current): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    issue(&state, carry_device(Session::anonymous(), &current))
}

/// Revoke the backend session and the presented token. The response holds
/// an anonymous token for the same device; the old token answers 401 from
/// here on.
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(token): Extension<Option<TokenId>>,
) -> Result<impl IntoResponse, ApiError> {
    state.accounts.sign_out(&session).await;
    if let Some(token) = token {
        state.revoked.revoke(token);
    }
    issue(&state, carry_device(Session::anonymous(), &session))
}

fn carry_device(session: Session, current: &Session) -> Session {
    match current.device_id {
        Some(device) => session.on_device(device),
        None => session,
    }
}

/// Sign a token for `session`, giving it a device if it has none yet.
fn issue(state: &AppState, session: Session) -> Result<Json<SessionResponse>, ApiError> {
    let session = match session.device_id {
        Some(_) => session,
        None => session.on_device(Uuid::new_v4()),
    };
    let token = create_token(&state.jwt_secret, &session).map_err(ApiError::internal)?;
    Ok(Json(SessionResponse {
        token,
        mode: session.mode,
        user_id: session.user_id,
        email: session.email,
        device_id: session.device_id,
    }))
}
