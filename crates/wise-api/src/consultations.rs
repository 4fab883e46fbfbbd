use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;

use wise_types::api::{
    ConsultationListResponse, ExpertResponseRequest, SavedConsultationResponse,
    SubmitConsultationRequest, UploadResponse,
};
use wise_types::session::Session;

use crate::AppState;
use crate::error::ApiError;

/// POST /consultations
pub async fn submit(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<SubmitConsultationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let saved = state
        .consultations
        .save(&session, req.into_new_consultation())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SavedConsultationResponse {
            consultation: saved.consultation,
            tier: saved.tier,
        }),
    ))
}

/// GET /consultations
pub async fn list(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    let listed = state.consultations.list(&session).await?;
    Ok(Json(ConsultationListResponse {
        consultations: listed.consultations,
        tier: listed.tier,
    }))
}

/// GET /consultations/{id}
pub async fn get_consultation(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.expert.get(&session, &id).await?))
}

pub async fn accept(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.expert.accept(&session, &id).await?))
}

pub async fn complete(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.expert.complete(&session, &id).await?))
}

/// POST /consultations/{id}/responses
pub async fn respond(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(req): Json<ExpertResponseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let saved = state
        .expert
        .save_response(&session, req.for_consultation(id))
        .await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub file_name: Option<String>,
}

/// POST /consultations/{id}/attachments?file_name=... with the raw file as
/// the body and its MIME type as Content-Type.
pub async fn upload_attachment(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");
    let file_name = params.file_name.as_deref().unwrap_or("attachment");

    let stored = state
        .attachments
        .upload(&session, &id, file_name, content_type, bytes.to_vec())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            path: stored.path,
            size: stored.size as u64,
        }),
    ))
}
