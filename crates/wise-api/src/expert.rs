use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};

use wise_types::api::AssignedQuery;
use wise_types::session::Session;

use crate::AppState;
use crate::error::ApiError;

/// GET /expert/pending
pub async fn pending(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.expert.pending(&session).await?))
}

/// GET /expert/consultations?status=active
pub async fn assigned(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<AssignedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query.status_filter()?;
    Ok(Json(state.expert.assigned(&session, status).await?))
}

pub async fn statistics(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.expert.statistics(&session).await?))
}
