use axum::{Extension, Json, extract::State, response::IntoResponse};

use wise_types::models::AdminSettings;
use wise_types::session::Session;

use crate::AppState;
use crate::error::ApiError;

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.settings.load(&session)?))
}

pub async fn put_settings(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(settings): Json<AdminSettings>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.settings.save(&session, settings)?))
}
