use axum::{Json, extract::State, response::IntoResponse};

use wise_core::answer::Category;
use wise_types::ValidationError;
use wise_types::api::{AskRequest, AskResponse};

use crate::AppState;
use crate::error::ApiError;

/// POST /answers. Provider failures come back as a readable answer, not
/// an error status.
pub async fn ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(ValidationError::Missing("question").into());
    }
    let category = Category::from_label(req.category.as_deref().unwrap_or_default());
    let config = state.chat.with_overrides(&state.settings.effective());

    let answer = state.answers.answer(&config, question, category).await;
    Ok(Json(AskResponse { answer }))
}
