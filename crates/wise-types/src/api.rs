use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Consultation, ConsultationStatus, NewConsultation, NewExpertResponse, ResponseStatus, UserType,
};
use crate::session::SessionMode;
use crate::validation::{ValidationError, require};

/// Minimum age for expert accounts.
pub const EXPERT_MIN_AGE: i32 = 12;

/// Minimum password length accepted by the hosted auth service.
const MIN_PASSWORD_LEN: usize = 6;

// -- Auth --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub user_type: UserType,
    #[serde(default)]
    pub birth_year: Option<i32>,
    #[serde(default)]
    pub agree_to_terms: bool,
}

impl RegisterRequest {
    pub fn validate(&self, current_year: i32) -> Result<(), ValidationError> {
        if !self.agree_to_terms {
            return Err(ValidationError::TermsNotAccepted);
        }
        require("email", &self.email)?;
        if !self.email.contains('@') {
            return Err(ValidationError::Invalid {
                field: "email",
                reason: "not an email address".into(),
            });
        }
        require("username", &self.username)?;
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::Invalid {
                field: "password",
                reason: format!("must be at least {} characters", MIN_PASSWORD_LEN),
            });
        }
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        if self.user_type == UserType::Expert {
            let birth_year = self.birth_year.ok_or(ValidationError::Missing("birth_year"))?;
            if current_year - birth_year < EXPERT_MIN_AGE {
                return Err(ValidationError::TooYoung { min: EXPERT_MIN_AGE });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Request an admin session; the email must be on the admin allow-list.
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub mode: SessionMode,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub device_id: Option<Uuid>,
}

// -- Consultations --

/// Which store answered a consultation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Remote,
    Local,
    /// Local records that were pushed to the remote store during this call.
    Synced,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitConsultationRequest {
    pub question: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub expert_name: Option<String>,
}

impl SubmitConsultationRequest {
    pub const DEFAULT_KIND: &'static str = "專家諮詢";

    pub fn into_new_consultation(self) -> NewConsultation {
        let kind = self
            .kind
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| Self::DEFAULT_KIND.to_string());
        NewConsultation::from_question(&self.question, &kind, self.expert_name.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedConsultationResponse {
    pub consultation: Consultation,
    pub tier: Tier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationListResponse {
    pub consultations: Vec<Consultation>,
    pub tier: Tier,
}

// -- Expert workflow --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpertResponseRequest {
    pub complexity: u8,
    pub estimated_time: String,
    pub suggested_price: String,
    pub response_message: String,
    #[serde(default)]
    pub status: Option<ResponseStatus>,
}

impl ExpertResponseRequest {
    pub fn for_consultation(self, consultation_id: String) -> NewExpertResponse {
        NewExpertResponse {
            consultation_id,
            complexity: self.complexity,
            estimated_time: self.estimated_time,
            suggested_price: self.suggested_price,
            response_message: self.response_message,
            status: Some(self.status.unwrap_or(ResponseStatus::Responded)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignedQuery {
    /// A status name, or `all` / absent for every status.
    #[serde(default)]
    pub status: Option<String>,
}

impl AssignedQuery {
    pub fn status_filter(&self) -> Result<Option<ConsultationStatus>, ValidationError> {
        match self.status.as_deref() {
            None | Some("all") | Some("") => Ok(None),
            Some(s) => s.parse().map(Some),
        }
    }
}

// -- AI answers --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

// -- Attachments --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub path: String,
    pub size: u64,
}

// -- Errors --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
