use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation::{ValidationError, require};

/// Ids of records that only exist in the local cache start with this marker.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Titles derived from a free-text question are cut to this many characters.
const TITLE_MAX_CHARS: usize = 30;

// -- Consultations --

/// Lifecycle of a consultation. Transitions only move forward:
/// `pending -> active -> completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsultationStatus {
    Pending,
    /// Older rows were written as `accepted`.
    #[serde(alias = "accepted")]
    Active,
    Completed,
}

impl ConsultationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Active => 1,
            Self::Completed => 2,
        }
    }

    /// True when `next` is exactly one step ahead of `self`.
    pub fn can_advance_to(self, next: Self) -> bool {
        next.rank() == self.rank() + 1
    }
}

impl fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsultationStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" | "accepted" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(ValidationError::Invalid {
                field: "status",
                reason: format!("unknown status '{}'", other),
            }),
        }
    }
}

/// A user's help request. Remote rows carry a UUID id; rows staged in the
/// local cache carry a `local-` prefixed id until they are synced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub expert_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ConsultationStatus,
    #[serde(default)]
    pub solution_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Consultation {
    /// Build a cache-only record with a fresh `local-` id.
    pub fn new_local(new: &NewConsultation, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4()),
            user_id: None,
            expert_id: None,
            title: new.title.clone(),
            description: Some(new.description.clone()),
            kind: new.kind.clone(),
            status: new.status.unwrap_or(ConsultationStatus::Pending),
            solution_method: new.solution_method.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }
}

/// What a caller submits when asking for help.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConsultation {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: Option<ConsultationStatus>,
    #[serde(default)]
    pub solution_method: Option<String>,
}

impl NewConsultation {
    /// Build a request from a free-text question. The title is the first
    /// thirty characters of the question, with an ellipsis when cut.
    pub fn from_question(question: &str, kind: &str, expert_name: Option<&str>) -> Self {
        let question = question.trim();
        let title = if question.chars().count() > TITLE_MAX_CHARS {
            let head: String = question.chars().take(TITLE_MAX_CHARS).collect();
            format!("{}...", head)
        } else {
            question.to_string()
        };

        Self {
            title,
            description: question.to_string(),
            kind: kind.to_string(),
            status: None,
            solution_method: expert_name
                .filter(|name| !name.trim().is_empty())
                .map(|name| format!("專家: {}", name.trim())),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require("title", &self.title)?;
        require("description", &self.description)?;
        require("type", &self.kind)?;
        Ok(())
    }

    /// Row shape for a remote insert on behalf of `user_id`.
    pub fn to_insert(&self, user_id: Uuid) -> ConsultationInsert {
        ConsultationInsert {
            user_id,
            title: self.title.clone(),
            description: Some(self.description.clone()),
            kind: self.kind.clone(),
            status: self.status.unwrap_or(ConsultationStatus::Pending),
            solution_method: self.solution_method.clone(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// Insert payload for the remote `consultations` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationInsert {
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ConsultationStatus,
    pub solution_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConsultationInsert {
    /// Re-home a cache-only record under `user_id`, keeping its timestamps.
    pub fn from_local(record: &Consultation, user_id: Uuid) -> Self {
        Self {
            user_id,
            title: record.title.clone(),
            description: record.description.clone(),
            kind: record.kind.clone(),
            status: record.status,
            solution_method: record.solution_method.clone(),
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
        }
    }
}

/// Partial update for a consultation row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsultationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ConsultationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expert_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

// -- Expert responses --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    #[default]
    Pending,
    Responded,
}

/// An expert's quoted assessment of a consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertResponse {
    pub id: Uuid,
    pub expert_id: Uuid,
    pub consultation_id: String,
    pub complexity: u8,
    pub estimated_time: String,
    pub suggested_price: String,
    pub response_message: String,
    pub status: ResponseStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpertResponse {
    pub consultation_id: String,
    pub complexity: u8,
    pub estimated_time: String,
    pub suggested_price: String,
    pub response_message: String,
    #[serde(default)]
    pub status: Option<ResponseStatus>,
}

impl NewExpertResponse {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("consultation_id", &self.consultation_id)?;
        if !(1..=5).contains(&self.complexity) {
            return Err(ValidationError::Complexity(self.complexity));
        }
        require("estimated_time", &self.estimated_time)?;
        require("suggested_price", &self.suggested_price)?;
        require("response_message", &self.response_message)?;
        Ok(())
    }

    pub fn to_insert(&self, expert_id: Uuid) -> ExpertResponseInsert {
        ExpertResponseInsert {
            expert_id,
            consultation_id: self.consultation_id.clone(),
            complexity: self.complexity,
            estimated_time: self.estimated_time.clone(),
            suggested_price: self.suggested_price.clone(),
            response_message: self.response_message.clone(),
            status: self.status.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertResponseInsert {
    pub expert_id: Uuid,
    pub consultation_id: String,
    pub complexity: u8,
    pub estimated_time: String,
    pub suggested_price: String,
    pub response_message: String,
    pub status: ResponseStatus,
}

// -- Profiles & identity --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[default]
    User,
    Expert,
}

/// The identity behind a backend access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub user_type: Option<UserType>,
}

// -- Read models --

/// A consultation joined with its requester and any expert responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationDetail {
    #[serde(flatten)]
    pub consultation: Consultation,
    pub requester: Option<Profile>,
    pub responses: Vec<ExpertResponse>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpertStatistics {
    pub total: usize,
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    /// Whole percent of assigned consultations that are completed.
    pub completion_rate: u32,
}

impl ExpertStatistics {
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = ConsultationStatus>,
    {
        let mut stats = Self::default();
        for status in statuses {
            stats.total += 1;
            match status {
                ConsultationStatus::Pending => stats.pending += 1,
                ConsultationStatus::Active => stats.active += 1,
                ConsultationStatus::Completed => stats.completed += 1,
            }
        }
        if stats.total > 0 {
            stats.completion_rate =
                (stats.completed as f64 / stats.total as f64 * 100.0).round() as u32;
        }
        stats
    }
}

/// Chatbot settings an admin can override at runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdminSettings {
    #[serde(default)]
    pub chatbot_api_url: Option<String>,
    #[serde(default)]
    pub chatbot_api_key: Option<String>,
    #[serde(default)]
    pub chatbot_model: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}
