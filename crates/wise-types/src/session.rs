use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the caller entered the application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// No sign-in at all. Reads and writes go to the local cache.
    #[default]
    Anonymous,
    /// Browsing only; cannot submit consultations.
    Guest,
    Member,
    Admin,
}

/// Caller context handed explicitly to every service call.
///
/// The access token is the hosted backend's token. Identity is always
/// re-resolved from it, so a stale `user_id` here is only a display hint.
/// `device_id` names the client's own slice of the local cache; a session
/// without one has no local tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub mode: SessionMode,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub device_id: Option<Uuid>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn guest() -> Self {
        Self {
            mode: SessionMode::Guest,
            ..Self::default()
        }
    }

    pub fn member(user_id: Uuid, email: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            mode: SessionMode::Member,
            user_id: Some(user_id),
            email: Some(email.into()),
            access_token: Some(access_token.into()),
            device_id: None,
        }
    }

    pub fn admin(user_id: Uuid, email: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            mode: SessionMode::Admin,
            ..Self::member(user_id, email, access_token)
        }
    }

    pub fn on_device(self, device_id: Uuid) -> Self {
        Self {
            device_id: Some(device_id),
            ..self
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn is_guest(&self) -> bool {
        self.mode == SessionMode::Guest
    }

    pub fn is_admin(&self) -> bool {
        self.mode == SessionMode::Admin
    }
}
