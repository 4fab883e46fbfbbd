//! Admin-editable chatbot settings, kept in the local store.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use wise_types::models::AdminSettings;
use wise_types::session::Session;

use crate::store::{LocalStore, StoreError, read_json, write_json};

pub const ADMIN_SETTINGS_KEY: &str = "admin_settings";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("administrator session required")]
    Unauthorized,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct SettingsService {
    local: Arc<dyn LocalStore>,
}

impl SettingsService {
    pub fn new(local: Arc<dyn LocalStore>) -> Self {
        Self { local }
    }

    pub fn load(&self, session: &Session) -> Result<AdminSettings, SettingsError> {
        if !session.is_admin() {
            return Err(SettingsError::Unauthorized);
        }
        Ok(read_json(self.local.as_ref(), ADMIN_SETTINGS_KEY)?.unwrap_or_default())
    }

    /// Replace the stored settings and stamp them.
    pub fn save(
        &self,
        session: &Session,
        mut settings: AdminSettings,
    ) -> Result<AdminSettings, SettingsError> {
        if !session.is_admin() {
            return Err(SettingsError::Unauthorized);
        }
        settings.updated_at = Some(Utc::now());
        write_json(self.local.as_ref(), ADMIN_SETTINGS_KEY, &settings)?;
        info!("Admin settings updated by {:?}", session.email);
        Ok(settings)
    }

    /// Settings in force for the chatbot, for any caller. Unreadable
    /// settings count as unset.
    pub fn effective(&self) -> AdminSettings {
        match read_json(self.local.as_ref(), ADMIN_SETTINGS_KEY) {
            Ok(settings) => settings.unwrap_or_default(),
            Err(e) => {
                warn!("Could not read admin settings, using defaults: {}", e);
                AdminSettings::default()
            }
        }
    }
}
