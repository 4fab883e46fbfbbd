//! Two-tier persistence for consultation requests.
//!
//! Writes go to the hosted backend when the caller is signed in and fall
//! back to the local cache otherwise. Reads prefer the backend. Records
//! staged locally are pushed to the backend the first time a signed-in
//! listing finds the backend empty; after a confirmed insert the staged
//! copies are dropped from the cache. Rows that came back from the backend
//! are mirrored into the cache for offline reads and are never re-pushed.
//!
//! The cache is partitioned by the session's device id. A device only ever
//! sees its own staged records plus mirrors owned by the signed-in user.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use wise_types::ValidationError;
use wise_types::api::Tier;
use wise_types::models::{AuthUser, Consultation, ConsultationInsert, NewConsultation};
use wise_types::session::Session;

use crate::store::{
    AuthProvider, ConsultationQuery, LocalStore, RemoteStore, StoreError, read_json,
    read_json_for_update, write_json,
};

/// Prefix of the per-device cache keys holding a JSON array of
/// consultations, newest first.
pub const CONSULTATIONS_KEY: &str = "consultations";

/// `consultations:<device id>`, or nothing for a session without a device.
pub fn local_key(session: &Session) -> Option<String> {
    session
        .device_id
        .map(|device| format!("{}:{}", CONSULTATIONS_KEY, device))
}

/// Staged records belong to whoever uses the device; mirrors only to their owner.
fn visible_to(record: &Consultation, owner: Option<Uuid>) -> bool {
    record.is_local() || (owner.is_some() && record.user_id == owner)
}

#[derive(Debug, Error)]
pub enum ConsultationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The local cache failed, so there was nowhere left to fall back to.
    #[error("local store unavailable: {0}")]
    Local(StoreError),
    /// The caller is not signed in and has no device to stage records on.
    #[error("no device session for local storage")]
    NoDevice,
}

#[derive(Debug, Clone)]
pub struct Saved {
    pub consultation: Consultation,
    pub tier: Tier,
}

#[derive(Debug, Clone)]
pub struct Listed {
    pub consultations: Vec<Consultation>,
    pub tier: Tier,
}

#[derive(Clone)]
pub struct ConsultationService {
    auth: Arc<dyn AuthProvider>,
    remote: Arc<dyn RemoteStore>,
    local: Arc<dyn LocalStore>,
}

impl ConsultationService {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        remote: Arc<dyn RemoteStore>,
        local: Arc<dyn LocalStore>,
    ) -> Self {
        Self {
            auth,
            remote,
            local,
        }
    }

    /// Persist a new consultation. Remote failures degrade to a cache-only
    /// write once; there is no retry.
    pub async fn save(
        &self,
        session: &Session,
        new: NewConsultation,
    ) -> Result<Saved, ConsultationError> {
        if session.is_guest() {
            return Err(ValidationError::GuestRestricted.into());
        }
        new.validate()?;

        let Some(user) = self.identity(session).await else {
            return self.save_local(session, &new);
        };

        match self
            .remote
            .insert_consultations(session, &[new.to_insert(user.id)])
            .await
        {
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => {
                    if let Err(e) = self.mirror(session, &row) {
                        warn!("Saved consultation {} remotely but could not mirror it: {}", row.id, e);
                    }
                    info!("Saved consultation {} for user {}", row.id, user.id);
                    Ok(Saved {
                        consultation: row,
                        tier: Tier::Remote,
                    })
                }
                None => {
                    warn!("Remote insert returned no row, saving consultation locally");
                    self.save_local(session, &new)
                }
            },
            Err(e) => {
                warn!("Remote save failed, saving consultation locally: {}", e);
                self.save_local(session, &new)
            }
        }
    }

    /// List the caller's consultations, newest first.
    pub async fn list(&self, session: &Session) -> Result<Listed, ConsultationError> {
        let Some(user) = self.identity(session).await else {
            return self.list_local(session, None);
        };

        let remote = match self
            .remote
            .find_consultations(session, &ConsultationQuery::for_user(user.id))
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Remote listing failed, reading local cache: {}", e);
                return self.list_local(session, Some(user.id));
            }
        };

        if !remote.is_empty() {
            return Ok(Listed {
                consultations: remote,
                tier: Tier::Remote,
            });
        }

        let local = self.read_local(session, Some(user.id))?;
        if local.is_empty() {
            return Ok(Listed {
                consultations: Vec::new(),
                tier: Tier::Remote,
            });
        }

        let tier = if self.sync(session, user.id, &local).await {
            Tier::Synced
        } else {
            Tier::Local
        };
        Ok(Listed {
            consultations: local,
            tier,
        })
    }

    async fn identity(&self, session: &Session) -> Option<AuthUser> {
        match self.auth.current_user(session).await {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                debug!("No signed-in user, using local cache");
                None
            }
            Err(e) => {
                warn!("Identity lookup failed, using local cache: {}", e);
                None
            }
        }
    }

    /// Push this device's staged records to the backend. Returns true when
    /// they were inserted and removed from the cache.
    async fn sync(&self, session: &Session, user_id: Uuid, local: &[Consultation]) -> bool {
        let staged: Vec<&Consultation> = local.iter().filter(|c| c.is_local()).collect();
        if staged.is_empty() {
            return false;
        }

        let rows: Vec<ConsultationInsert> = staged
            .iter()
            .map(|c| ConsultationInsert::from_local(c, user_id))
            .collect();

        if let Err(e) = self.remote.insert_consultations(session, &rows).await {
            warn!("Syncing {} local consultations failed: {}", rows.len(), e);
            return false;
        }

        let synced: Vec<&str> = staged.iter().map(|c| c.id.as_str()).collect();
        if let Some(key) = local_key(session) {
            let result = self.load_for_update(&key).and_then(|mut current| {
                current.retain(|c| !synced.contains(&c.id.as_str()));
                self.write_local(&key, &current)
            });
            if let Err(e) = result {
                warn!("Synced consultations but could not clear them locally: {}", e);
            }
        }

        info!("Synced {} local consultations for user {}", synced.len(), user_id);
        true
    }

    fn save_local(&self, session: &Session, new: &NewConsultation) -> Result<Saved, ConsultationError> {
        let key = local_key(session).ok_or(ConsultationError::NoDevice)?;
        let record = Consultation::new_local(new, Utc::now());
        let mut records = self.load_for_update(&key)?;
        records.insert(0, record.clone());
        self.write_local(&key, &records)?;
        debug!("Staged consultation {} in local cache", record.id);
        Ok(Saved {
            consultation: record,
            tier: Tier::Local,
        })
    }

    /// Keep a copy of a remote row in the device's cache under its remote id.
    fn mirror(&self, session: &Session, row: &Consultation) -> Result<(), ConsultationError> {
        let Some(key) = local_key(session) else {
            return Ok(());
        };
        let mut records = self.load_for_update(&key)?;
        records.retain(|c| c.id != row.id);
        records.insert(0, row.clone());
        self.write_local(&key, &records)
    }

    fn list_local(&self, session: &Session, owner: Option<Uuid>) -> Result<Listed, ConsultationError> {
        Ok(Listed {
            consultations: self.read_local(session, owner)?,
            tier: Tier::Local,
        })
    }

    /// Records on the session's device that `owner` may see. Unreadable
    /// cache contents read as empty.
    fn read_local(
        &self,
        session: &Session,
        owner: Option<Uuid>,
    ) -> Result<Vec<Consultation>, ConsultationError> {
        let Some(key) = local_key(session) else {
            return Ok(Vec::new());
        };
        let records: Vec<Consultation> = read_json(self.local.as_ref(), &key)
            .map(Option::unwrap_or_default)
            .map_err(ConsultationError::Local)?;
        Ok(records.into_iter().filter(|c| visible_to(c, owner)).collect())
    }

    fn load_for_update(&self, key: &str) -> Result<Vec<Consultation>, ConsultationError> {
        read_json_for_update(self.local.as_ref(), key)
            .map(Option::unwrap_or_default)
            .map_err(ConsultationError::Local)
    }

    fn write_local(&self, key: &str, records: &[Consultation]) -> Result<(), ConsultationError> {
        write_json(self.local.as_ref(), key, records).map_err(ConsultationError::Local)
    }
}
