//! Consultation attachments in the private object bucket.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use wise_types::session::Session;

use crate::store::{AttachmentStore, AuthProvider, StoreError};

pub const ATTACHMENT_BUCKET: &str = "consultation-attachments";
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;
pub const ALLOWED_MIME_TYPES: &[&str] = &["image/png", "image/jpeg", "application/pdf", "text/plain"];

/// Hex characters of the content hash kept in the object name.
const HASH_PREFIX_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("sign in required")]
    Unauthenticated,
    #[error("file type {0} is not allowed")]
    UnsupportedType(String),
    #[error("file is {size} bytes, the limit is {max}")]
    TooLarge { size: usize, max: usize },
    #[error("file is empty")]
    Empty,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AttachmentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unauthenticated => Self::Unauthenticated,
            other => Self::Store(other),
        }
    }
}

/// Normalized MIME type if the upload is acceptable.
pub fn check_policy(content_type: &str, size: usize) -> Result<String, AttachmentError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(AttachmentError::UnsupportedType(content_type.to_string()));
    }
    if size == 0 {
        return Err(AttachmentError::Empty);
    }
    if size > MAX_ATTACHMENT_BYTES {
        return Err(AttachmentError::TooLarge {
            size,
            max: MAX_ATTACHMENT_BYTES,
        });
    }
    Ok(mime)
}

fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `<user>/<consultation>/<hash prefix>-<name>`
pub fn object_path(user_id: &str, consultation_id: &str, file_name: &str, bytes: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    format!(
        "{}/{}/{}-{}",
        user_id,
        sanitize_file_name(consultation_id),
        &digest[..HASH_PREFIX_LEN],
        sanitize_file_name(file_name)
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredAttachment {
    pub path: String,
    pub size: usize,
}

#[derive(Clone)]
pub struct AttachmentService {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn AttachmentStore>,
}

impl AttachmentService {
    pub fn new(auth: Arc<dyn AuthProvider>, store: Arc<dyn AttachmentStore>) -> Self {
        Self { auth, store }
    }

    pub async fn upload(
        &self,
        session: &Session,
        consultation_id: &str,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredAttachment, AttachmentError> {
        let mime = check_policy(content_type, bytes.len())?;
        let user = self
            .auth
            .current_user(session)
            .await?
            .ok_or(AttachmentError::Unauthenticated)?;

        let path = object_path(&user.id.to_string(), consultation_id, file_name, &bytes);
        let size = bytes.len();
        self.store.upload(session, &path, &mime, bytes).await?;

        info!("Uploaded {} ({} bytes) to {}", path, size, ATTACHMENT_BUCKET);
        Ok(StoredAttachment { path, size })
    }
}
