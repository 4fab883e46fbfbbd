use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;

use wise_core::StoreError;
use wise_core::attachments::ATTACHMENT_BUCKET;
use wise_core::store::AttachmentStore;
use wise_types::session::Session;

use crate::{BackendClient, send};

#[async_trait]
impl AttachmentStore for BackendClient {
    async fn upload(
        &self,
        session: &Session,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), StoreError> {
        let object = format!("/storage/v1/object/{}/{}", ATTACHMENT_BUCKET, path);
        let request = self
            .authed(Method::POST, &object, session)?
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes);
        send(request).await?;
        Ok(())
    }
}
