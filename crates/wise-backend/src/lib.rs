//! HTTP client for the hosted backend: auth, table REST and object storage.

pub mod auth;
pub mod rest;
pub mod storage;

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use wise_core::StoreError;
use wise_types::session::Session;

#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Project root, e.g. `https://xyz.supabase.co`.
    pub url: String,
    /// Public key sent as `apikey` on every call.
    pub anon_key: String,
    pub timeout: Duration,
}

/// One client for every backend surface. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    anon_key: String,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("wise-solver/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
        })
    }

    /// Request with the `apikey` header, plus the session's bearer token
    /// when it has one.
    fn request(&self, method: Method, path: &str, session: Option<&Session>) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("Backend {} {}", method, path);
        let builder = self.http.request(method, url).header("apikey", &self.anon_key);
        match session.and_then(Session::access_token) {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Like [`request`](Self::request) but fails when there is no token.
    fn authed(&self, method: Method, path: &str, session: &Session) -> Result<RequestBuilder, StoreError> {
        if session.access_token().is_none() {
            return Err(StoreError::Unauthenticated);
        }
        Ok(self.request(method, path, Some(session)))
    }
}

async fn send(builder: RequestBuilder) -> Result<Response, StoreError> {
    let res = builder.send().await.map_err(transport)?;
    if res.status().is_success() {
        Ok(res)
    } else {
        Err(error_from(res).await)
    }
}

async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, StoreError> {
    send(builder)
        .await?
        .json::<T>()
        .await
        .map_err(|e| StoreError::Decode(e.to_string()))
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Transport(e.to_string())
}

/// Map a non-success response. The auth, REST and storage services each
/// name their message field differently.
async fn error_from(res: Response) -> StoreError {
    let status = res.status().as_u16();
    if status == 401 {
        return StoreError::Unauthenticated;
    }
    let body = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            ["msg", "message", "error_description", "error"]
                .iter()
                .find_map(|field| v.get(*field).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or(body);
    StoreError::Remote { status, message }
}
