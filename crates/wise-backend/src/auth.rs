use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use wise_core::StoreError;
use wise_core::store::{AuthProvider, AuthSession, SignUp};
use wise_types::models::{AuthUser, UserType};
use wise_types::session::Session;

use crate::{BackendClient, send, send_json};

/// User object as returned by the auth service.
#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    user_type: Option<UserType>,
}

impl From<RemoteUser> for AuthUser {
    fn from(user: RemoteUser) -> Self {
        Self {
            id: user.id,
            email: user.email.unwrap_or_default(),
            username: user.user_metadata.username,
            user_type: user.user_metadata.user_type,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: RemoteUser,
}

#[async_trait]
impl AuthProvider for BackendClient {
    async fn current_user(&self, session: &Session) -> Result<Option<AuthUser>, StoreError> {
        if session.access_token().is_none() {
            return Ok(None);
        }
        let request = self.request(Method::GET, "/auth/v1/user", Some(session));
        match send_json::<RemoteUser>(request).await {
            Ok(user) => Ok(Some(user.into())),
            Err(StoreError::Unauthenticated) | Err(StoreError::Remote { status: 403, .. }) => {
                debug!("Backend rejected the session token");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_up(&self, request: &SignUp) -> Result<AuthUser, StoreError> {
        let body = json!({
            "email": request.email,
            "password": request.password,
            "data": {
                "username": request.username,
                "user_type": request.user_type,
                "birth_year": request.birth_year,
            }
        });
        let response: Value =
            send_json(self.request(Method::POST, "/auth/v1/signup", None).json(&body)).await?;

        // With email confirmation on, the user comes back bare; otherwise
        // it is wrapped in a session.
        let user = match response.get("user") {
            Some(user) if user.is_object() => user.clone(),
            _ => response,
        };
        serde_json::from_value::<RemoteUser>(user)
            .map(AuthUser::from)
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, StoreError> {
        let request = self
            .request(Method::POST, "/auth/v1/token", None)
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        let token: TokenResponse = send_json(request).await?;
        Ok(AuthSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user: token.user.into(),
        })
    }

    async fn sign_out(&self, session: &Session) -> Result<(), StoreError> {
        send(self.authed(Method::POST, "/auth/v1/logout", session)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};

    use super::*;
    use crate::testing::{ANON_KEY, client_for};

    const USER_ID: &str = "7d1f0a3e-2b4c-4d5e-8f60-718293a4b5c6";

    fn user_json() -> Value {
        json!({
            "id": USER_ID,
            "email": "mei@example.com",
            "user_metadata": { "username": "mei", "user_type": "expert", "birth_year": 1990 }
        })
    }

    async fn current_user(headers: HeaderMap) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
        if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some(ANON_KEY) {
            return Err((StatusCode::BAD_REQUEST, Json(json!({ "msg": "missing apikey" }))));
        }
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Bearer good-token") => Ok(Json(user_json())),
            _ => Err((StatusCode::UNAUTHORIZED, Json(json!({ "msg": "invalid JWT" })))),
        }
    }

    async fn token(
        Query(params): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
        if params.get("grant_type").map(String::as_str) != Some("password") {
            return Err((StatusCode::BAD_REQUEST, Json(json!({ "error": "unsupported_grant_type" }))));
        }
        if body["password"] != "secret123" {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" })),
            ));
        }
        Ok(Json(json!({
            "access_token": "good-token",
            "refresh_token": "refresh",
            "token_type": "bearer",
            "user": user_json()
        })))
    }

    async fn signup(Json(body): Json<Value>) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
        if body["email"] == "taken@example.com" {
            return Err((StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "msg": "User already registered" }))));
        }
        assert_eq!(body["data"]["user_type"], "expert");
        Ok(Json(user_json()))
    }

    fn app() -> Router {
        Router::new()
            .route("/auth/v1/user", get(current_user))
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/signup", post(signup))
            .route("/auth/v1/logout", post(|| async { StatusCode::NO_CONTENT }))
    }

    fn member(token: &str) -> Session {
        Session::member(Uuid::nil(), "mei@example.com", token)
    }

    #[tokio::test]
    async fn current_user_resolves_or_is_none() {
        let client = client_for(app()).await;

        let user = client.current_user(&member("good-token")).await.unwrap().unwrap();
        assert_eq!(user.id.to_string(), USER_ID);
        assert_eq!(user.username.as_deref(), Some("mei"));
        assert_eq!(user.user_type, Some(UserType::Expert));

        assert!(client.current_user(&member("stale")).await.unwrap().is_none());
        assert!(client.current_user(&Session::anonymous()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn password_sign_in() {
        let client = client_for(app()).await;

        let session = client.sign_in("mei@example.com", "secret123").await.unwrap();
        assert_eq!(session.access_token, "good-token");
        assert_eq!(session.user.email, "mei@example.com");

        let err = client.sign_in("mei@example.com", "wrong").await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Remote {
                status: 400,
                message: "Invalid login credentials".into()
            }
        );
    }

    #[tokio::test]
    async fn sign_up_sends_metadata() {
        let client = client_for(app()).await;
        let mut request = SignUp {
            email: "mei@example.com".into(),
            password: "secret123".into(),
            username: "mei".into(),
            user_type: UserType::Expert,
            birth_year: Some(1990),
        };

        let user = client.sign_up(&request).await.unwrap();
        assert_eq!(user.id.to_string(), USER_ID);

        request.email = "taken@example.com".into();
        let err = client.sign_up(&request).await.unwrap_err();
        assert!(matches!(err, StoreError::Remote { status: 422, .. }));
    }

    #[tokio::test]
    async fn sign_out_needs_a_token() {
        let client = client_for(app()).await;
        client.sign_out(&member("good-token")).await.unwrap();
        assert_eq!(
            client.sign_out(&Session::anonymous()).await.unwrap_err(),
            StoreError::Unauthenticated
        );
    }
}
