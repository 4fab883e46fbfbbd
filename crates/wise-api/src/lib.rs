pub mod admin;
pub mod answers;
pub mod auth;
pub mod consultations;
pub mod error;
pub mod expert;
pub mod middleware;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use serde_json::{Value, json};

use wise_core::attachments::MAX_ATTACHMENT_BYTES;

pub use auth::{AppState, AppStateInner};

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/answers", post(answers::ask));

    let session_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/guest", post(auth::guest))
        .route("/auth/anonymous", post(auth::anonymous))
        .route("/auth/logout", post(auth::logout))
        .route("/consultations", post(consultations::submit).get(consultations::list))
        .route("/consultations/{id}", get(consultations::get_consultation))
        .route("/consultations/{id}/accept", post(consultations::accept))
        .route("/consultations/{id}/complete", post(consultations::complete))
        .route("/consultations/{id}/responses", post(consultations::respond))
        .route(
            "/consultations/{id}/attachments",
            // One byte over the cap so the size check reports it as JSON
            post(consultations::upload_attachment)
                .layer(DefaultBodyLimit::max(MAX_ATTACHMENT_BYTES + 1)),
        )
        .route("/expert/pending", get(expert::pending))
        .route("/expert/consultations", get(expert::assigned))
        .route("/expert/statistics", get(expert::statistics))
        .route("/admin/settings", get(admin::get_settings).put(admin::put_settings))
        .layer(from_fn_with_state(state.clone(), middleware::resolve_session));

    Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use tower::ServiceExt;

    use wise_core::accounts::AccountService;
    use wise_core::answer::{AnswerClient, ChatConfig};
    use wise_core::attachments::AttachmentService;
    use wise_core::consultations::ConsultationService;
    use wise_core::expert::ExpertService;
    use wise_core::settings::SettingsService;
    use wise_core::test_support::{MemoryBackend, MemoryLocalStore};
    use wise_types::models::{Consultation, ConsultationStatus};

    use super::*;

    fn app() -> (Router, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let local = Arc::new(MemoryLocalStore::new());
        let state: AppState = Arc::new(AppStateInner {
            accounts: AccountService::new(backend.clone(), vec!["admin@example.com".into()]),
            consultations: ConsultationService::new(backend.clone(), backend.clone(), local.clone()),
            expert: ExpertService::new(backend.clone(), backend.clone()),
            attachments: AttachmentService::new(backend.clone(), backend.clone()),
            settings: SettingsService::new(local),
            answers: AnswerClient::new(Duration::from_secs(2)).unwrap(),
            chat: ChatConfig {
                api_url: "http://127.0.0.1:9/v1/chat/completions".into(),
                ..ChatConfig::default()
            },
            jwt_secret: "test-secret".into(),
            revoked: Default::default(),
        });
        (router(state), backend)
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let res = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn login(app: &Router, email: &str, admin: bool) -> String {
        let (status, body) = call(
            app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": email, "password": "password", "admin": admin })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["token"].as_str().unwrap().to_string()
    }

    fn seed_pending(backend: &MemoryBackend) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now();
        backend.seed_consultation(Consultation {
            id: id.clone(),
            user_id: None,
            expert_id: None,
            title: "Broken heater".into(),
            description: Some("No hot water".into()),
            kind: "專家諮詢".into(),
            status: ConsultationStatus::Pending,
            solution_method: None,
            created_at: now,
            updated_at: now,
        });
        id
    }

    #[tokio::test]
    async fn health_is_public() {
        let (app, _) = app();
        let (status, body) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    async fn anonymous_token(app: &Router) -> String {
        let (status, body) = call(app, Method::POST, "/auth/anonymous", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "anonymous");
        assert!(body["device_id"].is_string());
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn anonymous_submissions_stay_on_their_device() {
        let (app, _) = app();
        let question = json!({ "question": "How do I fix a squeaky door?" });

        let (status, _) = call(&app, Method::POST, "/consultations", None, Some(question.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let device = anonymous_token(&app).await;
        let (status, body) = call(&app, Method::POST, "/consultations", Some(&device), Some(question)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["tier"], "local");
        assert_eq!(body["consultation"]["status"], "pending");

        let (status, body) = call(&app, Method::GET, "/consultations", Some(&device), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["consultations"].as_array().unwrap().len(), 1);

        let other = anonymous_token(&app).await;
        let (_, body) = call(&app, Method::GET, "/consultations", Some(&other), None).await;
        assert!(body["consultations"].as_array().unwrap().is_empty());

        let (_, body) = call(&app, Method::GET, "/consultations", None, None).await;
        assert!(body["consultations"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn login_keeps_the_device_and_syncs_its_records() {
        let (app, backend) = app();
        backend.sign_in_as("amy@example.com");
        let device = anonymous_token(&app).await;
        let question = json!({ "question": "Garden design" });
        call(&app, Method::POST, "/consultations", Some(&device), Some(question)).await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/auth/login",
            Some(&device),
            Some(json!({ "email": "amy@example.com", "password": "password" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let (_, body) = call(&app, Method::GET, "/consultations", Some(&token), None).await;
        assert_eq!(body["tier"], "synced");
        assert_eq!(backend.consultations().len(), 1);
    }

    #[tokio::test]
    async fn logout_revokes_the_token() {
        let (app, backend) = app();
        backend.sign_in_as("amy@example.com");
        let token = login(&app, "amy@example.com", false).await;
        let (_, before) = call(&app, Method::GET, "/consultations", Some(&token), None).await;
        assert_eq!(before["tier"], "remote");

        let (status, body) = call(&app, Method::POST, "/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "anonymous");
        assert!(body["user_id"].is_null());
        let replacement = body["token"].as_str().unwrap().to_string();

        let (status, body) = call(&app, Method::GET, "/consultations", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("signed out"));

        let (status, body) = call(&app, Method::GET, "/consultations", Some(&replacement), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tier"], "local");
    }

    #[tokio::test]
    async fn members_submit_remotely() {
        let (app, backend) = app();
        backend.sign_in_as("amy@example.com");
        let token = login(&app, "amy@example.com", false).await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/consultations",
            Some(&token),
            Some(json!({ "question": "Tutor for calculus", "type": "教育" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["tier"], "remote");
        assert_eq!(backend.consultations().len(), 1);
    }

    #[tokio::test]
    async fn guests_cannot_submit_and_bad_tokens_are_refused() {
        let (app, _) = app();
        let (_, body) = call(&app, Method::POST, "/auth/guest", None, None).await;
        let guest = body["token"].as_str().unwrap().to_string();
        assert_eq!(body["mode"], "guest");

        let question = json!({ "question": "Help" });
        let (status, body) = call(&app, Method::POST, "/consultations", Some(&guest), Some(question)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("guest"));

        let (status, body) = call(&app, Method::GET, "/consultations", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn expert_workflow_maps_errors() {
        let (app, backend) = app();
        backend.sign_in_as("expert@example.com");
        backend.sign_in_as("other@example.com");
        let expert = login(&app, "expert@example.com", false).await;
        let other = login(&app, "other@example.com", false).await;
        let id = seed_pending(&backend);

        let accept = format!("/consultations/{}/accept", id);
        let complete = format!("/consultations/{}/complete", id);

        let (status, _) = call(&app, Method::POST, &accept, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(&app, Method::POST, &accept, Some(&expert), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "active");

        let (status, _) = call(&app, Method::POST, &accept, Some(&expert), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app, Method::POST, &complete, Some(&other), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&app, Method::POST, &complete, Some(&expert), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");

        let (status, _) = call(&app, Method::GET, "/consultations/nope", Some(&expert), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&app, Method::GET, "/expert/statistics", Some(&expert), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["completion_rate"], 100);
    }

    #[tokio::test]
    async fn responses_and_assigned_listing() {
        let (app, backend) = app();
        backend.sign_in_as("expert@example.com");
        let expert = login(&app, "expert@example.com", false).await;
        let id = seed_pending(&backend);

        let reply = json!({
            "complexity": 2,
            "estimated_time": "1 hour",
            "suggested_price": "NT$500",
            "response_message": "Easy fix"
        });
        let uri = format!("/consultations/{}/responses", id);
        let (status, body) = call(&app, Method::POST, &uri, Some(&expert), Some(reply)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "responded");

        let bad = json!({
            "complexity": 9,
            "estimated_time": "1 hour",
            "suggested_price": "NT$500",
            "response_message": "Easy fix"
        });
        let (status, _) = call(&app, Method::POST, &uri, Some(&expert), Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&app, Method::GET, "/expert/pending", Some(&expert), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());

        let (status, _) = call(&app, Method::GET, "/expert/consultations?status=bogus", Some(&expert), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn backend_outage_is_bad_gateway() {
        let (app, backend) = app();
        backend.sign_in_as("expert@example.com");
        let expert = login(&app, "expert@example.com", false).await;
        backend.faults.query.store(true, Ordering::SeqCst);

        let (status, body) = call(&app, Method::GET, "/expert/pending", Some(&expert), None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn admin_settings_need_an_admin_session() {
        let (app, backend) = app();
        backend.sign_in_as("admin@example.com");
        backend.sign_in_as("amy@example.com");
        let member = login(&app, "amy@example.com", false).await;

        let (status, _) = call(&app, Method::GET, "/admin/settings", Some(&member), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "amy@example.com", "password": "password", "admin": true })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let admin = login(&app, "admin@example.com", true).await;
        let settings = json!({ "chatbot_model": "deepseek-chat" });
        let (status, body) = call(&app, Method::PUT, "/admin/settings", Some(&admin), Some(settings)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["updated_at"].is_string());

        let (_, body) = call(&app, Method::GET, "/admin/settings", Some(&admin), None).await;
        assert_eq!(body["chatbot_model"], "deepseek-chat");
    }

    #[tokio::test]
    async fn answers_fold_failures_into_text() {
        let (app, _) = app();

        let (status, _) = call(&app, Method::POST, "/answers", None, Some(json!({ "question": " " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            Method::POST,
            "/answers",
            None,
            Some(json!({ "question": "什麼是區塊鏈？", "category": "技术" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "發生錯誤，無法生成回答。請檢查網絡連接並稍後再試。");
    }

    #[tokio::test]
    async fn attachments_check_type_before_upload() {
        let (app, backend) = app();
        backend.sign_in_as("amy@example.com");
        let token = login(&app, "amy@example.com", false).await;

        let upload = |content_type: &'static str| {
            Request::builder()
                .method(Method::POST)
                .uri("/consultations/c1/attachments?file_name=notes.txt")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from("some notes"))
                .unwrap()
        };

        let res = app.clone().oneshot(upload("application/zip")).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let res = app.clone().oneshot(upload("text/plain")).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(backend.uploads().len(), 1);
        assert!(backend.uploads()[0].0.ends_with("-notes.txt"));
    }
}
