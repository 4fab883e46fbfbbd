//! Single-turn chat-completion client for the AI answer feature.
//!
//! Every failure is mapped to a short message the user can read; nothing is
//! retried and no conversation history is kept.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use wise_types::models::AdminSettings;

pub const DEFAULT_CHAT_API_URL: &str = "https://api.deepseek.com/v1/chat/completions";
pub const DEFAULT_CHAT_MODEL: &str = "deepseek-reasoner";

const BASE_PROMPT: &str = "你是一個專業的問題解答助手。";

/// Where completions are sent. Admin settings may override each field.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_CHAT_API_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_CHAT_MODEL.to_string(),
        }
    }
}

impl ChatConfig {
    /// Non-blank admin settings win over the configured values.
    pub fn with_overrides(&self, settings: &AdminSettings) -> Self {
        fn pick(value: &Option<String>, fallback: &str) -> String {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .to_string()
        }

        Self {
            api_url: pick(&settings.chatbot_api_url, &self.api_url),
            api_key: pick(&settings.chatbot_api_key, &self.api_key),
            model: pick(&settings.chatbot_model, &self.model),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Technology,
    Business,
    Medical,
    Education,
    Life,
    Creative,
    General,
}

impl Category {
    /// Labels arrive as the app's category names; unknown labels are general.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "技术" | "技術" | "technology" => Self::Technology,
            "商业" | "商業" | "business" => Self::Business,
            "医疗" | "醫療" | "medical" => Self::Medical,
            "教育" | "education" => Self::Education,
            "生活" | "life" => Self::Life,
            "创意" | "創意" | "creative" => Self::Creative,
            _ => Self::General,
        }
    }

    fn focus(self) -> &'static str {
        match self {
            Self::Technology => "專注於解答技術相關問題，提供詳細的技術說明和解決方案。",
            Self::Business => "專注於解答商業相關問題，提供商業策略和市場分析。",
            Self::Medical => {
                "專注於解答醫療相關問題，提供健康建議和醫療知識。請注意，你的回答不能替代專業醫生的診斷。"
            }
            Self::Education => "專注於解答教育相關問題，提供學習方法和教育資源。",
            Self::Life => "專注於解答生活相關問題，提供日常生活技巧和建議。",
            Self::Creative => "專注於解答創意相關問題，提供創新思維和創意方法。",
            Self::General => "提供全面且準確的信息。",
        }
    }
}

pub fn system_prompt(category: Category) -> String {
    format!("{}{}", BASE_PROMPT, category.focus())
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnswerError {
    #[error("chat api rejected the key")]
    Unauthorized,
    #[error("chat api rate limited")]
    RateLimited,
    #[error("chat api server error")]
    Server,
    #[error("chat api returned {status}")]
    Http { status: u16, message: Option<String> },
    #[error("chat api unreachable: {0}")]
    Transport(String),
    #[error("chat api returned no choices")]
    Empty,
}

impl AnswerError {
    /// Text shown to the user in place of an answer.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized => "認證失敗，請檢查 API 密鑰。".to_string(),
            Self::RateLimited => "請求過多，請稍後再試。".to_string(),
            Self::Server => "服務器錯誤，請稍後再試。".to_string(),
            Self::Http { status, message } => format!(
                "發生錯誤 ({}): {}",
                status,
                message.as_deref().unwrap_or("未知錯誤")
            ),
            Self::Transport(_) => "發生錯誤，無法生成回答。請檢查網絡連接並稍後再試。".to_string(),
            Self::Empty => "抱歉，我無法生成回答。請稍後再試。".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Clone)]
pub struct AnswerClient {
    http: Client,
}

impl AnswerClient {
    pub fn new(timeout: Duration) -> Result<Self, AnswerError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wise-solver/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AnswerError::Transport(e.to_string()))?;
        Ok(Self { http })
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    /// Send one question and return the first choice's text.
    pub async fn complete(
        &self,
        config: &ChatConfig,
        question: &str,
        category: Category,
    ) -> Result<String, AnswerError> {
        let request = ChatRequest {
            model: &config.model,
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: system_prompt(category),
                },
                ChatMessage {
                    role: "user".into(),
                    content: question.to_string(),
                },
            ],
            temperature: 0.7,
            max_tokens: 500,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            stream: false,
        };
        debug!("Requesting answer from {} ({:?})", config.api_url, category);

        let res = self
            .http
            .post(&config.api_url)
            .bearer_auth(&config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnswerError::Transport(e.to_string()))?;

        match res.status() {
            s if s.is_success() => {
                let body: ChatResponse = res
                    .json()
                    .await
                    .map_err(|e| AnswerError::Transport(e.to_string()))?;
                body.choices
                    .into_iter()
                    .next()
                    .map(|choice| choice.message.content)
                    .ok_or(AnswerError::Empty)
            }
            StatusCode::UNAUTHORIZED => Err(AnswerError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => Err(AnswerError::RateLimited),
            StatusCode::INTERNAL_SERVER_ERROR => Err(AnswerError::Server),
            s => {
                let message = res
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|body| body["error"]["message"].as_str().map(str::to_string));
                Err(AnswerError::Http {
                    status: s.as_u16(),
                    message,
                })
            }
        }
    }

    /// Like [`complete`](Self::complete), with failures folded into the
    /// user-facing message.
    pub async fn answer(&self, config: &ChatConfig, question: &str, category: Category) -> String {
        match self.complete(config, question, category).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Answer generation failed: {}", e);
                e.user_message()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1/chat/completions", addr)
    }

    async fn reply_with(status: StatusCode, body: Value) -> ChatConfig {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || async move { (status, Json(body)) }),
        );
        ChatConfig {
            api_url: serve(app).await,
            api_key: "test-key".into(),
            model: "test-model".into(),
        }
    }

    fn client() -> AnswerClient {
        AnswerClient::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn prompts_follow_category() {
        assert_eq!(Category::from_label("医疗"), Category::Medical);
        assert_eq!(Category::from_label("其他"), Category::General);
        assert!(system_prompt(Category::Medical).contains("不能替代專業醫生的診斷"));
        assert_eq!(
            system_prompt(Category::General),
            "你是一個專業的問題解答助手。提供全面且準確的信息。"
        );
    }

    #[test]
    fn admin_settings_override_blank_fields_only() {
        let base = ChatConfig {
            api_key: "env-key".into(),
            ..ChatConfig::default()
        };
        let settings = AdminSettings {
            chatbot_model: Some("custom-model".into()),
            chatbot_api_key: Some("  ".into()),
            ..AdminSettings::default()
        };
        let merged = base.with_overrides(&settings);
        assert_eq!(merged.model, "custom-model");
        assert_eq!(merged.api_key, "env-key");
        assert_eq!(merged.api_url, DEFAULT_CHAT_API_URL);
    }

    #[tokio::test]
    async fn sends_one_request_with_fixed_parameters() {
        let seen: Arc<Mutex<Option<(HeaderMap, Value)>>> = Arc::default();
        let captured = seen.clone();
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = Some((headers, body));
                    Json(json!({
                        "choices": [{ "index": 0, "message": { "role": "assistant", "content": "先關閉總水閥。" } }]
                    }))
                }
            }),
        );
        let config = ChatConfig {
            api_url: serve(app).await,
            api_key: "test-key".into(),
            model: "test-model".into(),
        };

        let text = client()
            .complete(&config, "水管漏水怎麼辦？", Category::Life)
            .await
            .unwrap();
        assert_eq!(text, "先關閉總水閥。");

        let (headers, body) = seen.lock().unwrap().take().unwrap();
        assert_eq!(headers["authorization"], "Bearer test-key");
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], system_prompt(Category::Life));
        assert_eq!(body["messages"][1]["content"], "水管漏水怎麼辦？");
    }

    #[tokio::test]
    async fn statuses_map_to_user_messages() {
        let cases = [
            (StatusCode::UNAUTHORIZED, "認證失敗，請檢查 API 密鑰。".to_string()),
            (StatusCode::TOO_MANY_REQUESTS, "請求過多，請稍後再試。".to_string()),
            (StatusCode::INTERNAL_SERVER_ERROR, "服務器錯誤，請稍後再試。".to_string()),
            (StatusCode::BAD_REQUEST, "發生錯誤 (400): model not found".to_string()),
        ];
        for (status, expected) in cases {
            let config = reply_with(status, json!({ "error": { "message": "model not found" } })).await;
            assert_eq!(client().answer(&config, "hi", Category::General).await, expected);
        }

        let config = reply_with(StatusCode::FORBIDDEN, json!({})).await;
        assert_eq!(
            client().answer(&config, "hi", Category::General).await,
            "發生錯誤 (403): 未知錯誤"
        );
    }

    #[tokio::test]
    async fn empty_choices_and_dead_endpoints() {
        let config = reply_with(StatusCode::OK, json!({ "choices": [] })).await;
        let err = client().complete(&config, "hi", Category::General).await.unwrap_err();
        assert_eq!(err, AnswerError::Empty);
        assert_eq!(err.user_message(), "抱歉，我無法生成回答。請稍後再試。");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let config = ChatConfig {
            api_url: format!("http://{}/v1/chat/completions", addr),
            ..ChatConfig::default()
        };
        let err = client().complete(&config, "hi", Category::General).await.unwrap_err();
        assert!(matches!(err, AnswerError::Transport(_)));
    }
}
