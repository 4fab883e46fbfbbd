use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use wise_core::answer::{ChatConfig, DEFAULT_CHAT_API_URL, DEFAULT_CHAT_MODEL};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

const DEFAULT_BACKEND_URL: &str = "http://localhost:54321";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub backend_url: String,
    pub backend_anon_key: String,
    pub http_timeout: Duration,
    pub chat: ChatConfig,
    pub admin_emails: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source; unset and blank values take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = var("WISE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("WISE_JWT_SECRET is unset or still a placeholder");
        }

        let port: u16 = or("WISE_PORT", "3000")
            .parse()
            .context("WISE_PORT must be a port number")?;
        let timeout_secs: u64 = match var("WISE_HTTP_TIMEOUT_SECS") {
            Some(v) => v.parse().context("WISE_HTTP_TIMEOUT_SECS must be whole seconds")?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        let admin_emails = var("WISE_ADMIN_EMAILS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host: or("WISE_HOST", "0.0.0.0"),
            port,
            db_path: or("WISE_DB_PATH", "wise.db").into(),
            jwt_secret,
            backend_url: or("WISE_BACKEND_URL", DEFAULT_BACKEND_URL),
            backend_anon_key: var("WISE_BACKEND_ANON_KEY").unwrap_or_default(),
            http_timeout: Duration::from_secs(timeout_secs),
            chat: ChatConfig {
                api_url: or("WISE_CHAT_API_URL", DEFAULT_CHAT_API_URL),
                api_key: var("WISE_CHAT_API_KEY").unwrap_or_default(),
                model: or("WISE_CHAT_MODEL", DEFAULT_CHAT_MODEL),
            },
            admin_emails,
        })
    }
}
