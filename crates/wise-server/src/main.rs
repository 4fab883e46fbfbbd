mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use wise_api::middleware::RevokedTokens;
use wise_api::{AppState, AppStateInner};
use wise_backend::{BackendClient, BackendConfig};
use wise_core::accounts::AccountService;
use wise_core::answer::AnswerClient;
use wise_core::attachments::AttachmentService;
use wise_core::consultations::ConsultationService;
use wise_core::expert::ExpertService;
use wise_core::settings::SettingsService;
use wise_db::Database;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wise_server=debug,wise_api=debug,wise_core=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };
    if config.backend_anon_key.is_empty() {
        warn!("WISE_BACKEND_ANON_KEY is unset; backend calls will be rejected");
    }
    if config.chat.api_key.is_empty() {
        warn!("WISE_CHAT_API_KEY is unset; answers need a key from admin settings");
    }

    // Local cache
    let db = Arc::new(Database::open(&config.db_path)?);
    info!("Local cache holds {} keys", db.keys()?.len());

    // Hosted backend
    let backend = Arc::new(BackendClient::new(&BackendConfig {
        url: config.backend_url.clone(),
        anon_key: config.backend_anon_key.clone(),
        timeout: config.http_timeout,
    })?);
    info!("Using backend at {}", config.backend_url);

    let state: AppState = Arc::new(AppStateInner {
        accounts: AccountService::new(backend.clone(), config.admin_emails.clone()),
        consultations: ConsultationService::new(backend.clone(), backend.clone(), db.clone()),
        expert: ExpertService::new(backend.clone(), backend.clone()),
        attachments: AttachmentService::new(backend.clone(), backend.clone()),
        settings: SettingsService::new(db),
        answers: AnswerClient::new(config.http_timeout)?,
        chat: config.chat.clone(),
        jwt_secret: config.jwt_secret.clone(),
        revoked: RevokedTokens::default(),
    });

    let app = wise_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("WiseSolver server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
