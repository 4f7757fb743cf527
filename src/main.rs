// Converse Backend - Rust
// Messaging service with AI coaching replies

use axum::Router;
use std::fs::OpenOptions;
use std::io::LineWriter;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};
use std::fmt::Write as FmtWrite;

/// Custom time formatter: [HH:mm:ss] [backend]
#[derive(Clone)]
struct BackendTimer;

impl FormatTime for BackendTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(w, "[{}] [backend]", now.format("%H:%M:%S"))
    }
}

mod auth;
mod config;
mod llm;
mod models;
mod routes;
mod services;
mod session;

use auth::{firebase_auth_extension, FirebaseAuth};
use config::Config;
use llm::AiGateway;
use routes::{ai_routes, auth_routes, chats_routes, health_routes, messages_routes, users_routes};
use services::FirestoreService;
use session::{session_extension, SessionTracker, DEFAULT_REFRESH_WINDOW};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub firestore: Arc<FirestoreService>,
    pub gateway: Arc<AiGateway>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() {
    // Open log file, wrapped in LineWriter to flush after each line
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("/tmp/converse.log")
        .expect("Failed to open log file");
    let line_writer = LineWriter::new(log_file);

    // Use non_blocking for proper async file writing
    let (non_blocking, _guard) = tracing_appender::non_blocking(line_writer);

    // Initialize tracing with both stdout and file output
    // Format: [HH:mm:ss] [backend] message
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "converse_backend=info,tower_http=info".into()),
        )
        // Stdout layer
        .with(
            fmt::layer()
                .with_timer(BackendTimer)
                .with_target(false)
                .with_level(false)
                .with_ansi(true),
        )
        // File layer (same format, no ANSI colors)
        .with(
            fmt::layer()
                .with_timer(BackendTimer)
                .with_target(false)
                .with_level(false)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Load and validate config
    let config = Config::from_env();
    if let Err(e) = config.validate() {
        tracing::error!("Configuration error: {}", e);
    }

    let project_id = config
        .firebase_project_id
        .clone()
        .unwrap_or_else(|| "converse-app".to_string());

    // Initialize Firebase Auth
    let firebase_auth = Arc::new(FirebaseAuth::new(project_id.clone()));

    // Refresh Firebase keys
    if let Err(e) = firebase_auth.refresh_keys().await {
        tracing::warn!("Failed to fetch Firebase keys: {} - auth may not work", e);
    }

    // Initialize Firestore
    let firestore = match FirestoreService::new(project_id.clone()).await {
        Ok(fs) => Arc::new(fs),
        Err(e) => {
            tracing::error!("Failed to initialize Firestore: {}", e);
            std::process::exit(1);
        }
    };

    // Session tracker keeps profiles fresh as authenticated requests arrive
    let sessions = SessionTracker::new(firestore.clone(), DEFAULT_REFRESH_WINDOW);

    // Coaching gateway
    let gateway = Arc::new(AiGateway::new(config.ai_gateway_url.clone()));

    // Create app state
    let state = AppState {
        firestore,
        gateway,
        config: Arc::new(config.clone()),
    };

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build app router with AppState, then add layers
    let app = Router::new()
        .merge(health_routes())
        .merge(auth_routes())
        .merge(users_routes())
        .merge(chats_routes())
        .merge(messages_routes())
        .merge(ai_routes())
        .with_state(state)
        .layer(firebase_auth_extension(firebase_auth))
        .layer(session_extension(sessions))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting Converse Backend on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
