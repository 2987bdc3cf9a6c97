use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer};

mod auth;
mod config;
mod db;
mod error;
mod extract;
mod handlers;
mod models;
mod services;

#[cfg(test)]
mod tests;

use auth::rate_limit::RateLimitState;
use config::Config;

const CLAUDE_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<Config>,
    pub ws_tx: broadcast::Sender<String>,
    pub rate_limiter: RateLimitState,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Arc<Config>) -> anyhow::Result<Self> {
        let (ws_tx, _) = broadcast::channel::<String>(256);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(CLAUDE_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            rate_limiter: RateLimitState::new(config.auth_rate_limit),
            db,
            config,
            ws_tx,
            http,
        })
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let Some(origin) = config
        .frontend_url
        .as_deref()
        .and_then(|url| url.parse::<HeaderValue>().ok())
    else {
        return CorsLayer::new();
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

pub fn app(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes.saturating_mul(10) + 64 * 1024;

    let auth_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_auth,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/login", get(handlers::pages::public_page))
        .route("/register", get(handlers::pages::public_page))
        .nest_service("/static", ServeDir::new(state.config.static_dir.join("static")))
        .merge(auth_routes);

    let protected_routes = Router::new()
        // Account
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/auth/password", put(handlers::auth::change_password))
        .route("/api/auth/account", axum::routing::delete(handlers::auth::delete_account))
        // Journal
        .route(
            "/api/journal",
            get(handlers::journal::list_entries).post(handlers::journal::create_entry),
        )
        .route(
            "/api/journal/:id",
            get(handlers::journal::get_entry)
                .put(handlers::journal::update_entry)
                .delete(handlers::journal::delete_entry),
        )
        .route(
            "/api/journal/:id/images",
            post(handlers::journal::upload_images).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/journal/:id/images/:image_id",
            axum::routing::delete(handlers::journal::delete_image),
        )
        .route("/uploads/:filename", get(handlers::journal::serve_image))
        // Goals & milestones
        .route(
            "/api/goals",
            get(handlers::goals::list_goals).post(handlers::goals::create_goal),
        )
        .route(
            "/api/goals/:id",
            get(handlers::goals::get_goal)
                .put(handlers::goals::update_goal)
                .delete(handlers::goals::delete_goal),
        )
        .route("/api/goals/:id/milestones", post(handlers::goals::create_milestone))
        .route(
            "/api/goals/:id/milestones/:mid",
            put(handlers::goals::update_milestone).delete(handlers::goals::delete_milestone),
        )
        .route(
            "/api/goals/:id/milestones/:mid/toggle",
            post(handlers::goals::toggle_milestone),
        )
        // Todos
        .route(
            "/api/todos",
            get(handlers::todos::list_todos).post(handlers::todos::create_todo),
        )
        .route("/api/todos/today", get(handlers::todos::today_todos))
        .route(
            "/api/todos/:id",
            get(handlers::todos::get_todo)
                .put(handlers::todos::update_todo)
                .delete(handlers::todos::delete_todo),
        )
        .route("/api/todos/:id/toggle", post(handlers::todos::toggle_todo))
        // Stats
        .route("/api/stats/streak", get(handlers::stats::get_streak))
        .route("/api/stats/heatmap", get(handlers::stats::get_heatmap))
        .route("/api/stats/overview", get(handlers::stats::get_overview))
        .route("/api/stats/mood", get(handlers::stats::get_mood))
        .route("/api/stats/export", get(handlers::stats::export_data))
        // Notifications
        .route(
            "/api/notifications/settings",
            get(handlers::notifications::get_settings).put(handlers::notifications::update_settings),
        )
        .route("/api/notifications/check", get(handlers::notifications::check_notifications))
        .route("/ws", get(handlers::ws::ws_handler))
        // AI
        .route("/api/ai/quote", get(handlers::ai::get_quote))
        .route("/api/ai/tip", get(handlers::ai::get_tip))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    let page_routes = Router::new()
        .route("/", get(handlers::pages::app_page))
        .route("/journal", get(handlers::pages::app_page))
        .route("/goals", get(handlers::pages::app_page))
        .route("/todos", get(handlers::pages::app_page))
        .route("/stats", get(handlers::pages::app_page))
        .route("/settings", get(handlers::pages::app_page))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_page_session,
        ));

    let cors = cors_layer(&state.config);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(page_routes)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "daybook_api=debug,tower_http=info".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env()?);

    let db = db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    db::run_migrations(&db)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("Failed to create upload directory {}", config.upload_dir.display()))?;

    let state = AppState::new(db, config.clone())?;

    services::reminders::spawn_reminder_worker(
        state.db.clone(),
        state.ws_tx.clone(),
        config.reminder_poll_secs,
    );
    state.rate_limiter.spawn_cleanup();

    if config.ai_enabled() {
        tracing::info!(model = %config.claude_model, "Claude API enabled");
    } else {
        tracing::info!("CLAUDE_API_KEY not set, quotes and tips use the local fallback");
    }

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
