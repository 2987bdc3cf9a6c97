use std::path::Path;

use axum::{
    extract::State,
    http::{HeaderMap, Uri},
    response::{Html, IntoResponse, Redirect, Response},
};

use crate::auth::middleware::authenticate;
use crate::error::{AppError, AppResult};
use crate::AppState;

/// HTML file backing each screen.
pub fn page_file(path: &str) -> Option<&'static str> {
    match path.trim_end_matches('/') {
        "" => Some("index.html"),
        "/journal" => Some("journal.html"),
        "/goals" => Some("goals.html"),
        "/todos" => Some("todos.html"),
        "/stats" => Some("stats.html"),
        "/settings" => Some("settings.html"),
        "/login" => Some("login.html"),
        "/register" => Some("register.html"),
        _ => None,
    }
}

async fn serve_page(static_dir: &Path, file: &str) -> AppResult<Response> {
    let html = tokio::fs::read_to_string(static_dir.join(file))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, file = %file, "Page template missing");
            AppError::not_found("Page")
        })?;
    Ok(Html(html).into_response())
}

/// Screens behind the page session gate.
pub async fn app_page(State(state): State<AppState>, uri: Uri) -> AppResult<Response> {
    let file = page_file(uri.path()).ok_or_else(|| AppError::not_found("Page"))?;
    serve_page(&state.config.static_dir, file).await
}

/// Login and registration. Visitors who are already signed in go home.
pub async fn public_page(State(state): State<AppState>, headers: HeaderMap, uri: Uri) -> AppResult<Response> {
    if authenticate(&state, &headers).await.is_ok() {
        return Ok(Redirect::to("/").into_response());
    }
    let file = page_file(uri.path()).ok_or_else(|| AppError::not_found("Page"))?;
    serve_page(&state.config.static_dir, file).await
}
