use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::auth::session::{ensure_session_live, verify_token, SESSION_COOKIE};
use crate::error::{AppError, AppResult};
use crate::AppState;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub session_id: Uuid,
}

/// Resolve the caller from the session cookie, falling back to a bearer token.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> AppResult<AuthUser> {
    let jar = CookieJar::from_headers(headers);
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string)
        })
        .ok_or(AppError::Unauthorized)?;

    let token_data = verify_token(&token, &state.config)?;
    ensure_session_live(&state.db, &token_data.claims, &token).await?;

    Ok(AuthUser {
        id: token_data.claims.sub,
        session_id: token_data.claims.sid,
    })
}

/// API gate: 401 JSON when there is no live session.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_user = authenticate(&state, req.headers()).await?;
    req.extensions_mut().insert(auth_user);
    Ok(next.run(req).await)
}

/// Page gate: browsers without a live session are sent to the login screen.
pub async fn require_page_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    match authenticate(&state, req.headers()).await {
        Ok(auth_user) => {
            req.extensions_mut().insert(auth_user);
            next.run(req).await
        }
        Err(AppError::Unauthorized) => Redirect::to("/login").into_response(),
        Err(e) => e.into_response(),
    }
}
