use axum::{extract::State, http::StatusCode, Extension, Json};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::auth::{
    middleware::AuthUser,
    password::{hash_password, verify_password},
    session::{removal_cookie, revoke_other_sessions, revoke_session, session_cookie, start_session},
};
use crate::error::{AppError, AppResult};
use crate::extract::ValidatedJson;
use crate::handlers::journal::remove_image_files;
use crate::models::activity::ActivityType;
use crate::models::notification::NotificationSettings;
use crate::models::user::{
    ChangePasswordRequest, DeleteAccountRequest, LoginRequest, RegisterRequest, User, UserProfile,
};
use crate::services::activity::log_activity;
use crate::AppState;

async fn fetch_user(db: &SqlitePool, user_id: Uuid) -> AppResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::Unauthorized)
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(body): ValidatedJson<RegisterRequest>,
) -> AppResult<(StatusCode, CookieJar, Json<UserProfile>)> {
    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE username = $1")
        .bind(&body.username)
        .fetch_one(&state.db)
        .await?;

    if existing > 0 {
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let pwd_hash = hash_password(&body.password)?;
    let user = User {
        id: Uuid::new_v4(),
        username: body.username,
        password_hash: pwd_hash,
        created_at: Utc::now(),
    };

    let mut tx = state.db.begin().await?;
    sqlx::query("INSERT INTO users (id, username, password_hash, created_at) VALUES ($1, $2, $3, $4)")
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await?;

    let settings = NotificationSettings::defaults(user.id);
    sqlx::query(
        r#"
        INSERT INTO notification_settings
            (user_id, reminder_enabled, reminder_times, motivation_enabled, pending_threshold, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(settings.user_id)
    .bind(settings.reminder_enabled)
    .bind(&settings.reminder_times)
    .bind(settings.motivation_enabled)
    .bind(settings.pending_threshold)
    .bind(settings.updated_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let session = start_session(&state.db, user.id, &state.config).await?;
    tracing::info!(user_id = %user.id, username = %user.username, "User registered");

    Ok((
        StatusCode::CREATED,
        jar.add(session_cookie(session.token, &state.config)),
        Json(user.into()),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> AppResult<(CookieJar, Json<UserProfile>)> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(&body.username)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !verify_password(&body.password, &user.password_hash)? {
        tracing::warn!(username = %body.username, "Failed login attempt");
        return Err(AppError::Unauthorized);
    }

    let session = start_session(&state.db, user.id, &state.config).await?;
    log_activity(&state.db, user.id, ActivityType::Login, None).await?;
    tracing::info!(
        user_id = %user.id,
        session_id = %session.session_id,
        expires_at = %session.expires_at,
        "User logged in"
    );

    Ok((
        jar.add(session_cookie(session.token, &state.config)),
        Json(user.into()),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<Value>)> {
    revoke_session(&state.db, auth_user.session_id).await?;
    tracing::debug!(user_id = %auth_user.id, session_id = %auth_user.session_id, "Logged out");

    Ok((
        jar.remove(removal_cookie()),
        Json(json!({ "message": "Logged out" })),
    ))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<UserProfile>> {
    let user = fetch_user(&state.db, auth_user.id).await?;
    Ok(Json(user.into()))
}

/// Change the password and sign out every other session.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ValidatedJson(body): ValidatedJson<ChangePasswordRequest>,
) -> AppResult<Json<Value>> {
    let user = fetch_user(&state.db, auth_user.id).await?;
    if !verify_password(&body.current_password, &user.password_hash)? {
        return Err(AppError::invalid("current_password", "Current password is incorrect"));
    }

    let pwd_hash = hash_password(&body.new_password)?;
    sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
        .bind(user.id)
        .bind(&pwd_hash)
        .execute(&state.db)
        .await?;

    let revoked = revoke_other_sessions(&state.db, user.id, auth_user.session_id).await?;
    tracing::info!(user_id = %user.id, revoked_sessions = revoked, "Password changed");

    Ok(Json(json!({
        "message": "Password updated",
        "revoked_sessions": revoked,
    })))
}

/// Delete the account, every row it owns and its uploaded images.
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    jar: CookieJar,
    ValidatedJson(body): ValidatedJson<DeleteAccountRequest>,
) -> AppResult<(CookieJar, Json<Value>)> {
    let user = fetch_user(&state.db, auth_user.id).await?;
    if !verify_password(&body.password, &user.password_hash)? {
        return Err(AppError::invalid("password", "Password is incorrect"));
    }

    let mut tx = state.db.begin().await?;
    let filenames = sqlx::query_scalar::<_, String>(
        r#"
        SELECT i.filename FROM journal_images i
        JOIN journal_entries e ON e.id = i.entry_id
        WHERE e.user_id = $1
        "#,
    )
    .bind(user.id)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    remove_image_files(&state.config.upload_dir, &filenames).await;
    tracing::info!(user_id = %user.id, images_removed = filenames.len(), "Account deleted");

    Ok((
        jar.remove(removal_cookie()),
        Json(json!({ "message": "Account deleted" })),
    ))
}
