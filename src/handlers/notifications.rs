use axum::{extract::State, Extension, Json};
use chrono::Utc;
use serde::Serialize;
use sqlx::{types::Json as SqlJson, SqlitePool};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::AppResult;
use crate::extract::ValidatedJson;
use crate::models::notification::{
    normalize_reminder_times, Notification, NotificationSettings, UpdateSettingsRequest,
};
use crate::services::{local_today, reminders::build_notifications};
use crate::AppState;

/// Settings for a user, creating the default row on first access.
pub async fn load_settings(db: &SqlitePool, user_id: Uuid) -> Result<NotificationSettings, sqlx::Error> {
    let defaults = NotificationSettings::defaults(user_id);
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO notification_settings
            (user_id, reminder_enabled, reminder_times, motivation_enabled, pending_threshold, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(defaults.user_id)
    .bind(defaults.reminder_enabled)
    .bind(&defaults.reminder_times)
    .bind(defaults.motivation_enabled)
    .bind(defaults.pending_threshold)
    .bind(defaults.updated_at)
    .execute(db)
    .await?;

    sqlx::query_as::<_, NotificationSettings>("SELECT * FROM notification_settings WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await
}

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<NotificationSettings>> {
    Ok(Json(load_settings(&state.db, auth_user.id).await?))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ValidatedJson(body): ValidatedJson<UpdateSettingsRequest>,
) -> AppResult<Json<NotificationSettings>> {
    let mut settings = load_settings(&state.db, auth_user.id).await?;

    if let Some(enabled) = body.reminder_enabled {
        settings.reminder_enabled = enabled;
    }
    if let Some(times) = body.reminder_times {
        settings.reminder_times = SqlJson(normalize_reminder_times(&times));
    }
    if let Some(enabled) = body.motivation_enabled {
        settings.motivation_enabled = enabled;
    }
    if let Some(threshold) = body.pending_threshold {
        settings.pending_threshold = threshold;
    }
    settings.updated_at = Utc::now();

    sqlx::query(
        r#"
        UPDATE notification_settings
        SET reminder_enabled = $2, reminder_times = $3, motivation_enabled = $4,
            pending_threshold = $5, updated_at = $6
        WHERE user_id = $1
        "#,
    )
    .bind(auth_user.id)
    .bind(settings.reminder_enabled)
    .bind(&settings.reminder_times)
    .bind(settings.motivation_enabled)
    .bind(settings.pending_threshold)
    .bind(settings.updated_at)
    .execute(&state.db)
    .await?;

    tracing::debug!(user_id = %auth_user.id, times = ?settings.reminder_times.0, "Notification settings updated");
    Ok(Json(settings))
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub notifications: Vec<Notification>,
}

/// What the reminder worker would send this user right now.
pub async fn check_notifications(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<CheckResponse>> {
    let settings = load_settings(&state.db, auth_user.id).await?;
    let notifications = build_notifications(&state.db, auth_user.id, &settings, local_today()).await?;
    Ok(Json(CheckResponse { notifications }))
}
