use axum::{extract::State, Extension, Json};
use chrono::Duration;

use crate::auth::middleware::AuthUser;
use crate::error::AppResult;
use crate::models::journal::Mood;
use crate::services::{
    ai::{contextual_tip, daily_quote, Quote, Tip, TipContext},
    local_today,
    reminders::todo_load,
    streaks::summary_for_user,
};
use crate::AppState;

pub async fn get_quote(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
) -> Json<Quote> {
    Json(daily_quote(&state.http, &state.config, local_today()).await)
}

pub async fn get_tip(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Tip>> {
    let today = local_today();
    let streak = summary_for_user(&state.db, auth_user.id, today).await?;
    let load = todo_load(&state.db, auth_user.id, today).await?;

    let active_goals = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM goals WHERE user_id = $1 AND status = 'active'",
    )
    .bind(auth_user.id)
    .fetch_one(&state.db)
    .await?;

    let recent_moods = sqlx::query_scalar::<_, Mood>(
        r#"
        SELECT mood FROM journal_entries
        WHERE user_id = $1 AND entry_date > $2
        ORDER BY entry_date DESC, created_at DESC
        LIMIT 7
        "#,
    )
    .bind(auth_user.id)
    .bind(today - Duration::days(7))
    .fetch_all(&state.db)
    .await?;

    let ctx = TipContext {
        current_streak: streak.current_streak,
        pending_today: load.pending_today,
        overdue: load.overdue,
        active_goals,
        recent_moods,
    };

    Ok(Json(contextual_tip(&state.http, &state.config, today, &ctx).await))
}
