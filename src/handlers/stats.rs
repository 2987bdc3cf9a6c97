use std::collections::BTreeMap;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::Response,
    Extension, Json,
};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::handlers::{goals::with_milestones, journal::with_images, notifications::load_settings};
use crate::models::activity::ActivityEntry;
use crate::models::goal::Goal;
use crate::models::journal::{JournalEntry, Mood};
use crate::models::todo::Todo;
use crate::models::user::{User, UserProfile};
use crate::services::{
    local_today,
    streaks::{summary_for_user, StreakSummary},
};
use crate::AppState;

const DEFAULT_HEATMAP_DAYS: i64 = 365;
const MAX_HEATMAP_DAYS: i64 = 730;
const DEFAULT_MOOD_DAYS: i64 = 30;
const MAX_MOOD_DAYS: i64 = 365;

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

pub async fn get_streak(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<StreakSummary>> {
    let summary = summary_for_user(&state.db, auth_user.id, local_today()).await?;
    Ok(Json(summary))
}

// ── Heatmap ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HeatmapDay {
    pub date: NaiveDate,
    pub count: i64,
    /// 0 (none) to 4 (busiest), relative to the busiest day in range.
    pub level: u8,
    pub breakdown: BTreeMap<String, i64>,
}

#[derive(Debug, Serialize)]
pub struct Heatmap {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub max_count: i64,
    pub days: Vec<HeatmapDay>,
}

pub fn heat_level(count: i64, max_count: i64) -> u8 {
    if count <= 0 || max_count <= 0 {
        return 0;
    }
    let ratio = count as f64 / max_count as f64;
    ((ratio * 4.0).ceil() as u8).clamp(1, 4)
}

/// Fold `(date, type, count)` rows into one entry per active day.
fn build_heatmap(start: NaiveDate, end: NaiveDate, rows: Vec<(NaiveDate, String, i64)>) -> Heatmap {
    let mut by_day: BTreeMap<NaiveDate, BTreeMap<String, i64>> = BTreeMap::new();
    for (date, activity_type, count) in rows {
        *by_day.entry(date).or_default().entry(activity_type).or_insert(0) += count;
    }

    let totals: Vec<(NaiveDate, i64, BTreeMap<String, i64>)> = by_day
        .into_iter()
        .map(|(date, breakdown)| (date, breakdown.values().sum(), breakdown))
        .collect();
    let max_count = totals.iter().map(|(_, c, _)| *c).max().unwrap_or(0);

    Heatmap {
        start,
        end,
        max_count,
        days: totals
            .into_iter()
            .map(|(date, count, breakdown)| HeatmapDay {
                date,
                count,
                level: heat_level(count, max_count),
                breakdown,
            })
            .collect(),
    }
}

pub async fn get_heatmap(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<DaysQuery>,
) -> AppResult<Json<Heatmap>> {
    let days = query.days.unwrap_or(DEFAULT_HEATMAP_DAYS).clamp(1, MAX_HEATMAP_DAYS);
    let end = local_today();
    let start = end - Duration::days(days - 1);

    let rows = sqlx::query_as::<_, (NaiveDate, String, i64)>(
        r#"
        SELECT activity_date, activity_type, COUNT(*)
        FROM activity_log
        WHERE user_id = $1 AND activity_type <> 'login'
          AND activity_date BETWEEN $2 AND $3
        GROUP BY activity_date, activity_type
        ORDER BY activity_date ASC
        "#,
    )
    .bind(auth_user.id)
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(build_heatmap(start, end, rows)))
}

// ── Overview ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MoodCount {
    pub mood: Mood,
    pub count: i64,
}

fn mood_distribution(rows: Vec<(Mood, i64)>) -> Vec<MoodCount> {
    Mood::ALL
        .iter()
        .map(|mood| MoodCount {
            mood: *mood,
            count: rows.iter().filter(|(m, _)| m == mood).map(|(_, c)| *c).sum(),
        })
        .collect()
}

pub async fn get_overview(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<serde_json::Value>> {
    let db = &state.db;
    let user_id = auth_user.id;
    let today = local_today();
    let month_start = today.with_day(1).unwrap_or(today);

    let (journal_total, journal_this_month) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT COUNT(*), COALESCE(SUM(CASE WHEN entry_date >= $2 THEN 1 ELSE 0 END), 0)
        FROM journal_entries WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(month_start)
    .fetch_one(db)
    .await?;

    let goal_rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM goals WHERE user_id = $1 GROUP BY status",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    let goal_count = |status: &str| {
        goal_rows
            .iter()
            .find(|(s, _)| s == status)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    };

    let average_active_progress = sqlx::query_scalar::<_, Option<f64>>(
        "SELECT AVG(progress) FROM goals WHERE user_id = $1 AND status = 'active'",
    )
    .bind(user_id)
    .fetch_one(db)
    .await?
    .map(|avg| (avg * 10.0).round() / 10.0);

    let (pending, overdue, completed_today) = sqlx::query_as::<_, (i64, i64, i64)>(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN completed = 0 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN completed = 0 AND scheduled_date < $2 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN completed = 1 AND date(completed_at, 'localtime') = $2 THEN 1 ELSE 0 END), 0)
        FROM todos WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(today)
    .fetch_one(db)
    .await?;

    let mood_rows = sqlx::query_as::<_, (Mood, i64)>(
        r#"
        SELECT mood, COUNT(*) FROM journal_entries
        WHERE user_id = $1 AND entry_date > $2
        GROUP BY mood
        "#,
    )
    .bind(user_id)
    .bind(today - Duration::days(DEFAULT_MOOD_DAYS))
    .fetch_all(db)
    .await?;

    let streak = summary_for_user(db, user_id, today).await?;

    Ok(Json(json!({
        "date": today,
        "journal": {
            "total": journal_total,
            "this_month": journal_this_month,
        },
        "goals": {
            "active": goal_count("active"),
            "completed": goal_count("completed"),
            "paused": goal_count("paused"),
            "cancelled": goal_count("cancelled"),
            "average_active_progress": average_active_progress,
        },
        "todos": {
            "pending": pending,
            "completed_today": completed_today,
            "overdue": overdue,
        },
        "streak": streak,
        "mood_distribution": mood_distribution(mood_rows),
    })))
}

// ── Mood trend ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MoodPoint {
    pub date: NaiveDate,
    pub mood: Mood,
    pub score: i32,
}

#[derive(Debug, Serialize)]
pub struct MoodTrend {
    pub days: i64,
    pub points: Vec<MoodPoint>,
    pub average: Option<f64>,
}

fn mood_trend(days: i64, rows: Vec<(NaiveDate, Mood)>) -> MoodTrend {
    let points: Vec<MoodPoint> = rows
        .into_iter()
        .map(|(date, mood)| MoodPoint {
            date,
            mood,
            score: mood.score(),
        })
        .collect();

    let average = if points.is_empty() {
        None
    } else {
        let sum: i32 = points.iter().map(|p| p.score).sum();
        Some((sum as f64 / points.len() as f64 * 100.0).round() / 100.0)
    };

    MoodTrend { days, points, average }
}

pub async fn get_mood(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<DaysQuery>,
) -> AppResult<Json<MoodTrend>> {
    let days = query.days.unwrap_or(DEFAULT_MOOD_DAYS).clamp(1, MAX_MOOD_DAYS);
    let today = local_today();

    let rows = sqlx::query_as::<_, (NaiveDate, Mood)>(
        r#"
        SELECT entry_date, mood FROM journal_entries
        WHERE user_id = $1 AND entry_date BETWEEN $2 AND $3
        ORDER BY entry_date ASC, created_at ASC
        "#,
    )
    .bind(auth_user.id)
    .bind(today - Duration::days(days - 1))
    .bind(today)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(mood_trend(days, rows)))
}

// ── Export ──────────────────────────────────────────────────────────────────

/// GET /api/stats/export - everything the user owns as a JSON download
pub async fn export_data(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Response> {
    let db = &state.db;
    let user_id = auth_user.id;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let entries = sqlx::query_as::<_, JournalEntry>(
        "SELECT * FROM journal_entries WHERE user_id = $1 ORDER BY entry_date DESC, created_at DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    let mut journal = Vec::with_capacity(entries.len());
    for entry in entries {
        journal.push(with_images(db, entry).await?);
    }

    let goal_rows = sqlx::query_as::<_, Goal>("SELECT * FROM goals WHERE user_id = $1 ORDER BY created_at ASC")
        .bind(user_id)
        .fetch_all(db)
        .await?;
    let mut goals = Vec::with_capacity(goal_rows.len());
    for goal in goal_rows {
        goals.push(with_milestones(db, goal).await?);
    }

    let todos = sqlx::query_as::<_, Todo>(
        "SELECT * FROM todos WHERE user_id = $1 ORDER BY scheduled_date ASC, created_at ASC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let settings = load_settings(db, user_id).await?;

    let activity = sqlx::query_as::<_, ActivityEntry>(
        "SELECT * FROM activity_log WHERE user_id = $1 ORDER BY created_at ASC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let username = user.username.clone();
    let export = json!({
        "exported_at": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
        "profile": UserProfile::from(user),
        "journal": journal,
        "goals": goals,
        "todos": todos,
        "notification_settings": settings,
        "activity_log": activity,
    });

    let body = serde_json::to_string_pretty(&export)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize export: {e}")))?;
    tracing::info!(user_id = %user_id, bytes = body.len(), "Data exported");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"daybook-{}-{}.json\"",
                username,
                local_today().format("%Y-%m-%d")
            ),
        )
        .body(Body::from(body))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build export response: {e}")))
}
