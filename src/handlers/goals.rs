use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::extract::ValidatedJson;
use crate::models::activity::ActivityType;
use crate::models::goal::{
    milestone_progress, CreateGoalRequest, Goal, GoalMilestone, GoalQuery, GoalStatus, GoalWithMilestones,
    MilestoneChange, MilestoneRequest, UpdateGoalRequest,
};
use crate::services::activity::log_activity;
use crate::AppState;

async fn fetch_goal(db: &SqlitePool, user_id: Uuid, goal_id: Uuid) -> AppResult<Goal> {
    sqlx::query_as::<_, Goal>("SELECT * FROM goals WHERE id = $1 AND user_id = $2")
        .bind(goal_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("Goal"))
}

async fn milestones_for(db: &SqlitePool, goal_id: Uuid) -> Result<Vec<GoalMilestone>, sqlx::Error> {
    sqlx::query_as::<_, GoalMilestone>(
        "SELECT * FROM goal_milestones WHERE goal_id = $1 ORDER BY created_at ASC",
    )
    .bind(goal_id)
    .fetch_all(db)
    .await
}

pub(crate) async fn with_milestones(db: &SqlitePool, goal: Goal) -> AppResult<GoalWithMilestones> {
    let milestones = milestones_for(db, goal.id).await?;
    Ok(GoalWithMilestones::new(goal, milestones))
}

/// Milestone reached only through a goal owned by `user_id`.
async fn fetch_milestone(
    db: &SqlitePool,
    user_id: Uuid,
    goal_id: Uuid,
    milestone_id: Uuid,
) -> AppResult<GoalMilestone> {
    sqlx::query_as::<_, GoalMilestone>(
        r#"
        SELECT m.* FROM goal_milestones m
        JOIN goals g ON g.id = m.goal_id
        WHERE m.id = $1 AND m.goal_id = $2 AND g.user_id = $3
        "#,
    )
    .bind(milestone_id)
    .bind(goal_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::not_found("Milestone"))
}

/// Recompute a goal's progress from its milestones and return the stored value.
/// A goal without milestones keeps whatever progress it has.
async fn recompute_progress(conn: &mut SqliteConnection, goal_id: Uuid) -> Result<i32, sqlx::Error> {
    let (total, completed) = sqlx::query_as::<_, (i64, i64)>(
        "SELECT COUNT(*), COALESCE(SUM(completed), 0) FROM goal_milestones WHERE goal_id = $1",
    )
    .bind(goal_id)
    .fetch_one(&mut *conn)
    .await?;

    match milestone_progress(completed, total) {
        Some(progress) => {
            sqlx::query("UPDATE goals SET progress = $2, updated_at = $3 WHERE id = $1")
                .bind(goal_id)
                .bind(progress)
                .bind(Utc::now())
                .execute(&mut *conn)
                .await?;
            Ok(progress)
        }
        None => {
            sqlx::query_scalar::<_, i32>("SELECT progress FROM goals WHERE id = $1")
                .bind(goal_id)
                .fetch_one(&mut *conn)
                .await
        }
    }
}

pub async fn list_goals(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<GoalQuery>,
) -> AppResult<Json<Vec<GoalWithMilestones>>> {
    let goals = sqlx::query_as::<_, Goal>(
        r#"
        SELECT * FROM goals
        WHERE user_id = $1
          AND ($2 IS NULL OR status = $2)
          AND ($3 IS NULL OR goal_type = $3)
        ORDER BY
            CASE status WHEN 'active' THEN 0 WHEN 'paused' THEN 1 WHEN 'completed' THEN 2 ELSE 3 END,
            target_date IS NULL,
            target_date ASC,
            created_at DESC
        "#,
    )
    .bind(auth_user.id)
    .bind(query.status)
    .bind(query.goal_type)
    .fetch_all(&state.db)
    .await?;

    let mut result = Vec::with_capacity(goals.len());
    for goal in goals {
        result.push(with_milestones(&state.db, goal).await?);
    }
    Ok(Json(result))
}

pub async fn create_goal(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ValidatedJson(body): ValidatedJson<CreateGoalRequest>,
) -> AppResult<(StatusCode, Json<GoalWithMilestones>)> {
    let now = Utc::now();
    let goal = Goal {
        id: Uuid::new_v4(),
        user_id: auth_user.id,
        title: body.title.trim().to_string(),
        description: body.description,
        goal_type: body.goal_type.unwrap_or_default(),
        target_date: body.target_date,
        progress: 0,
        status: GoalStatus::Active,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO goals
            (id, user_id, title, description, goal_type, target_date, progress, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(goal.id)
    .bind(goal.user_id)
    .bind(&goal.title)
    .bind(&goal.description)
    .bind(goal.goal_type)
    .bind(goal.target_date)
    .bind(goal.progress)
    .bind(goal.status)
    .bind(goal.created_at)
    .bind(goal.updated_at)
    .execute(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(GoalWithMilestones::new(goal, Vec::new()))))
}

pub async fn get_goal(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<GoalWithMilestones>> {
    let goal = fetch_goal(&state.db, auth_user.id, id).await?;
    Ok(Json(with_milestones(&state.db, goal).await?))
}

pub async fn update_goal(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateGoalRequest>,
) -> AppResult<Json<GoalWithMilestones>> {
    let mut goal = fetch_goal(&state.db, auth_user.id, id).await?;
    let previous_progress = goal.progress;

    if let Some(title) = body.title {
        goal.title = title.trim().to_string();
    }
    if let Some(description) = body.description {
        goal.description = Some(description).filter(|d| !d.trim().is_empty());
    }
    if let Some(goal_type) = body.goal_type {
        goal.goal_type = goal_type;
    }
    if let Some(target_date) = body.target_date {
        goal.target_date = Some(target_date);
    }
    if let Some(status) = body.status {
        goal.status = status;
    }
    match body.progress {
        Some(progress) => goal.progress = progress,
        None if body.status == Some(GoalStatus::Completed) => goal.progress = 100,
        None => {}
    }
    goal.updated_at = Utc::now();

    sqlx::query(
        r#"
        UPDATE goals
        SET title = $3, description = $4, goal_type = $5, target_date = $6,
            progress = $7, status = $8, updated_at = $9
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(goal.id)
    .bind(auth_user.id)
    .bind(&goal.title)
    .bind(&goal.description)
    .bind(goal.goal_type)
    .bind(goal.target_date)
    .bind(goal.progress)
    .bind(goal.status)
    .bind(goal.updated_at)
    .execute(&state.db)
    .await?;

    if body.progress.is_some() && goal.progress != previous_progress {
        let detail = format!("{}: {}%", goal.title, goal.progress);
        log_activity(&state.db, auth_user.id, ActivityType::GoalProgress, Some(&detail)).await?;
    }

    Ok(Json(with_milestones(&state.db, goal).await?))
}

pub async fn delete_goal(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let result = sqlx::query("DELETE FROM goals WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Goal"));
    }
    Ok(Json(json!({ "message": "Goal deleted" })))
}

// ── Milestones ──────────────────────────────────────────────────────────────

pub async fn create_milestone(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(goal_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<MilestoneRequest>,
) -> AppResult<(StatusCode, Json<MilestoneChange>)> {
    let goal = fetch_goal(&state.db, auth_user.id, goal_id).await?;
    let milestone = GoalMilestone {
        id: Uuid::new_v4(),
        goal_id: goal.id,
        title: body.title.trim().to_string(),
        completed: false,
        completed_at: None,
        created_at: Utc::now(),
    };

    let mut tx = state.db.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO goal_milestones (id, goal_id, title, completed, completed_at, created_at)
        VALUES ($1, $2, $3, 0, NULL, $4)
        "#,
    )
    .bind(milestone.id)
    .bind(milestone.goal_id)
    .bind(&milestone.title)
    .bind(milestone.created_at)
    .execute(&mut *tx)
    .await?;
    let goal_progress = recompute_progress(&mut tx, goal.id).await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(MilestoneChange {
            milestone: Some(milestone),
            goal_progress,
        }),
    ))
}

pub async fn update_milestone(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((goal_id, milestone_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(body): ValidatedJson<MilestoneRequest>,
) -> AppResult<Json<MilestoneChange>> {
    let mut milestone = fetch_milestone(&state.db, auth_user.id, goal_id, milestone_id).await?;
    milestone.title = body.title.trim().to_string();

    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE goal_milestones SET title = $2 WHERE id = $1")
        .bind(milestone.id)
        .bind(&milestone.title)
        .execute(&mut *tx)
        .await?;
    let goal_progress = recompute_progress(&mut tx, goal_id).await?;
    tx.commit().await?;

    Ok(Json(MilestoneChange {
        milestone: Some(milestone),
        goal_progress,
    }))
}

pub async fn toggle_milestone(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((goal_id, milestone_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<MilestoneChange>> {
    let mut milestone = fetch_milestone(&state.db, auth_user.id, goal_id, milestone_id).await?;
    milestone.completed = !milestone.completed;
    milestone.completed_at = milestone.completed.then(Utc::now);

    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE goal_milestones SET completed = $2, completed_at = $3 WHERE id = $1")
        .bind(milestone.id)
        .bind(milestone.completed)
        .bind(milestone.completed_at)
        .execute(&mut *tx)
        .await?;
    let goal_progress = recompute_progress(&mut tx, goal_id).await?;
    tx.commit().await?;

    if milestone.completed {
        let detail = format!("{}: {}%", milestone.title, goal_progress);
        log_activity(&state.db, auth_user.id, ActivityType::GoalProgress, Some(&detail)).await?;
    }

    Ok(Json(MilestoneChange {
        milestone: Some(milestone),
        goal_progress,
    }))
}

pub async fn delete_milestone(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((goal_id, milestone_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<MilestoneChange>> {
    let milestone = fetch_milestone(&state.db, auth_user.id, goal_id, milestone_id).await?;

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM goal_milestones WHERE id = $1")
        .bind(milestone.id)
        .execute(&mut *tx)
        .await?;
    let goal_progress = recompute_progress(&mut tx, goal_id).await?;
    tx.commit().await?;

    Ok(Json(MilestoneChange {
        milestone: None,
        goal_progress,
    }))
}
