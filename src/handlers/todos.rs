use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::extract::ValidatedJson;
use crate::models::activity::ActivityType;
use crate::models::todo::{
    sort_todos, CreateTodoRequest, Todo, TodayTodos, TodoQuery, TodoStatusFilter, UpdateTodoRequest,
    PRIORITY_RANK_SQL,
};
use crate::services::{activity::log_activity, local_today};
use crate::AppState;

async fn fetch_todo(db: &SqlitePool, user_id: Uuid, todo_id: Uuid) -> AppResult<Todo> {
    sqlx::query_as::<_, Todo>("SELECT * FROM todos WHERE id = $1 AND user_id = $2")
        .bind(todo_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("Todo"))
}

pub async fn list_todos(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<TodoQuery>,
) -> AppResult<Json<Vec<Todo>>> {
    let completed = query.status.unwrap_or(TodoStatusFilter::All).completed();
    let (from, to) = match query.date {
        Some(date) => (Some(date), Some(date)),
        None => (query.from, query.to),
    };

    let sql = format!(
        r#"
        SELECT * FROM todos
        WHERE user_id = $1
          AND ($2 IS NULL OR scheduled_date >= $2)
          AND ($3 IS NULL OR scheduled_date <= $3)
          AND ($4 IS NULL OR completed = $4)
        ORDER BY completed ASC, {PRIORITY_RANK_SQL} ASC, scheduled_date ASC, created_at ASC
        "#
    );
    let todos = sqlx::query_as::<_, Todo>(&sql)
        .bind(auth_user.id)
        .bind(from)
        .bind(to)
        .bind(completed)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(todos))
}

/// Today's todos plus pending ones whose day has passed.
pub async fn today_todos(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<TodayTodos>> {
    let today = local_today();

    let mut todays = sqlx::query_as::<_, Todo>(
        "SELECT * FROM todos WHERE user_id = $1 AND scheduled_date = $2",
    )
    .bind(auth_user.id)
    .bind(today)
    .fetch_all(&state.db)
    .await?;

    let mut overdue = sqlx::query_as::<_, Todo>(
        "SELECT * FROM todos WHERE user_id = $1 AND scheduled_date < $2 AND completed = 0",
    )
    .bind(auth_user.id)
    .bind(today)
    .fetch_all(&state.db)
    .await?;

    sort_todos(&mut todays);
    sort_todos(&mut overdue);

    Ok(Json(TodayTodos {
        date: today,
        today: todays,
        overdue,
    }))
}

pub async fn create_todo(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ValidatedJson(body): ValidatedJson<CreateTodoRequest>,
) -> AppResult<(StatusCode, Json<Todo>)> {
    let scheduled_date = body
        .scheduled_date
        .ok_or_else(|| AppError::invalid("scheduled_date", "Scheduled date is required"))?;
    let now = Utc::now();
    let todo = Todo {
        id: Uuid::new_v4(),
        user_id: auth_user.id,
        title: body.title.trim().to_string(),
        description: body.description.filter(|d| !d.trim().is_empty()),
        priority: body.priority.unwrap_or_default(),
        scheduled_date,
        completed: false,
        completed_at: None,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO todos
            (id, user_id, title, description, priority, scheduled_date, completed, completed_at, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, 0, NULL, $7, $8)
        "#,
    )
    .bind(todo.id)
    .bind(todo.user_id)
    .bind(&todo.title)
    .bind(&todo.description)
    .bind(todo.priority)
    .bind(todo.scheduled_date)
    .bind(todo.created_at)
    .bind(todo.updated_at)
    .execute(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(todo)))
}

pub async fn get_todo(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Todo>> {
    Ok(Json(fetch_todo(&state.db, auth_user.id, id).await?))
}

pub async fn update_todo(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateTodoRequest>,
) -> AppResult<Json<Todo>> {
    let mut todo = fetch_todo(&state.db, auth_user.id, id).await?;

    if let Some(title) = body.title {
        todo.title = title.trim().to_string();
    }
    if let Some(description) = body.description {
        todo.description = Some(description).filter(|d| !d.trim().is_empty());
    }
    if let Some(priority) = body.priority {
        todo.priority = priority;
    }
    if let Some(date) = body.scheduled_date {
        todo.scheduled_date = date;
    }
    todo.updated_at = Utc::now();

    sqlx::query(
        r#"
        UPDATE todos
        SET title = $3, description = $4, priority = $5, scheduled_date = $6, updated_at = $7
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(todo.id)
    .bind(auth_user.id)
    .bind(&todo.title)
    .bind(&todo.description)
    .bind(todo.priority)
    .bind(todo.scheduled_date)
    .bind(todo.updated_at)
    .execute(&state.db)
    .await?;

    Ok(Json(todo))
}

pub async fn delete_todo(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let result = sqlx::query("DELETE FROM todos WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Todo"));
    }
    Ok(Json(json!({ "message": "Todo deleted" })))
}

/// Flip completion. Completing stamps `completed_at` and logs the activity.
pub async fn toggle_todo(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Todo>> {
    let mut todo = fetch_todo(&state.db, auth_user.id, id).await?;
    let now = Utc::now();
    todo.completed = !todo.completed;
    todo.completed_at = todo.completed.then_some(now);
    todo.updated_at = now;

    sqlx::query(
        "UPDATE todos SET completed = $3, completed_at = $4, updated_at = $5 WHERE id = $1 AND user_id = $2",
    )
    .bind(todo.id)
    .bind(auth_user.id)
    .bind(todo.completed)
    .bind(todo.completed_at)
    .bind(todo.updated_at)
    .execute(&state.db)
    .await?;

    if todo.completed {
        log_activity(&state.db, auth_user.id, ActivityType::TodoCompleted, Some(&todo.title)).await?;
    }

    Ok(Json(todo))
}
