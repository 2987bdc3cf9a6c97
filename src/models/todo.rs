use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Sort rank, most pressing first. Mirrors `PRIORITY_RANK_SQL`.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

pub const PRIORITY_RANK_SQL: &str =
    "CASE priority WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Todo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub scheduled_date: NaiveDate,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pending before completed, then priority rank, scheduled date and age.
pub fn sort_todos(todos: &mut [Todo]) {
    todos.sort_by(|a, b| {
        a.completed
            .cmp(&b.completed)
            .then(a.priority.rank().cmp(&b.priority.rank()))
            .then(a.scheduled_date.cmp(&b.scheduled_date))
            .then(a.created_at.cmp(&b.created_at))
    });
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTodoRequest {
    #[serde(default)]
    #[validate(
        custom = "crate::extract::not_blank",
        length(max = 200, message = "Title must be under 200 characters")
    )]
    pub title: String,

    #[validate(length(max = 2000, message = "Description must be under 2000 characters"))]
    pub description: Option<String>,

    /// Defaults to `medium`.
    pub priority: Option<Priority>,

    #[validate(required(message = "Scheduled date is required"))]
    pub scheduled_date: Option<NaiveDate>,
}

/// PUT /api/todos/:id: partial update
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTodoRequest {
    #[validate(
        custom = "crate::extract::not_blank",
        length(max = 200, message = "Title must be under 200 characters")
    )]
    pub title: Option<String>,

    #[validate(length(max = 2000, message = "Description must be under 2000 characters"))]
    pub description: Option<String>,

    pub priority: Option<Priority>,

    pub scheduled_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TodoStatusFilter {
    Pending,
    Completed,
    All,
}

impl TodoStatusFilter {
    /// Value bound against the `completed` column; `None` matches both.
    pub fn completed(self) -> Option<bool> {
        match self {
            TodoStatusFilter::Pending => Some(false),
            TodoStatusFilter::Completed => Some(true),
            TodoStatusFilter::All => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TodoQuery {
    pub date: Option<NaiveDate>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<TodoStatusFilter>,
}

#[derive(Debug, Serialize)]
pub struct TodayTodos {
    pub date: NaiveDate,
    pub today: Vec<Todo>,
    pub overdue: Vec<Todo>,
}
