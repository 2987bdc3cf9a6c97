use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum GoalType {
    #[default]
    ShortTerm,
    LongTerm,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    #[default]
    Active,
    Completed,
    Paused,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Goal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub goal_type: GoalType,
    pub target_date: Option<NaiveDate>,
    pub progress: i32,
    pub status: GoalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GoalMilestone {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub title: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct GoalWithMilestones {
    #[serde(flatten)]
    pub goal: Goal,
    pub milestones_total: usize,
    pub milestones_completed: usize,
    pub milestones: Vec<GoalMilestone>,
}

impl GoalWithMilestones {
    pub fn new(goal: Goal, milestones: Vec<GoalMilestone>) -> Self {
        Self {
            milestones_total: milestones.len(),
            milestones_completed: milestones.iter().filter(|m| m.completed).count(),
            goal,
            milestones,
        }
    }
}

/// Returned by milestone mutations so clients can refresh the progress bar.
#[derive(Debug, Serialize)]
pub struct MilestoneChange {
    pub milestone: Option<GoalMilestone>,
    pub goal_progress: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGoalRequest {
    #[serde(default)]
    #[validate(
        custom = "crate::extract::not_blank",
        length(max = 200, message = "Title must be under 200 characters")
    )]
    pub title: String,

    #[validate(length(max = 2000, message = "Description must be under 2000 characters"))]
    pub description: Option<String>,

    /// Defaults to `short-term`.
    pub goal_type: Option<GoalType>,

    pub target_date: Option<NaiveDate>,
}

/// PUT /api/goals/:id: partial update
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateGoalRequest {
    #[validate(
        custom = "crate::extract::not_blank",
        length(max = 200, message = "Title must be under 200 characters")
    )]
    pub title: Option<String>,

    #[validate(length(max = 2000, message = "Description must be under 2000 characters"))]
    pub description: Option<String>,

    pub goal_type: Option<GoalType>,

    pub target_date: Option<NaiveDate>,

    #[validate(range(min = 0, max = 100, message = "Progress must be between 0 and 100"))]
    pub progress: Option<i32>,

    pub status: Option<GoalStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MilestoneRequest {
    #[serde(default)]
    #[validate(
        custom = "crate::extract::not_blank",
        length(max = 200, message = "Title must be under 200 characters")
    )]
    pub title: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GoalQuery {
    pub status: Option<GoalStatus>,
    pub goal_type: Option<GoalType>,
}

/// Progress implied by milestones: `round(completed / total * 100)`.
///
/// `None` when the goal has no milestones; the stored progress is then kept.
pub fn milestone_progress(completed: i64, total: i64) -> Option<i32> {
    if total <= 0 {
        return None;
    }
    let ratio = completed.clamp(0, total) as f64 / total as f64;
    Some((ratio * 100.0).round() as i32)
}
