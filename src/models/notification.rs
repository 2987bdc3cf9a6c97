use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use uuid::Uuid;
use validator::{Validate, ValidationError};

pub const DEFAULT_REMINDER_TIMES: [&str; 2] = ["09:00", "20:00"];
pub const DEFAULT_PENDING_THRESHOLD: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationSettings {
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub reminder_enabled: bool,
    pub reminder_times: Json<Vec<String>>,
    pub motivation_enabled: bool,
    pub pending_threshold: i32,
    pub updated_at: DateTime<Utc>,
}

impl NotificationSettings {
    pub fn defaults(user_id: Uuid) -> Self {
        Self {
            user_id,
            reminder_enabled: true,
            reminder_times: Json(DEFAULT_REMINDER_TIMES.iter().map(|t| t.to_string()).collect()),
            motivation_enabled: true,
            pending_threshold: DEFAULT_PENDING_THRESHOLD,
            updated_at: Utc::now(),
        }
    }

    /// Reminder slots whose minute overlaps the window `(after, now]`.
    ///
    /// With no previous poll only the minute containing `now` is considered.
    /// The window never reaches back more than a day.
    pub fn due_slots(&self, after: Option<NaiveDateTime>, now: NaiveDateTime) -> Vec<NaiveDateTime> {
        if !self.reminder_enabled {
            return Vec::new();
        }
        let lower = after
            .filter(|a| *a <= now)
            .unwrap_or(now)
            .max(now - Duration::days(1));
        let times: Vec<NaiveTime> = self
            .reminder_times
            .iter()
            .filter_map(|t| NaiveTime::parse_from_str(t, "%H:%M").ok())
            .collect();

        let mut slots = Vec::new();
        for date in (lower - Duration::minutes(1))
            .date()
            .iter_days()
            .take_while(|d| *d <= now.date())
        {
            for time in &times {
                let slot = date.and_time(*time);
                if slot <= now && slot + Duration::minutes(1) > lower {
                    slots.push(slot);
                }
            }
        }
        slots.sort();
        slots
    }
}

/// PUT /api/notifications/settings: partial update
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    pub reminder_enabled: Option<bool>,

    #[validate(custom = "reminder_times_valid")]
    pub reminder_times: Option<Vec<String>>,

    pub motivation_enabled: Option<bool>,

    #[validate(range(min = 1, max = 100, message = "Threshold must be between 1 and 100"))]
    pub pending_threshold: Option<i32>,
}

fn reminder_times_valid(times: &[String]) -> Result<(), ValidationError> {
    if times.len() > 24 {
        let mut err = ValidationError::new("too_many");
        err.message = Some("At most 24 reminder times are allowed".into());
        return Err(err);
    }
    if let Some(bad) = times.iter().find(|t| parse_reminder_time(t).is_none()) {
        let mut err = ValidationError::new("time_format");
        err.message = Some(format!("Invalid time {bad:?}, expected HH:MM").into());
        return Err(err);
    }
    Ok(())
}

/// Parses `HH:MM`, rejecting anything chrono would accept loosely (`9:5`).
pub fn parse_reminder_time(raw: &str) -> Option<NaiveTime> {
    if raw.len() != 5 {
        return None;
    }
    NaiveTime::parse_from_str(raw, "%H:%M").ok()
}

/// Normalise, de-duplicate and sort reminder times.
pub fn normalize_reminder_times(times: &[String]) -> Vec<String> {
    let mut parsed: Vec<NaiveTime> = times.iter().filter_map(|t| parse_reminder_time(t)).collect();
    parsed.sort();
    parsed.dedup();
    parsed.iter().map(|t| t.format("%H:%M").to_string()).collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OverdueTodos,
    PendingTodos,
    Motivation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
}
