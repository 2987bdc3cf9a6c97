use chrono::{Duration, NaiveDate};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StreakSummary {
    pub current_streak: i32,
    pub longest_streak: i32,
    pub active_today: bool,
    pub last_active: Option<NaiveDate>,
}

/// Distinct days with any activity, newest first.
///
/// Sources: journal entry dates, completion dates of completed todos, and
/// every non-login activity log row.
pub async fn activity_dates(db: &SqlitePool, user_id: Uuid) -> Result<Vec<NaiveDate>, sqlx::Error> {
    sqlx::query_scalar::<_, NaiveDate>(
        r#"
        SELECT entry_date AS day FROM journal_entries WHERE user_id = $1
        UNION
        SELECT date(completed_at, 'localtime') AS day FROM todos
        WHERE user_id = $1 AND completed = 1 AND completed_at IS NOT NULL
        UNION
        SELECT activity_date AS day FROM activity_log
        WHERE user_id = $1 AND activity_type <> 'login'
        ORDER BY day DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

pub async fn summary_for_user(
    db: &SqlitePool,
    user_id: Uuid,
    today: NaiveDate,
) -> Result<StreakSummary, sqlx::Error> {
    let dates = activity_dates(db, user_id).await?;
    Ok(summarize(&dates, today))
}

pub fn summarize(dates: &[NaiveDate], today: NaiveDate) -> StreakSummary {
    let mut sorted = dates.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();

    StreakSummary {
        current_streak: current_streak(&sorted, today),
        longest_streak: longest_streak(&sorted),
        active_today: sorted.contains(&today),
        last_active: sorted.iter().copied().find(|d| *d <= today),
    }
}

/// Consecutive active days ending today, or ending yesterday when nothing
/// has been recorded yet today. `dates` must be distinct and newest first.
pub fn current_streak(dates: &[NaiveDate], today: NaiveDate) -> i32 {
    let mut check_date = if dates.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };

    let mut streak = 0i32;
    for date in dates {
        if *date == check_date {
            streak += 1;
            check_date -= Duration::days(1);
        } else if *date < check_date {
            break;
        }
    }
    streak
}

/// Longest run of consecutive days. `dates` must be distinct, any order.
pub fn longest_streak(dates: &[NaiveDate]) -> i32 {
    let mut ascending = dates.to_vec();
    ascending.sort_unstable();

    let mut longest = 0i32;
    let mut run = 0i32;
    let mut prev: Option<NaiveDate> = None;

    for date in &ascending {
        match prev {
            Some(p) if *date == p + Duration::days(1) => run += 1,
            Some(p) if *date == p => {}
            _ => {
                longest = longest.max(run);
                run = 1;
            }
        }
        prev = Some(*date);
    }
    longest.max(run)
}
