use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::activity::ActivityType;
use crate::services::local_today;

/// Append a row to the activity log, dated today.
pub async fn log_activity(
    db: &SqlitePool,
    user_id: Uuid,
    activity_type: ActivityType,
    detail: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO activity_log (id, user_id, activity_type, activity_date, detail, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(activity_type)
    .bind(local_today())
    .bind(detail)
    .bind(Utc::now())
    .execute(db)
    .await?;

    tracing::debug!(user_id = %user_id, activity = ?activity_type, "Activity logged");
    Ok(())
}
