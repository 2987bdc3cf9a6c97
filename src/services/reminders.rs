use std::collections::HashSet;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde_json::json;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::notification::{Notification, NotificationKind, NotificationSettings};
use crate::services::ai::quote_of_the_day;

/// Pending todo counts relative to a given day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TodoLoad {
    pub pending_today: i64,
    pub overdue: i64,
}

pub async fn todo_load(db: &SqlitePool, user_id: Uuid, today: NaiveDate) -> Result<TodoLoad, sqlx::Error> {
    let (pending_today, overdue) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN scheduled_date = $2 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN scheduled_date < $2 THEN 1 ELSE 0 END), 0)
        FROM todos
        WHERE user_id = $1 AND completed = 0
        "#,
    )
    .bind(user_id)
    .bind(today)
    .fetch_one(db)
    .await?;

    Ok(TodoLoad { pending_today, overdue })
}

/// Notifications that apply to a user right now. Read-only.
pub async fn build_notifications(
    db: &SqlitePool,
    user_id: Uuid,
    settings: &NotificationSettings,
    today: NaiveDate,
) -> Result<Vec<Notification>, sqlx::Error> {
    let load = todo_load(db, user_id, today).await?;
    let mut notifications = Vec::new();

    if load.overdue > 0 {
        let titles = sqlx::query_scalar::<_, String>(
            r#"
            SELECT title FROM todos
            WHERE user_id = $1 AND completed = 0 AND scheduled_date < $2
            ORDER BY scheduled_date ASC
            LIMIT 3
            "#,
        )
        .bind(user_id)
        .bind(today)
        .fetch_all(db)
        .await?;

        notifications.push(Notification {
            kind: NotificationKind::OverdueTodos,
            title: format!("{} overdue todo{}", load.overdue, plural(load.overdue)),
            body: titles.join(", "),
        });
    }

    if load.pending_today > 0 && load.pending_today >= i64::from(settings.pending_threshold) {
        notifications.push(Notification {
            kind: NotificationKind::PendingTodos,
            title: format!("{} todo{} left today", load.pending_today, plural(load.pending_today)),
            body: "Pick the most important one and finish it next.".to_string(),
        });
    }

    if settings.motivation_enabled {
        let quote = quote_of_the_day(today);
        let body = match quote.author {
            Some(author) => format!("\"{}\" ({})", quote.text, author),
            None => quote.text,
        };
        notifications.push(Notification {
            kind: NotificationKind::Motivation,
            title: "Daily motivation".to_string(),
            body,
        });
    }

    Ok(notifications)
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Wire format pushed to `/ws` subscribers; the socket filters on `user_id`.
pub fn notification_message(user_id: Uuid, notification: &Notification) -> String {
    json!({
        "type": "notification",
        "user_id": user_id.to_string(),
        "notification": notification,
    })
    .to_string()
}

/// Fires scheduled reminders. Each (user, slot) fires at most once, and a
/// slot is caught even when polls straddle its minute.
pub struct ReminderWorker {
    db: SqlitePool,
    tx: broadcast::Sender<String>,
    last_tick: Option<NaiveDateTime>,
    fired: HashSet<(Uuid, NaiveDateTime)>,
}

impl ReminderWorker {
    pub fn new(db: SqlitePool, tx: broadcast::Sender<String>) -> Self {
        Self {
            db,
            tx,
            last_tick: None,
            fired: HashSet::new(),
        }
    }

    /// Run one poll at local time `now`, firing every slot since the previous
    /// poll. Returns how many messages were published.
    pub async fn tick(&mut self, now: NaiveDateTime) -> Result<usize, sqlx::Error> {
        let after = self.last_tick;
        let horizon = after.filter(|a| *a <= now).unwrap_or(now) - chrono::Duration::minutes(1);
        self.fired.retain(|(_, slot)| *slot > horizon);

        let all: Vec<NotificationSettings> = sqlx::query_as::<_, NotificationSettings>(
            "SELECT * FROM notification_settings WHERE reminder_enabled = 1",
        )
        .fetch_all(&self.db)
        .await?;
        self.last_tick = Some(now);

        let mut sent = 0;
        for settings in all {
            for slot in settings.due_slots(after, now) {
                if !self.fired.insert((settings.user_id, slot)) {
                    continue;
                }

                let notifications =
                    build_notifications(&self.db, settings.user_id, &settings, slot.date()).await?;
                for notification in &notifications {
                    tracing::info!(
                        user_id = %settings.user_id,
                        slot = %slot,
                        kind = ?notification.kind,
                        title = %notification.title,
                        "Reminder fired"
                    );
                    if self
                        .tx
                        .send(notification_message(settings.user_id, notification))
                        .is_err()
                    {
                        tracing::debug!(user_id = %settings.user_id, "No WebSocket subscribers for reminder");
                    }
                    sent += 1;
                }
            }
        }
        Ok(sent)
    }
}

pub fn spawn_reminder_worker(db: SqlitePool, tx: broadcast::Sender<String>, poll_secs: u64) {
    tokio::spawn(async move {
        let mut worker = ReminderWorker::new(db, tx);
        let mut interval = tokio::time::interval(Duration::from_secs(poll_secs.max(1)));
        loop {
            interval.tick().await;
            if let Err(e) = worker.tick(Local::now().naive_local()).await {
                tracing::error!(error = %e, "Reminder worker error");
            }
        }
    });
}
