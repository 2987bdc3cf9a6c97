use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Great,
    Good,
    #[default]
    Okay,
    Bad,
    Awful,
}

impl Mood {
    pub const ALL: [Mood; 5] = [Mood::Great, Mood::Good, Mood::Okay, Mood::Bad, Mood::Awful];

    /// Numeric score used for trends: great = 5 down to awful = 1.
    pub fn score(self) -> i32 {
        match self {
            Mood::Great => 5,
            Mood::Good => 4,
            Mood::Okay => 3,
            Mood::Bad => 2,
            Mood::Awful => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mood::Great => "great",
            Mood::Good => "good",
            Mood::Okay => "okay",
            Mood::Bad => "bad",
            Mood::Awful => "awful",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JournalEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub content: String,
    pub mood: Mood,
    pub mood_note: Option<String>,
    pub entry_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JournalImage {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub filename: String,
    pub original_name: String,
    pub created_at: DateTime<Utc>,
}

/// Image metadata as returned to clients, with the URL it is served from.
#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub id: Uuid,
    pub filename: String,
    pub original_name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl From<JournalImage> for ImageInfo {
    fn from(img: JournalImage) -> Self {
        Self {
            url: format!("/uploads/{}", img.filename),
            id: img.id,
            filename: img.filename,
            original_name: img.original_name,
            created_at: img.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JournalEntryWithImages {
    #[serde(flatten)]
    pub entry: JournalEntry,
    pub images: Vec<ImageInfo>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEntryRequest {
    #[validate(length(max = 200, message = "Title must be under 200 characters"))]
    pub title: Option<String>,

    #[serde(default)]
    #[validate(
        custom = "crate::extract::not_blank",
        length(max = 100000, message = "Content is too long")
    )]
    pub content: String,

    /// Defaults to `okay`.
    pub mood: Option<Mood>,

    #[validate(length(max = 500, message = "Mood note must be under 500 characters"))]
    pub mood_note: Option<String>,

    /// Defaults to today.
    pub entry_date: Option<NaiveDate>,
}

/// PUT /api/journal/:id: partial update
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEntryRequest {
    #[validate(length(max = 200, message = "Title must be under 200 characters"))]
    pub title: Option<String>,

    #[validate(
        custom = "crate::extract::not_blank",
        length(max = 100000, message = "Content is too long")
    )]
    pub content: Option<String>,

    pub mood: Option<Mood>,

    #[validate(length(max = 500, message = "Mood note must be under 500 characters"))]
    pub mood_note: Option<String>,

    pub entry_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JournalQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub mood: Option<Mood>,
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
