use std::path::Path;

use axum::{
    extract::{Multipart, Path as UrlPath, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
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
use crate::models::journal::{
    CreateEntryRequest, ImageInfo, JournalEntry, JournalEntryWithImages, JournalImage, JournalQuery,
    UpdateEntryRequest,
};
use crate::services::{activity::log_activity, local_today};
use crate::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;
const IMAGE_FIELD: &str = "images";
const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

async fn fetch_entry(db: &SqlitePool, user_id: Uuid, entry_id: Uuid) -> AppResult<JournalEntry> {
    sqlx::query_as::<_, JournalEntry>("SELECT * FROM journal_entries WHERE id = $1 AND user_id = $2")
        .bind(entry_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("Journal entry"))
}

async fn images_for(db: &SqlitePool, entry_id: Uuid) -> Result<Vec<JournalImage>, sqlx::Error> {
    sqlx::query_as::<_, JournalImage>(
        "SELECT * FROM journal_images WHERE entry_id = $1 ORDER BY created_at ASC",
    )
    .bind(entry_id)
    .fetch_all(db)
    .await
}

pub(crate) async fn with_images(db: &SqlitePool, entry: JournalEntry) -> AppResult<JournalEntryWithImages> {
    let images = images_for(db, entry.id).await?;
    Ok(JournalEntryWithImages {
        entry,
        images: images.into_iter().map(ImageInfo::from).collect(),
    })
}

/// Best-effort removal of stored image files. Missing files are ignored.
pub(crate) async fn remove_image_files(upload_dir: &Path, filenames: &[String]) {
    for filename in filenames {
        let path = upload_dir.join(filename);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, path = %path.display(), "Failed to remove image file");
            }
        }
    }
}

/// Escape `LIKE` wildcards so search text matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub async fn list_entries(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<JournalQuery>,
) -> AppResult<Json<Vec<JournalEntryWithImages>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    let pattern = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", escape_like(q)));

    let entries = sqlx::query_as::<_, JournalEntry>(
        r#"
        SELECT * FROM journal_entries
        WHERE user_id = $1
          AND ($2 IS NULL OR entry_date >= $2)
          AND ($3 IS NULL OR entry_date <= $3)
          AND ($4 IS NULL OR mood = $4)
          AND ($5 IS NULL OR title LIKE $5 ESCAPE '\' OR content LIKE $5 ESCAPE '\')
        ORDER BY entry_date DESC, created_at DESC
        LIMIT $6 OFFSET $7
        "#,
    )
    .bind(auth_user.id)
    .bind(query.from)
    .bind(query.to)
    .bind(query.mood)
    .bind(pattern)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    let mut result = Vec::with_capacity(entries.len());
    for entry in entries {
        result.push(with_images(&state.db, entry).await?);
    }
    Ok(Json(result))
}

pub async fn create_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ValidatedJson(body): ValidatedJson<CreateEntryRequest>,
) -> AppResult<(StatusCode, Json<JournalEntryWithImages>)> {
    let now = Utc::now();
    let entry = JournalEntry {
        id: Uuid::new_v4(),
        user_id: auth_user.id,
        title: body.title.filter(|t| !t.trim().is_empty()),
        content: body.content,
        mood: body.mood.unwrap_or_default(),
        mood_note: body.mood_note,
        entry_date: body.entry_date.unwrap_or_else(local_today),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO journal_entries
            (id, user_id, title, content, mood, mood_note, entry_date, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(entry.id)
    .bind(entry.user_id)
    .bind(&entry.title)
    .bind(&entry.content)
    .bind(entry.mood)
    .bind(&entry.mood_note)
    .bind(entry.entry_date)
    .bind(entry.created_at)
    .bind(entry.updated_at)
    .execute(&state.db)
    .await?;

    log_activity(&state.db, auth_user.id, ActivityType::Journal, entry.title.as_deref()).await?;

    Ok((
        StatusCode::CREATED,
        Json(JournalEntryWithImages {
            entry,
            images: Vec::new(),
        }),
    ))
}

pub async fn get_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    UrlPath(id): UrlPath<Uuid>,
) -> AppResult<Json<JournalEntryWithImages>> {
    let entry = fetch_entry(&state.db, auth_user.id, id).await?;
    Ok(Json(with_images(&state.db, entry).await?))
}

pub async fn update_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    UrlPath(id): UrlPath<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateEntryRequest>,
) -> AppResult<Json<JournalEntryWithImages>> {
    let mut entry = fetch_entry(&state.db, auth_user.id, id).await?;

    if let Some(title) = body.title {
        entry.title = Some(title).filter(|t| !t.trim().is_empty());
    }
    if let Some(content) = body.content {
        entry.content = content;
    }
    if let Some(mood) = body.mood {
        entry.mood = mood;
    }
    if let Some(note) = body.mood_note {
        entry.mood_note = Some(note).filter(|n| !n.trim().is_empty());
    }
    if let Some(date) = body.entry_date {
        entry.entry_date = date;
    }
    entry.updated_at = Utc::now();

    sqlx::query(
        r#"
        UPDATE journal_entries
        SET title = $3, content = $4, mood = $5, mood_note = $6, entry_date = $7, updated_at = $8
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(entry.id)
    .bind(auth_user.id)
    .bind(&entry.title)
    .bind(&entry.content)
    .bind(entry.mood)
    .bind(&entry.mood_note)
    .bind(entry.entry_date)
    .bind(entry.updated_at)
    .execute(&state.db)
    .await?;

    Ok(Json(with_images(&state.db, entry).await?))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    UrlPath(id): UrlPath<Uuid>,
) -> AppResult<Json<Value>> {
    let entry = fetch_entry(&state.db, auth_user.id, id).await?;
    let filenames: Vec<String> = images_for(&state.db, entry.id)
        .await?
        .into_iter()
        .map(|img| img.filename)
        .collect();

    sqlx::query("DELETE FROM journal_entries WHERE id = $1 AND user_id = $2")
        .bind(entry.id)
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    remove_image_files(&state.config.upload_dir, &filenames).await;

    Ok(Json(json!({ "message": "Journal entry deleted" })))
}

struct PendingImage {
    original_name: String,
    extension: String,
    bytes: Vec<u8>,
}

/// Lowercased extension of `name` if it is an accepted image type.
fn image_extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

fn content_type_for(filename: &str) -> &'static str {
    match image_extension(filename).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Write every file, then insert all rows in one transaction. On any failure
/// the files written so far are removed and no rows remain.
async fn store_images(
    db: &SqlitePool,
    upload_dir: &Path,
    entry_id: Uuid,
    pending: Vec<PendingImage>,
) -> AppResult<Vec<ImageInfo>> {
    let mut written = Vec::with_capacity(pending.len());
    let result = write_and_record(db, upload_dir, entry_id, pending, &mut written).await;
    if result.is_err() {
        remove_image_files(upload_dir, &written).await;
    }
    result
}

async fn write_and_record(
    db: &SqlitePool,
    upload_dir: &Path,
    entry_id: Uuid,
    pending: Vec<PendingImage>,
    written: &mut Vec<String>,
) -> AppResult<Vec<ImageInfo>> {
    let mut records = Vec::with_capacity(pending.len());
    for image in pending {
        let record = JournalImage {
            id: Uuid::new_v4(),
            entry_id,
            filename: format!("{}.{}", Uuid::new_v4(), image.extension),
            original_name: image.original_name,
            created_at: Utc::now(),
        };

        written.push(record.filename.clone());
        tokio::fs::write(upload_dir.join(&record.filename), &image.bytes)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to save image: {e}")))?;
        records.push(record);
    }

    let mut tx = db.begin().await?;
    for record in &records {
        sqlx::query(
            r#"
            INSERT INTO journal_images (id, entry_id, filename, original_name, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id)
        .bind(record.entry_id)
        .bind(&record.filename)
        .bind(&record.original_name)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(records.into_iter().map(ImageInfo::from).collect())
}

/// POST /api/journal/:id/images
///
/// Multipart form with one or more `images` file fields. The whole upload is
/// rejected if any file has a disallowed type or exceeds the size limit.
pub async fn upload_images(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    UrlPath(id): UrlPath<Uuid>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Vec<ImageInfo>>)> {
    let entry = fetch_entry(&state.db, auth_user.id, id).await?;
    let max_bytes = state.config.max_upload_bytes;
    let mut pending = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read form field: {e}")))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let original_name = field.file_name().unwrap_or("image").to_string();
        let is_image = field
            .content_type()
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);
        let extension = image_extension(&original_name).filter(|_| is_image).ok_or_else(|| {
            AppError::BadRequest(format!(
                "{original_name}: only jpg, jpeg, png, gif and webp images are allowed"
            ))
        })?;

        let bytes = field
            .bytes()
            .await
            .map_err(|_| AppError::BadRequest("Failed to read image data".into()))?;
        if bytes.is_empty() {
            return Err(AppError::BadRequest(format!("{original_name} is empty")));
        }
        if bytes.len() > max_bytes {
            return Err(AppError::BadRequest(format!(
                "{original_name} is too large. Maximum size is {} KB",
                max_bytes / 1024
            )));
        }

        pending.push(PendingImage {
            original_name,
            extension,
            bytes: bytes.to_vec(),
        });
    }

    if pending.is_empty() {
        return Err(AppError::BadRequest(format!("No files in the '{IMAGE_FIELD}' field")));
    }

    tokio::fs::create_dir_all(&state.config.upload_dir)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create upload directory: {e}")))?;

    let saved = store_images(&state.db, &state.config.upload_dir, entry.id, pending).await?;

    tracing::debug!(user_id = %auth_user.id, entry_id = %entry.id, count = saved.len(), "Images uploaded");
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn delete_image(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    UrlPath((id, image_id)): UrlPath<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    let image = sqlx::query_as::<_, JournalImage>(
        r#"
        SELECT i.* FROM journal_images i
        JOIN journal_entries e ON e.id = i.entry_id
        WHERE i.id = $1 AND i.entry_id = $2 AND e.user_id = $3
        "#,
    )
    .bind(image_id)
    .bind(id)
    .bind(auth_user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Image"))?;

    sqlx::query("DELETE FROM journal_images WHERE id = $1")
        .bind(image.id)
        .execute(&state.db)
        .await?;

    remove_image_files(&state.config.upload_dir, &[image.filename]).await;

    Ok(Json(json!({ "message": "Image deleted" })))
}

/// GET /uploads/:filename, only for the owner of the entry the image belongs to.
pub async fn serve_image(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    UrlPath(filename): UrlPath<String>,
) -> AppResult<Response> {
    let owned = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM journal_images i
        JOIN journal_entries e ON e.id = i.entry_id
        WHERE i.filename = $1 AND e.user_id = $2
        "#,
    )
    .bind(&filename)
    .bind(auth_user.id)
    .fetch_one(&state.db)
    .await?;

    if owned == 0 {
        return Err(AppError::not_found("Image"));
    }

    let bytes = tokio::fs::read(state.config.upload_dir.join(&filename))
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, filename = %filename, "Image row without file");
            AppError::not_found("Image")
        })?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&filename)),
            (header::CACHE_CONTROL, "private, max-age=3600"),
        ],
        bytes,
    )
        .into_response())
}
