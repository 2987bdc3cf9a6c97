use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

pub const SESSION_COOKIE: &str = "daybook_session";

/// Claims carried by the session cookie. `sid` names the `sessions` row that
/// must still be live for the token to be accepted.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub sid: Uuid,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug)]
pub struct IssuedSession {
    pub session_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub fn create_session_token(
    user_id: Uuid,
    session_id: Uuid,
    config: &Config,
) -> AppResult<(String, DateTime<Utc>)> {
    let now = Utc::now();
    let expires_at = now + Duration::seconds(config.session_ttl_secs);
    let claims = Claims {
        sub: user_id,
        sid: session_id,
        exp: expires_at.timestamp(),
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.session_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create session token: {}", e)))?;

    Ok((token, expires_at))
}

/// SHA-256 of a raw token, lowercase hex. Only the hash is persisted.
pub fn hash_token(raw_token: &str) -> String {
    hex::encode(Sha256::digest(raw_token.as_bytes()))
}

pub fn verify_token(token: &str, config: &Config) -> AppResult<TokenData<Claims>> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.session_secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AppError::Unauthorized)
}

/// Persist a new session row and sign its cookie token.
pub async fn start_session(db: &SqlitePool, user_id: Uuid, config: &Config) -> AppResult<IssuedSession> {
    let session_id = Uuid::new_v4();
    let (token, expires_at) = create_session_token(user_id, session_id, config)?;

    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, token_hash, expires_at, revoked, created_at)
        VALUES ($1, $2, $3, $4, 0, $5)
        "#,
    )
    .bind(session_id)
    .bind(user_id)
    .bind(hash_token(&token))
    .bind(expires_at)
    .bind(Utc::now())
    .execute(db)
    .await?;

    tracing::debug!(user_id = %user_id, session_id = %session_id, "Session started");

    Ok(IssuedSession {
        session_id,
        token,
        expires_at,
    })
}

/// Check that the session named by the token is live and belongs to it.
pub async fn ensure_session_live(db: &SqlitePool, claims: &Claims, raw_token: &str) -> AppResult<()> {
    let stored = sqlx::query_as::<_, (Uuid, String, bool, DateTime<Utc>)>(
        "SELECT user_id, token_hash, revoked, expires_at FROM sessions WHERE id = $1",
    )
    .bind(claims.sid)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::Unauthorized)?;

    let (user_id, token_hash, revoked, expires_at) = stored;
    if revoked || user_id != claims.sub || expires_at <= Utc::now() {
        return Err(AppError::Unauthorized);
    }
    if token_hash != hash_token(raw_token) {
        tracing::warn!(user_id = %user_id, session_id = %claims.sid, "Session token hash mismatch");
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

pub async fn revoke_session(db: &SqlitePool, session_id: Uuid) -> AppResult<()> {
    sqlx::query("UPDATE sessions SET revoked = 1 WHERE id = $1")
        .bind(session_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Revoke every session of a user except `keep`.
pub async fn revoke_other_sessions(db: &SqlitePool, user_id: Uuid, keep: Uuid) -> AppResult<u64> {
    let result = sqlx::query(
        "UPDATE sessions SET revoked = 1 WHERE user_id = $1 AND id <> $2 AND revoked = 0",
    )
    .bind(user_id)
    .bind(keep)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

pub fn session_cookie(token: String, config: &Config) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies)
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}
