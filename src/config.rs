use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use rand::RngCore;

pub const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub frontend_url: Option<String>,

    pub session_secret: String,
    pub session_ttl_secs: i64,
    pub secure_cookies: bool,
    pub auth_rate_limit: u32,

    pub upload_dir: PathBuf,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,

    pub claude_api_key: String,
    pub claude_model: String,

    pub reminder_poll_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let session_secret = match env::var("SESSION_SECRET").ok().filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                tracing::warn!(
                    "SESSION_SECRET not set; generated an ephemeral secret, sessions will not survive a restart"
                );
                generate_secret()
            }
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://daybook.db".into()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 1)?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_var("PORT", 8080)?,
            frontend_url: env::var("FRONTEND_URL").ok().filter(|s| !s.is_empty()),

            session_secret,
            session_ttl_secs: parse_var("SESSION_TTL_SECS", 30 * 24 * 3600)?,
            secure_cookies: parse_var("SECURE_COOKIES", false)?,
            auth_rate_limit: parse_var("AUTH_RATE_LIMIT", 10)?,

            upload_dir: env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "uploads".into())
                .into(),
            static_dir: env::var("STATIC_DIR")
                .unwrap_or_else(|_| "public".into())
                .into(),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", 5 * 1024 * 1024)?,

            claude_api_key: env::var("CLAUDE_API_KEY").unwrap_or_default(),
            claude_model: env::var("CLAUDE_MODEL")
                .unwrap_or_else(|_| DEFAULT_CLAUDE_MODEL.into()),

            reminder_poll_secs: parse_var("REMINDER_POLL_SECS", 60)?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ai_enabled(&self) -> bool {
        !self.claude_api_key.is_empty()
    }
}

fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        _ => Ok(default),
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
impl Config {
    /// Configuration used by the router tests: in-memory database, no AI key.
    pub fn for_tests(upload_dir: PathBuf, static_dir: PathBuf) -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            db_max_connections: 1,
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: None,
            session_secret: "test-secret-test-secret-test-secret".into(),
            session_ttl_secs: 3600,
            secure_cookies: false,
            auth_rate_limit: 50,
            upload_dir,
            static_dir,
            max_upload_bytes: 1024 * 1024,
            claude_api_key: String::new(),
            claude_model: DEFAULT_CLAUDE_MODEL.into(),
            reminder_poll_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_secret_is_hex_64() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn test_parse_var_default_when_unset() {
        let value: u16 = parse_var("DAYBOOK_TEST_UNSET_VAR", 8080).unwrap();
        assert_eq!(value, 8080);
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("DAYBOOK_TEST_BAD_PORT", "eighty");
        let result: anyhow::Result<u16> = parse_var("DAYBOOK_TEST_BAD_PORT", 8080);
        assert!(result.is_err());
        env::remove_var("DAYBOOK_TEST_BAD_PORT");
    }

    #[test]
    fn test_listen_addr() {
        let config = Config::for_tests("uploads".into(), "public".into());
        assert_eq!(config.listen_addr(), "127.0.0.1:0");
        assert!(!config.ai_enabled());
    }
}
