//! Database helpers for the user-record store.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;

/// Outcome when attempting to create a new user row.
#[derive(Debug)]
pub(crate) enum SignupOutcome {
    Created,
    Conflict,
}

/// Third-party platforms a user account can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Platform {
    Qq,
    Netease,
}

impl Platform {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "qq" => Some(Self::Qq),
            "netease" => Some(Self::Netease),
            _ => None,
        }
    }
}

/// Full user row as read back for login and profile responses.
#[derive(Debug, Clone)]
pub(crate) struct UserRecord {
    pub(crate) id: i64,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) passwd_hash: String,
    pub(crate) qq_id: Option<String>,
    pub(crate) netease_id: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        passwd_hash: row.get("passwd_hash"),
        qq_id: row.get("qq_id"),
        netease_id: row.get("netease_id"),
        created_at: row.get("created_at"),
    }
}

const USER_COLUMNS: &str = "id, username, email, passwd_hash, qq_id, netease_id, created_at";

pub(crate) async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<UserRecord>> {
    let query =
        format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by username")?;

    Ok(row.as_ref().map(user_from_row))
}

/// Insert a new user; a username unique violation maps to `Conflict` rather
/// than an error so handlers can answer 409 without racing a pre-check.
pub(crate) async fn create_user(
    pool: &PgPool,
    username: &str,
    passwd_hash: &str,
    email: &str,
) -> Result<SignupOutcome> {
    let query = "INSERT INTO users (username, passwd_hash, email) VALUES ($1, $2, $3)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(username)
        .bind(passwd_hash)
        .bind(email)
        .execute(pool)
        .instrument(span)
        .await
    {
        Ok(_) => Ok(SignupOutcome::Created),
        Err(err) if is_unique_violation(&err) => Ok(SignupOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// Replace the stored password hash; returns `false` when the user is gone.
pub(crate) async fn update_password(pool: &PgPool, id: i64, passwd_hash: &str) -> Result<bool> {
    let query = "UPDATE users SET passwd_hash = $2 WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .bind(passwd_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password")?;

    Ok(result.rows_affected() > 0)
}

/// Link a third-party platform id to the user, leaving the other platform column alone.
pub(crate) async fn bind_platform(
    pool: &PgPool,
    id: i64,
    platform: Platform,
    platform_id: &str,
) -> Result<bool> {
    let query = match platform {
        Platform::Qq => "UPDATE users SET qq_id = $2 WHERE id = $1",
        Platform::Netease => "UPDATE users SET netease_id = $2 WHERE id = $1",
    };
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .bind(platform_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to bind platform id")?;

    Ok(result.rows_affected() > 0)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[test]
    fn platform_parse_accepts_known_values() {
        assert_eq!(Platform::parse("qq"), Some(Platform::Qq));
        assert_eq!(Platform::parse("netease"), Some(Platform::Netease));
        assert_eq!(Platform::parse("spotify"), None);
        assert_eq!(Platform::parse(""), None);
    }

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }
}
