//! SQLite adapter for errors returned by the sqlx `sqlite` driver
//!
//! sqlx reports the extended result code of the failing statement, so a
//! single lookup decides the classification. Unique, primary-key and check
//! failures are all reported as conflicts; this adapter does not single out
//! duplicates. Contention is matched on the primary code, so every busy and
//! locked variant (`SQLITE_BUSY_SNAPSHOT`, `SQLITE_LOCKED_SHAREDCACHE`, ...)
//! is retryable.

use crate::error::{Classified, ErrorKind, Retryable};
use sqlx::error::DatabaseError;
use sqlx::sqlite::SqliteError;
use std::fmt;
use tracing::trace;

pub const SQLITE_BUSY: i32 = 5;
pub const SQLITE_LOCKED: i32 = 6;
pub const SQLITE_CONSTRAINT_CHECK: i32 = 275;
pub const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;
pub const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

const CONFLICT_CODES: &[i32] = &[
    SQLITE_CONSTRAINT_CHECK,
    SQLITE_CONSTRAINT_PRIMARYKEY,
    SQLITE_CONSTRAINT_UNIQUE,
];

// Compared against the primary code (low byte of the extended code).
const RETRYABLE_CODES: &[i32] = &[SQLITE_LOCKED, SQLITE_BUSY];

/// Map an extended SQLite result code to its classification.
pub fn classify_code(code: i32) -> ErrorKind {
    if CONFLICT_CODES.contains(&code) {
        ErrorKind::Conflict
    } else if RETRYABLE_CODES.contains(&(code & 0xff)) {
        ErrorKind::Retryable
    } else {
        ErrorKind::Unclassified
    }
}

/// Normalized error for the sqlx SQLite backend
#[derive(Debug)]
pub struct Error {
    resource: String,
    kind: ErrorKind,
    source: sqlx::Error,
}

impl Error {
    pub fn new(resource: impl Into<String>, err: sqlx::Error) -> Self {
        let resource = resource.into();
        let code = extended_code(&err);
        let kind = match (&err, code) {
            (sqlx::Error::RowNotFound, _) => ErrorKind::NotFound,
            (_, Some(code)) => classify_code(code),
            (_, None) => ErrorKind::Unclassified,
        };

        trace!(resource = %resource, kind = %kind, code, "classified sqlite error");

        Self {
            resource,
            kind,
            source: err,
        }
    }

    /// The original driver error
    pub fn inner(&self) -> &sqlx::Error {
        &self.source
    }

    pub fn into_inner(self) -> sqlx::Error {
        self.source
    }
}

fn extended_code(err: &sqlx::Error) -> Option<i32> {
    let db = err.as_database_error()?.try_downcast_ref::<SqliteError>()?;
    db.code()?.parse().ok()
}

/// Classify an optional driver error; `None` stays `None`.
pub fn new_error(resource: impl Into<String>, err: Option<sqlx::Error>) -> Option<Error> {
    err.map(|err| Error::new(resource, err))
}

/// Adapter for `Result::map_err`.
pub fn with_resource(resource: &str) -> impl FnOnce(sqlx::Error) -> Error + '_ {
    move |err| Error::new(resource, err)
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_not_found() {
            return write!(f, "{} not found", self.resource);
        }
        fmt::Display::fmt(&self.source, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl Classified for Error {
    fn resource(&self) -> &str {
        &self.resource
    }

    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl Retryable for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::{Connection, SqliteConnection};

    async fn connect() -> SqliteConnection {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                age INTEGER CHECK (age >= 0)
            )",
        )
        .execute(&mut conn)
        .await
        .unwrap();
        conn
    }

    #[test]
    fn test_classify_code() {
        assert_eq!(classify_code(SQLITE_CONSTRAINT_UNIQUE), ErrorKind::Conflict);
        assert_eq!(classify_code(SQLITE_CONSTRAINT_PRIMARYKEY), ErrorKind::Conflict);
        assert_eq!(classify_code(SQLITE_CONSTRAINT_CHECK), ErrorKind::Conflict);
        assert_eq!(classify_code(SQLITE_LOCKED), ErrorKind::Retryable);
        assert_eq!(classify_code(SQLITE_BUSY), ErrorKind::Retryable);
        // BUSY_RECOVERY, BUSY_SNAPSHOT, BUSY_TIMEOUT, LOCKED_SHAREDCACHE
        for code in [261, 517, 773, 262] {
            assert_eq!(classify_code(code), ErrorKind::Retryable, "{code}");
        }
        // SQLITE_CONSTRAINT, SQLITE_IOERR_READ
        assert_eq!(classify_code(19), ErrorKind::Unclassified);
        assert_eq!(classify_code(266), ErrorKind::Unclassified);
        // SQLITE_CONSTRAINT_NOTNULL, SQLITE_CONSTRAINT_FOREIGNKEY
        assert_eq!(classify_code(1299), ErrorKind::Unclassified);
        assert_eq!(classify_code(787), ErrorKind::Unclassified);
    }

    #[test]
    fn test_row_not_found() {
        let err = Error::new("user", sqlx::Error::RowNotFound);

        assert!(err.not_found());
        assert!(!err.conflict());
        assert!(!err.retry());
        assert_eq!(err.to_string(), "user not found");
    }

    #[test]
    fn test_non_database_error_is_unclassified() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = Error::new("user", sqlx::Error::Io(io));

        assert_eq!(err.kind(), ErrorKind::Unclassified);
        assert!(!err.retry());
        assert!(err.to_string().contains("disk gone"));
        assert!(matches!(err.inner(), sqlx::Error::Io(_)));
    }

    #[test]
    fn test_none_stays_none() {
        assert!(new_error("user", None).is_none());
    }

    #[tokio::test]
    async fn test_unique_violation_is_conflict() {
        let mut conn = connect().await;
        let insert = "INSERT INTO users (email, age) VALUES ('a@example.com', 30)";

        sqlx::query(insert).execute(&mut conn).await.unwrap();
        let err = sqlx::query(insert)
            .execute(&mut conn)
            .await
            .map_err(with_resource("user"))
            .err()
            .unwrap();

        assert!(err.conflict());
        assert!(!err.not_found());
        assert!(!err.retry());
        assert!(err.to_string().contains("UNIQUE"), "{err}");
    }

    #[tokio::test]
    async fn test_primary_key_and_check_violations_are_conflicts() {
        let mut conn = connect().await;

        sqlx::query("INSERT INTO users (id, email) VALUES (1, 'a@example.com')")
            .execute(&mut conn)
            .await
            .unwrap();

        let err = sqlx::query("INSERT INTO users (id, email) VALUES (1, 'b@example.com')")
            .execute(&mut conn)
            .await
            .map_err(with_resource("user"))
            .err()
            .unwrap();
        assert!(err.conflict());

        let err = sqlx::query("INSERT INTO users (email, age) VALUES ('c@example.com', -1)")
            .execute(&mut conn)
            .await
            .map_err(with_resource("user"))
            .err()
            .unwrap();
        assert!(err.conflict());
    }

    #[tokio::test]
    async fn test_not_null_violation_is_unclassified() {
        let mut conn = connect().await;

        let err = sqlx::query("INSERT INTO users (age) VALUES (1)")
            .execute(&mut conn)
            .await
            .map_err(with_resource("user"))
            .err()
            .unwrap();

        assert_eq!(err.kind(), ErrorKind::Unclassified);
        assert!(!err.retry());
        assert!(!err.conflict());
        assert!(matches!(err.inner(), sqlx::Error::Database(_)));
    }

    #[tokio::test]
    async fn test_write_while_locked_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("jobs.db").display());

        let mut holder = SqliteConnection::connect(&url).await.unwrap();
        let mut writer = SqliteConnection::connect(&url).await.unwrap();

        sqlx::query("CREATE TABLE jobs (id INTEGER PRIMARY KEY)")
            .execute(&mut holder)
            .await
            .unwrap();
        sqlx::query("PRAGMA busy_timeout = 0")
            .execute(&mut writer)
            .await
            .unwrap();
        sqlx::query("BEGIN EXCLUSIVE")
            .execute(&mut holder)
            .await
            .unwrap();

        let err = sqlx::query("INSERT INTO jobs (id) VALUES (1)")
            .execute(&mut writer)
            .await
            .map_err(with_resource("job"))
            .err()
            .unwrap();

        assert!(err.retry(), "{err}");
        assert!(!err.conflict());
        assert!(!err.not_found());
        assert!(matches!(err.inner(), sqlx::Error::Database(_)));

        sqlx::query("ROLLBACK").execute(&mut holder).await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_one_without_rows_is_not_found() {
        let mut conn = connect().await;

        let err = sqlx::query("SELECT id FROM users WHERE email = 'nobody'")
            .fetch_one(&mut conn)
            .await
            .map_err(with_resource("user"))
            .err()
            .unwrap();

        assert!(err.not_found());
        assert_eq!(err.to_string(), "user not found");
    }
}
