//! MySQL adapter for errors returned by the sqlx `mysql` driver

use crate::error::{Classified, ErrorKind, Exists};
use sqlx::mysql::MySqlDatabaseError;
use std::fmt;
use tracing::trace;

/// ER_DUP_ENTRY
pub const ER_DUP_ENTRY: u16 = 1062;

// MySQL's duplicate-entry number covers both unique and primary keys, so
// it is reported as a conflict and never as `exists`.
const CONFLICT_CODES: &[u16] = &[ER_DUP_ENTRY];

/// Map a MySQL server error number to its classification.
pub fn classify_code(number: u16) -> ErrorKind {
    if CONFLICT_CODES.contains(&number) {
        ErrorKind::Conflict
    } else {
        ErrorKind::Unclassified
    }
}

/// Normalized error for the MySQL backend
#[derive(Debug)]
pub struct Error {
    resource: String,
    kind: ErrorKind,
    source: sqlx::Error,
}

impl Error {
    pub fn new(resource: impl Into<String>, err: sqlx::Error) -> Self {
        let resource = resource.into();
        let kind = match &err {
            sqlx::Error::RowNotFound => ErrorKind::NotFound,
            _ => err
                .as_database_error()
                .and_then(|db| db.try_downcast_ref::<MySqlDatabaseError>())
                .map_or(ErrorKind::Unclassified, |db| classify_code(db.number())),
        };

        trace!(resource = %resource, kind = %kind, "classified mysql error");

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

impl Exists for Error {}
