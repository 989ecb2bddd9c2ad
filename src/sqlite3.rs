//! SQLite adapter for errors returned by `rusqlite`
//!
//! rusqlite exposes both the primary and the extended result code, so a
//! constraint failure narrowed to `SQLITE_CONSTRAINT_UNIQUE` is reported as
//! `exists` while every other constraint failure is a conflict.

use crate::error::{Classified, ErrorKind, Exists, Retryable};
use rusqlite::{ErrorCode, ffi};
use std::ffi::c_int;
use std::fmt;
use tracing::trace;

/// Map a primary/extended result code pair to its classification.
pub fn classify_code(code: ErrorCode, extended_code: c_int) -> ErrorKind {
    match code {
        ErrorCode::ConstraintViolation if extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE => {
            ErrorKind::Exists
        }
        ErrorCode::ConstraintViolation => ErrorKind::Conflict,
        ErrorCode::DatabaseLocked | ErrorCode::DatabaseBusy => ErrorKind::Retryable,
        _ => ErrorKind::Unclassified,
    }
}

/// Normalized error for the rusqlite backend
#[derive(Debug)]
pub struct Error {
    resource: String,
    kind: ErrorKind,
    source: rusqlite::Error,
}

impl Error {
    pub fn new(resource: impl Into<String>, err: rusqlite::Error) -> Self {
        let resource = resource.into();
        let kind = match &err {
            rusqlite::Error::QueryReturnedNoRows => ErrorKind::NotFound,
            rusqlite::Error::SqliteFailure(failure, _) => {
                classify_code(failure.code, failure.extended_code)
            }
            _ => ErrorKind::Unclassified,
        };

        trace!(resource = %resource, kind = %kind, "classified rusqlite error");

        Self {
            resource,
            kind,
            source: err,
        }
    }

    /// The original driver error
    pub fn inner(&self) -> &rusqlite::Error {
        &self.source
    }

    pub fn into_inner(self) -> rusqlite::Error {
        self.source
    }
}

/// Classify an optional driver error; `None` stays `None`.
pub fn new_error(resource: impl Into<String>, err: Option<rusqlite::Error>) -> Option<Error> {
    err.map(|err| Error::new(resource, err))
}

/// Adapter for `Result::map_err`.
pub fn with_resource(resource: &str) -> impl FnOnce(rusqlite::Error) -> Error + '_ {
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

impl Retryable for Error {}
