//! PostgreSQL adapter for errors returned by the sqlx `postgres` driver
//!
//! PostgreSQL reports a SQLSTATE code fine-grained enough to tell a
//! unique violation apart from other integrity failures, so this adapter
//! sets `exists` for duplicates and keeps `conflict` for foreign keys.
//!
//! It is also the most verbose adapter: every diagnostic field the server
//! sent is kept and rendered into the error message, which makes it the
//! one to read when debugging a failed statement.

use crate::error::{Classified, ErrorKind, Exists};
use sqlx::postgres::{PgDatabaseError, PgErrorPosition};
use std::fmt;
use tracing::trace;

/// SQLSTATE `case_not_found`
pub const CASE_NOT_FOUND: &str = "20000";

/// SQLSTATE `foreign_key_violation`
pub const FOREIGN_KEY_VIOLATION: &str = "23503";

/// SQLSTATE `unique_violation`
pub const UNIQUE_VIOLATION: &str = "23505";

/// Map a SQLSTATE code to its classification.
pub fn classify_code(code: &str) -> ErrorKind {
    match code {
        CASE_NOT_FOUND => ErrorKind::NotFound,
        UNIQUE_VIOLATION => ErrorKind::Exists,
        FOREIGN_KEY_VIOLATION => ErrorKind::Conflict,
        _ => ErrorKind::Unclassified,
    }
}

/// Owned copy of the diagnostic fields of a [`PgDatabaseError`].
///
/// Optional fields the server left out are `None`; empty strings are
/// treated the same way when rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Upper-case severity, e.g. `ERROR` or `FATAL`.
    pub severity: String,
    /// Primary human-readable message.
    pub message: String,
    /// SQLSTATE code.
    pub code: String,
    pub constraint: Option<String>,
    pub column: Option<String>,
    /// Cursor position into the original query string.
    pub position: Option<usize>,
    pub table: Option<String>,
    pub hint: Option<String>,
    pub detail: Option<String>,
    /// Text of an internally generated query that failed.
    pub internal_query: Option<String>,
    pub data_type_name: Option<String>,
    /// Call stack context, the `where` field of the protocol.
    pub context: Option<String>,
    pub schema: Option<String>,
}

impl Diagnostics {
    /// Non-empty fields as `(key, value)` pairs, in rendering order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let position = self.position.map(|p| p.to_string());
        let fields = [
            ("severity", Some(self.severity.as_str())),
            ("err", Some(self.message.as_str())),
            ("code", Some(self.code.as_str())),
            ("constraint", self.constraint.as_deref()),
            ("column", self.column.as_deref()),
            ("position", position.as_deref()),
            ("table", self.table.as_deref()),
            ("hint", self.hint.as_deref()),
            ("detail", self.detail.as_deref()),
            ("internal_query", self.internal_query.as_deref()),
            ("data_type_name", self.data_type_name.as_deref()),
            ("where", self.context.as_deref()),
            ("schema", self.schema.as_deref()),
        ];

        fields
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .filter(|v| !v.is_empty())
                    .map(|v| (key, v.to_owned()))
            })
            .collect()
    }
}

impl From<&PgDatabaseError> for Diagnostics {
    fn from(err: &PgDatabaseError) -> Self {
        let (position, internal_query) = match err.position() {
            Some(PgErrorPosition::Original(position)) => (Some(position), None),
            Some(PgErrorPosition::Internal { query, .. }) => (None, Some(query.to_owned())),
            None => (None, None),
        };

        Self {
            severity: format!("{:?}", err.severity()).to_uppercase(),
            message: err.message().to_owned(),
            code: err.code().to_owned(),
            constraint: err.constraint().map(str::to_owned),
            column: err.column().map(str::to_owned),
            position,
            table: err.table().map(str::to_owned),
            hint: err.hint().map(str::to_owned),
            detail: err.detail().map(str::to_owned),
            internal_query,
            data_type_name: err.data_type().map(str::to_owned),
            context: err.r#where().map(str::to_owned),
            schema: err.schema().map(str::to_owned),
        }
    }
}

/// Normalized error for the PostgreSQL backend
#[derive(Debug)]
pub struct Error {
    resource: String,
    kind: ErrorKind,
    diagnostics: Option<Diagnostics>,
    source: sqlx::Error,
}

impl Error {
    /// Classify a driver error.
    ///
    /// `RowNotFound` short-circuits to `not_found` without inspecting the
    /// error further. Database errors raised by PostgreSQL are classified
    /// by SQLSTATE and their diagnostics captured; anything else is left
    /// unclassified.
    pub fn new(resource: impl Into<String>, err: sqlx::Error) -> Self {
        let resource = resource.into();

        if matches!(err, sqlx::Error::RowNotFound) {
            return Self::with_diagnostics(resource, ErrorKind::NotFound, None, err);
        }

        let diagnostics = err
            .as_database_error()
            .and_then(|db| db.try_downcast_ref::<PgDatabaseError>())
            .map(Diagnostics::from);
        let kind = diagnostics
            .as_ref()
            .map_or(ErrorKind::Unclassified, |d| classify_code(&d.code));

        Self::with_diagnostics(resource, kind, diagnostics, err)
    }

    fn with_diagnostics(
        resource: String,
        kind: ErrorKind,
        diagnostics: Option<Diagnostics>,
        source: sqlx::Error,
    ) -> Self {
        trace!(
            resource = %resource,
            kind = %kind,
            code = diagnostics.as_ref().map(|d| d.code.as_str()),
            "classified postgres error"
        );

        Self {
            resource,
            kind,
            diagnostics,
            source,
        }
    }

    /// Diagnostics reported by the server, if the error came from it.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        self.diagnostics.as_ref()
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

        write!(f, "resource={:?}", self.resource)?;
        if let Some(diagnostics) = &self.diagnostics {
            for (key, value) in diagnostics.fields() {
                write!(f, " {key}={value:?}")?;
            }
        }
        write!(f, " {}", self.source)
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
