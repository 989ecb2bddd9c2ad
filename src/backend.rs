//! Backend selection and runtime dispatch
//!
//! Lets a data-access layer pick the adapter from configuration (a backend
//! name or a connection URL) instead of naming an adapter module at every
//! call site.

use crate::error::{Classified, ConfigError, ErrorKind, Exists, Result, Retryable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[cfg(feature = "mysql")]
use crate::mysql;
#[cfg(feature = "postgres")]
use crate::postgres;
#[cfg(feature = "sqlite")]
use crate::sqlite;
#[cfg(feature = "sqlite3")]
use crate::sqlite3;

/// The database backend a data-access layer is talking to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// MySQL or MariaDB through sqlx
    #[serde(alias = "mariadb")]
    Mysql,

    /// PostgreSQL through sqlx
    #[serde(alias = "postgresql")]
    Postgres,

    /// SQLite through sqlx
    Sqlite,

    /// SQLite through rusqlite
    #[serde(alias = "rusqlite")]
    Sqlite3,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
            Self::Sqlite3 => "sqlite3",
        }
    }

    /// Whether the adapter for this backend was compiled in.
    pub fn is_enabled(self) -> bool {
        match self {
            Self::Mysql => cfg!(feature = "mysql"),
            Self::Postgres => cfg!(feature = "postgres"),
            Self::Sqlite => cfg!(feature = "sqlite"),
            Self::Sqlite3 => cfg!(feature = "sqlite3"),
        }
    }

    /// Infer the backend from a connection URL.
    ///
    /// Recognizes the schemes sqlx accepts: `mysql://`, `mariadb://`,
    /// `postgres://`, `postgresql://` and `sqlite:` (including
    /// `sqlite::memory:`). A rusqlite connection has no URL, so
    /// [`Backend::Sqlite3`] is never inferred.
    ///
    /// # Examples
    ///
    /// ```
    /// use dberrors::Backend;
    ///
    /// assert_eq!(Backend::from_url("postgres://localhost/app").unwrap(), Backend::Postgres);
    /// assert_eq!(Backend::from_url("sqlite::memory:").unwrap(), Backend::Sqlite);
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or_else(|| ConfigError::UnrecognizedUrl(url.to_string()))?;

        match scheme.as_str() {
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(ConfigError::UnrecognizedUrl(url.to_string())),
        }
    }

    /// Classify a driver error with the adapter for this backend.
    ///
    /// rusqlite errors only narrow in the rusqlite adapter, so they are
    /// classified there whatever the configured backend. A sqlx error under
    /// [`Backend::Sqlite3`] (or under a backend whose feature is disabled)
    /// does not narrow and comes back as [`AnyError::Unclassified`].
    pub fn classify(self, resource: impl Into<String>, err: impl Into<DriverError>) -> AnyError {
        let resource = resource.into();

        match err.into() {
            #[cfg(feature = "sqlite3")]
            DriverError::Rusqlite(err) => AnyError::Sqlite3(sqlite3::Error::new(resource, err)),

            #[cfg(any(feature = "sqlite", feature = "postgres", feature = "mysql"))]
            DriverError::Sqlx(err) => match self {
                #[cfg(feature = "mysql")]
                Self::Mysql => AnyError::Mysql(mysql::Error::new(resource, err)),
                #[cfg(feature = "postgres")]
                Self::Postgres => AnyError::Postgres(postgres::Error::new(resource, err)),
                #[cfg(feature = "sqlite")]
                Self::Sqlite => AnyError::Sqlite(sqlite::Error::new(resource, err)),
                _ => AnyError::Unclassified {
                    resource,
                    source: err,
                },
            },
        }
    }

    /// Nil-preserving form of [`Backend::classify`].
    pub fn new_error<E: Into<DriverError>>(
        self,
        resource: impl Into<String>,
        err: Option<E>,
    ) -> Option<AnyError> {
        err.map(|err| self.classify(resource, err))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            "sqlite3" | "rusqlite" => Ok(Self::Sqlite3),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

/// A raw error from one of the supported drivers
#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    #[cfg(any(feature = "sqlite", feature = "postgres", feature = "mysql"))]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    #[cfg(feature = "sqlite3")]
    Rusqlite(#[from] rusqlite::Error),
}

/// Normalized error from whichever adapter handled the driver error
#[derive(Error, Debug)]
pub enum AnyError {
    #[error(transparent)]
    #[cfg(feature = "mysql")]
    Mysql(mysql::Error),

    #[error(transparent)]
    #[cfg(feature = "postgres")]
    Postgres(postgres::Error),

    #[error(transparent)]
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::Error),

    #[error(transparent)]
    #[cfg(feature = "sqlite3")]
    Sqlite3(sqlite3::Error),

    /// A sqlx error under a backend whose adapter does not use sqlx.
    #[error("{source}")]
    #[cfg(any(feature = "sqlite", feature = "postgres", feature = "mysql"))]
    Unclassified {
        resource: String,
        source: sqlx::Error,
    },
}

impl AnyError {
    /// The backend whose adapter classified this error, if any did.
    pub fn backend(&self) -> Option<Backend> {
        match self {
            #[cfg(feature = "mysql")]
            Self::Mysql(_) => Some(Backend::Mysql),
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => Some(Backend::Postgres),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => Some(Backend::Sqlite),
            #[cfg(feature = "sqlite3")]
            Self::Sqlite3(_) => Some(Backend::Sqlite3),
            #[cfg(any(feature = "sqlite", feature = "postgres", feature = "mysql"))]
            Self::Unclassified { .. } => None,
        }
    }
}

impl Classified for AnyError {
    fn resource(&self) -> &str {
        match self {
            #[cfg(feature = "mysql")]
            Self::Mysql(err) => err.resource(),
            #[cfg(feature = "postgres")]
            Self::Postgres(err) => err.resource(),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(err) => err.resource(),
            #[cfg(feature = "sqlite3")]
            Self::Sqlite3(err) => err.resource(),
            #[cfg(any(feature = "sqlite", feature = "postgres", feature = "mysql"))]
            Self::Unclassified { resource, .. } => resource,
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            #[cfg(feature = "mysql")]
            Self::Mysql(err) => err.kind(),
            #[cfg(feature = "postgres")]
            Self::Postgres(err) => err.kind(),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(err) => err.kind(),
            #[cfg(feature = "sqlite3")]
            Self::Sqlite3(err) => err.kind(),
            #[cfg(any(feature = "sqlite", feature = "postgres", feature = "mysql"))]
            Self::Unclassified { .. } => ErrorKind::Unclassified,
        }
    }
}

// Adapters that never produce `Exists` or `Retryable` kinds report false
// here through the kind-based defaults.
impl Exists for AnyError {}

impl Retryable for AnyError {}

#[cfg(all(
    test,
    feature = "mysql",
    feature = "postgres",
    feature = "sqlite",
    feature = "sqlite3"
))]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("mysql".parse::<Backend>().unwrap(), Backend::Mysql);
        assert_eq!("MariaDB".parse::<Backend>().unwrap(), Backend::Mysql);
        assert_eq!("postgresql".parse::<Backend>().unwrap(), Backend::Postgres);
        assert_eq!(" sqlite ".parse::<Backend>().unwrap(), Backend::Sqlite);
        assert_eq!("rusqlite".parse::<Backend>().unwrap(), Backend::Sqlite3);
        assert_eq!(
            "oracle".parse::<Backend>(),
            Err(ConfigError::UnknownBackend("oracle".into()))
        );
    }

    #[test]
    fn test_backend_display_round_trips() {
        for backend in [
            Backend::Mysql,
            Backend::Postgres,
            Backend::Sqlite,
            Backend::Sqlite3,
        ] {
            assert_eq!(backend.to_string().parse::<Backend>().unwrap(), backend);
        }
    }

    #[test]
    fn test_backend_from_url() {
        assert_eq!(
            Backend::from_url("mysql://root@localhost/app").unwrap(),
            Backend::Mysql
        );
        assert_eq!(
            Backend::from_url("postgresql://localhost/app").unwrap(),
            Backend::Postgres
        );
        assert_eq!(
            Backend::from_url("sqlite:agent.db?mode=rwc").unwrap(),
            Backend::Sqlite
        );
        assert_eq!(
            Backend::from_url("redis://localhost"),
            Err(ConfigError::UnrecognizedUrl("redis://localhost".into()))
        );
        assert!(Backend::from_url("agent.db").is_err());
    }

    #[test]
    fn test_default_features_are_enabled() {
        assert!(Backend::Mysql.is_enabled());
        assert!(Backend::Postgres.is_enabled());
        assert!(Backend::Sqlite.is_enabled());
        assert!(Backend::Sqlite3.is_enabled());
    }

    #[test]
    fn test_classify_dispatches_sqlx_errors_by_backend() {
        let err = Backend::Postgres.classify("user", sqlx::Error::RowNotFound);
        assert!(matches!(err, AnyError::Postgres(_)));
        assert_eq!(err.backend(), Some(Backend::Postgres));
        assert!(err.not_found());
        assert_eq!(err.resource(), "user");
        assert_eq!(err.to_string(), "user not found");

        let err = Backend::Mysql.classify("user", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AnyError::Mysql(_)));
        assert_eq!(err.kind(), ErrorKind::Unclassified);
    }

    #[test]
    fn test_classify_rusqlite_errors_ignores_backend() {
        let err = Backend::Mysql.classify("user", rusqlite::Error::QueryReturnedNoRows);

        assert!(matches!(err, AnyError::Sqlite3(_)));
        assert!(err.not_found());
    }

    #[test]
    fn test_sqlx_error_under_rusqlite_backend_is_unclassified() {
        let err = Backend::Sqlite3.classify("user", sqlx::Error::RowNotFound);
        assert!(matches!(
            err.source().and_then(|e| e.downcast_ref::<sqlx::Error>()),
            Some(sqlx::Error::RowNotFound)
        ));

        assert!(matches!(err, AnyError::Unclassified { .. }));
        assert_eq!(err.backend(), None);
        assert!(!err.not_found());
        assert!(!err.exists());
        assert!(!err.conflict());
        assert!(!err.retry());
        assert_eq!(err.resource(), "user");
        assert_eq!(err.to_string(), sqlx::Error::RowNotFound.to_string());

        let err = Backend::Sqlite3.classify("user", sqlx::Error::PoolTimedOut);
        let AnyError::Unclassified { source, .. } = err else {
            panic!("expected an unclassified error");
        };
        assert!(matches!(source, sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn test_source_reaches_driver_error_for_every_adapter() {
        let errors = [
            Backend::Mysql.classify("user", sqlx::Error::PoolTimedOut),
            Backend::Postgres.classify("user", sqlx::Error::PoolTimedOut),
            Backend::Sqlite.classify("user", sqlx::Error::PoolTimedOut),
            Backend::Sqlite3.classify("user", sqlx::Error::PoolTimedOut),
        ];
        for err in &errors {
            assert!(
                matches!(
                    err.source().and_then(|e| e.downcast_ref::<sqlx::Error>()),
                    Some(sqlx::Error::PoolTimedOut)
                ),
                "{:?}",
                err.backend()
            );
        }

        let err = Backend::Sqlite3.classify("user", rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(
            err.source().and_then(|e| e.downcast_ref::<rusqlite::Error>()),
            Some(rusqlite::Error::QueryReturnedNoRows)
        ));
    }

    #[test]
    fn test_new_error_none_stays_none() {
        assert!(Backend::Sqlite.new_error::<sqlx::Error>("user", None).is_none());
    }
}
