//! # dberrors - Backend-agnostic SQL error classification
//!
//! dberrors turns the raw errors of SQL drivers into normalized errors that
//! answer a handful of questions the same way for every backend: was the
//! row missing, did the write hit a constraint, does the row already exist,
//! and is it worth retrying.
//!
//! ## Backends
//!
//! - **MySQL** (`mysql` feature): sqlx MySQL driver
//! - **PostgreSQL** (`postgres` feature): sqlx PostgreSQL driver
//! - **SQLite** (`sqlite` feature): sqlx SQLite driver
//! - **SQLite** (`sqlite3` feature): rusqlite
//!
//! | Adapter | `conflict` | `exists` | `retry` |
//! |---|---|---|---|
//! | `mysql` | duplicate entry | never | - |
//! | `postgres` | foreign key | unique | - |
//! | `sqlite` | check, primary key, unique | - | locked, busy |
//! | `sqlite3` | any constraint but unique | unique | locked, busy |
//!
//! ## Example
//!
//! ```rust,ignore
//! use dberrors::{postgres, Classified, Exists};
//!
//! async fn create_user(pool: &sqlx::PgPool, email: &str) -> Result<(), postgres::Error> {
//!     sqlx::query("INSERT INTO users (email) VALUES ($1)")
//!         .bind(email)
//!         .execute(pool)
//!         .await
//!         .map_err(postgres::with_resource("user"))?;
//!     Ok(())
//! }
//!
//! match create_user(&pool, "a@example.com").await {
//!     Err(err) if err.exists() => println!("already registered"),
//!     Err(err) => return Err(err.into()),
//!     Ok(()) => {}
//! }
//! ```

pub mod backend;
pub mod error;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "sqlite3")]
pub mod sqlite3;

pub use backend::{AnyError, Backend, DriverError};
pub use error::{Classified, ConfigError, ErrorKind, Exists, Result, Retryable};
