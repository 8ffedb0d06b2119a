//! Traits implemented by SQL backends.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;

use crate::types::{DataType, Dialect, ExecResult, Row};

/// Result type for asynchronous driver operations.
pub type FutureResult<T> = BoxFuture<'static, Result<T>>;

/// SQL providers implement the [`Connection`] trait to execute statements
/// against a backend (Postgres, `MySQL`, `SQLite`, etc).
pub trait Connection: Debug + Send + Sync + 'static {
    /// The SQL dialect statements must be rendered in.
    fn dialect(&self) -> Dialect;

    /// Execute a query and return the resulting rows.
    fn query(&self, query: String, params: Vec<DataType>) -> FutureResult<Vec<Row>>;

    /// Execute a statement that does not return rows (e.g., an `INSERT`,
    /// `UPDATE`, or `DELETE`).
    fn exec(&self, query: String, params: Vec<DataType>) -> FutureResult<ExecResult>;
}

/// A pooled or shared connection able to start transactions.
pub trait Driver: Connection {
    /// Begin a new transaction.
    fn begin(&self) -> FutureResult<Arc<dyn Transaction>>;
}

/// A connection bound to an open transaction.
pub trait Transaction: Connection {
    /// Commit the transaction.
    fn commit(&self) -> FutureResult<()>;

    /// Roll the transaction back.
    fn rollback(&self) -> FutureResult<()>;
}

/// Reported by drivers when a statement violates a unique, foreign-key,
/// not-null or check constraint.
///
/// Drivers return it inside an [`anyhow::Error`]; callers recognise it with
/// `downcast_ref`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("constraint violation: {message}")]
pub struct ConstraintViolation {
    /// Backend supplied description of the violated constraint.
    pub message: String,
}

/// Implemented by backends to allow them to be connected using options
/// loaded from the environment.
pub trait Backend: Sized + Sync + Send {
    /// The options used to connect to the backend.
    type ConnectOptions: FromEnv;

    /// Connect to the backend using options from the environment.
    #[must_use]
    fn connect() -> impl Future<Output = Result<Self>> {
        async { Self::connect_with(Self::ConnectOptions::from_env()?).await }
    }

    /// Connect to the backend with the specified options.
    fn connect_with(options: Self::ConnectOptions) -> impl Future<Output = Result<Self>>;
}

/// Trait for creating connection options from environment variables.
pub trait FromEnv: Sized {
    /// Create connection options from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    fn from_env() -> Result<Self>;
}
