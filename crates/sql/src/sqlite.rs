//! Default `SQLite` backend.
//!
//! This is a lightweight implementation for development and tests only. All
//! work is serialised over a single shared connection, so a transaction opened
//! with [`Driver::begin`] is visible to every user of the same [`SqlDefault`].

#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_lossless)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use fromenv::FromEnv;
use futures::FutureExt;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{Connection as SqliteConnection, ErrorCode, params_from_iter};
use tracing::instrument;

use crate::driver::{
    Backend, Connection, ConstraintViolation, Driver, FutureResult, Transaction,
};
use crate::types::{DataType, Dialect, ExecResult, Field, Row};

/// Options used to connect to the SQL database.
///
/// This struct is used to load connection options from environment variables.
#[derive(Debug, Clone, FromEnv)]
pub struct ConnectOptions {
    /// Path or URI of the `SQLite` database.
    #[env(from = "SQL_DATABASE", default = "file::memory:?cache=shared")]
    pub database: String,
}

impl crate::driver::FromEnv for ConnectOptions {
    fn from_env() -> Result<Self> {
        Self::from_env().finalize().context("issue loading connection options")
    }
}

/// Default `SQLite` driver.
#[derive(Debug, Clone)]
pub struct SqlDefault {
    // Mutex is necessary since rusqlite::Connection isn't `Sync`
    conn: Arc<parking_lot::Mutex<SqliteConnection>>,
}

impl Backend for SqlDefault {
    type ConnectOptions = ConnectOptions;

    #[instrument]
    async fn connect_with(options: Self::ConnectOptions) -> Result<Self> {
        tracing::debug!("initializing SQLite connection to: {}", options.database);

        let conn = SqliteConnection::open(&options.database)
            .context("failed to open SQLite database")?;
        conn.execute_batch("PRAGMA foreign_keys = ON")
            .context("failed to enable foreign keys")?;

        Ok(Self {
            conn: Arc::new(parking_lot::Mutex::new(conn)),
        })
    }
}

impl SqlDefault {
    /// Run a batch of semicolon separated statements, typically DDL.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement in the batch fails.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql).map_err(|e| sqlite_error(e, "failed to execute batch"))
    }
}

impl Connection for SqlDefault {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, query: String, params: Vec<DataType>) -> FutureResult<Vec<Row>> {
        tracing::debug!("executing query: {}", query);
        let conn = Arc::clone(&self.conn);
        async move { run_query(&conn.lock(), &query, &params) }.boxed()
    }

    fn exec(&self, query: String, params: Vec<DataType>) -> FutureResult<ExecResult> {
        tracing::debug!("executing statement: {}", query);
        let conn = Arc::clone(&self.conn);
        async move { run_exec(&conn.lock(), &query, &params) }.boxed()
    }
}

impl Driver for SqlDefault {
    fn begin(&self) -> FutureResult<Arc<dyn Transaction>> {
        tracing::debug!("beginning transaction");
        let conn = Arc::clone(&self.conn);

        async move {
            conn.lock()
                .execute_batch("BEGIN")
                .map_err(|e| sqlite_error(e, "failed to begin transaction"))?;
            let tx = SqliteTransaction {
                conn,
                finished: Arc::new(AtomicBool::new(false)),
            };
            Ok(Arc::new(tx) as Arc<dyn Transaction>)
        }
        .boxed()
    }
}

#[derive(Debug)]
struct SqliteTransaction {
    conn: Arc<parking_lot::Mutex<SqliteConnection>>,
    finished: Arc<AtomicBool>,
}

impl SqliteTransaction {
    fn finish(&self, sql: &'static str) -> FutureResult<()> {
        let conn = Arc::clone(&self.conn);
        let finished = Arc::clone(&self.finished);

        async move {
            if finished.swap(true, Ordering::SeqCst) {
                bail!("transaction has already been committed or rolled back");
            }
            conn.lock().execute_batch(sql).map_err(|e| sqlite_error(e, "failed to end transaction"))
        }
        .boxed()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished.load(Ordering::SeqCst) {
            bail!("transaction has already been committed or rolled back");
        }
        Ok(())
    }
}

impl Connection for SqliteTransaction {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, query: String, params: Vec<DataType>) -> FutureResult<Vec<Row>> {
        tracing::debug!("executing query in transaction: {}", query);
        let open = self.ensure_open();
        let conn = Arc::clone(&self.conn);

        async move {
            open?;
            run_query(&conn.lock(), &query, &params)
        }
        .boxed()
    }

    fn exec(&self, query: String, params: Vec<DataType>) -> FutureResult<ExecResult> {
        tracing::debug!("executing statement in transaction: {}", query);
        let open = self.ensure_open();
        let conn = Arc::clone(&self.conn);

        async move {
            open?;
            run_exec(&conn.lock(), &query, &params)
        }
        .boxed()
    }
}

impl Transaction for SqliteTransaction {
    fn commit(&self) -> FutureResult<()> {
        tracing::debug!("committing transaction");
        self.finish("COMMIT")
    }

    fn rollback(&self) -> FutureResult<()> {
        tracing::debug!("rolling back transaction");
        self.finish("ROLLBACK")
    }
}

fn run_query(conn: &SqliteConnection, query: &str, params: &[DataType]) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(query).map_err(|e| sqlite_error(e, "failed to prepare statement"))?;
    let names: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();

    let mut rows = stmt
        .query(params_from_iter(params.iter().map(to_sqlite)))
        .map_err(|e| sqlite_error(e, "failed to execute query"))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| sqlite_error(e, "failed to fetch row"))? {
        let fields = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = row.get_ref(i).with_context(|| format!("failed to read column {name}"))?;
                Ok(Field {
                    name: name.clone(),
                    value: from_sqlite(value)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        out.push(Row {
            index: out.len().to_string(),
            fields,
        });
    }
    Ok(out)
}

fn run_exec(conn: &SqliteConnection, query: &str, params: &[DataType]) -> Result<ExecResult> {
    let affected = conn
        .prepare(query)
        .map_err(|e| sqlite_error(e, "failed to prepare statement"))?
        .execute(params_from_iter(params.iter().map(to_sqlite)))
        .map_err(|e| sqlite_error(e, "failed to execute statement"))?;

    Ok(ExecResult {
        rows_affected: affected as u64,
        last_insert_id: Some(conn.last_insert_rowid()),
    })
}

// Constraint failures surface as `ConstraintViolation` so the ORM can type them.
fn sqlite_error(err: rusqlite::Error, context: &'static str) -> anyhow::Error {
    if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
        return anyhow::Error::new(ConstraintViolation {
            message: err.to_string(),
        });
    }
    anyhow::Error::new(err).context(context)
}

fn to_sqlite(value: &DataType) -> SqliteValue {
    match value {
        DataType::Boolean(Some(b)) => SqliteValue::Integer(i64::from(*b)),
        DataType::Int32(Some(n)) => SqliteValue::Integer(i64::from(*n)),
        DataType::Uint32(Some(n)) => SqliteValue::Integer(i64::from(*n)),
        DataType::Int64(Some(n)) => SqliteValue::Integer(*n),
        DataType::Uint64(Some(n)) => SqliteValue::Integer(*n as i64),
        DataType::Float(Some(x)) => SqliteValue::Real(f64::from(*x)),
        DataType::Double(Some(x)) => SqliteValue::Real(*x),
        DataType::Str(Some(text))
        | DataType::Date(Some(text))
        | DataType::Time(Some(text))
        | DataType::Timestamp(Some(text)) => SqliteValue::Text(text.clone()),
        DataType::Binary(Some(bytes)) => SqliteValue::Blob(bytes.clone()),
        _ => SqliteValue::Null,
    }
}

// SQLite is dynamically typed, so values come back in their storage class.
fn from_sqlite(value: ValueRef<'_>) -> Result<DataType> {
    Ok(match value {
        ValueRef::Null => DataType::Str(None),
        ValueRef::Integer(n) => DataType::Int64(Some(n)),
        ValueRef::Real(x) => DataType::Double(Some(x)),
        ValueRef::Text(bytes) => {
            DataType::Str(Some(String::from_utf8(bytes.to_vec()).context("invalid UTF-8 in text value")?))
        }
        ValueRef::Blob(bytes) => DataType::Binary(Some(bytes.to_vec())),
    })
}
