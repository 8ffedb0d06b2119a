//! The session every terminal operation runs against.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use strata_sql::{Connection, Dialect, Driver, ExecResult, Row, Transaction};

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::hook::{Hook, Interceptor};
use crate::schema::SchemaConfig;
use crate::statement::Statement;

/// A database session: a driver (or an open transaction on it), the
/// registered hooks and interceptors, and the schema configuration.
///
/// Cloning is cheap; clones share the connection and configuration.
#[derive(Clone)]
pub struct Client {
    conn: Conn,
    config: Arc<Config>,
    schema: Arc<SchemaConfig>,
}

#[derive(Clone)]
enum Conn {
    Driver(Arc<dyn Driver>),
    Tx {
        tx: Arc<dyn Transaction>,
        driver: Arc<dyn Driver>,
    },
}

#[derive(Clone, Default)]
struct Config {
    hooks: Vec<Hook>,
    entity_hooks: HashMap<&'static str, Vec<Hook>>,
    interceptors: Vec<Interceptor>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("dialect", &self.dialect())
            .field("transactional", &self.is_transactional())
            .field("hooks", &self.config.hooks.len())
            .field("interceptors", &self.config.interceptors.len())
            .field("schema", &self.schema)
            .finish()
    }
}

impl Client {
    /// Create a client over `driver`.
    #[must_use]
    pub fn new(driver: impl Driver) -> Self {
        Self::from_driver(Arc::new(driver))
    }

    /// Create a client over a shared driver.
    #[must_use]
    pub fn from_driver(driver: Arc<dyn Driver>) -> Self {
        Self {
            conn: Conn::Driver(driver),
            config: Arc::new(Config::default()),
            schema: Arc::new(SchemaConfig::default()),
        }
    }

    /// Register a hook for every entity. Client-wide hooks run outermost.
    pub fn use_hook(&mut self, hook: Hook) {
        Arc::make_mut(&mut self.config).hooks.push(hook);
    }

    /// Register a hook for mutations of `E` only.
    pub fn use_hook_for<E: Entity>(&mut self, hook: Hook) {
        Arc::make_mut(&mut self.config).entity_hooks.entry(E::NAME).or_default().push(hook);
    }

    /// Register a query interceptor.
    pub fn use_interceptor(&mut self, interceptor: Interceptor) {
        Arc::make_mut(&mut self.config).interceptors.push(interceptor);
    }

    /// Qualify table references through `schema`.
    #[must_use]
    pub fn with_schema_config(mut self, schema: SchemaConfig) -> Self {
        self.schema = Arc::new(schema);
        self
    }

    /// The schema configuration in use.
    #[must_use]
    pub fn schema_config(&self) -> &SchemaConfig {
        &self.schema
    }

    /// The SQL dialect statements are rendered in.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        match &self.conn {
            Conn::Driver(driver) => driver.dialect(),
            Conn::Tx { tx, .. } => tx.dialect(),
        }
    }

    /// Whether this client is bound to a transaction.
    #[must_use]
    pub const fn is_transactional(&self) -> bool {
        matches!(self.conn, Conn::Tx { .. })
    }

    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when called on a transactional client,
    /// or the driver's error if the transaction cannot be started.
    pub async fn tx(&self) -> Result<Tx> {
        let Conn::Driver(driver) = &self.conn else {
            return Err(Error::InvalidState(
                "cannot start a transaction within a transaction".to_string(),
            ));
        };

        let tx = driver.begin().await?;
        let client = Self {
            conn: Conn::Tx {
                tx: Arc::clone(&tx),
                driver: Arc::clone(driver),
            },
            config: Arc::clone(&self.config),
            schema: Arc::clone(&self.schema),
        };
        Ok(Tx { client, tx })
    }

    /// The non-transactional client behind a transactional one.
    ///
    /// # Panics
    ///
    /// Panics when the client is not bound to a transaction; detaching is
    /// only meaningful for clients obtained from [`Tx::client`].
    #[must_use]
    #[track_caller]
    pub fn detach(&self) -> Self {
        let Conn::Tx { driver, .. } = &self.conn else {
            panic!("strata: Client::detach called on a non-transactional client");
        };
        Self {
            conn: Conn::Driver(Arc::clone(driver)),
            config: Arc::clone(&self.config),
            schema: Arc::clone(&self.schema),
        }
    }

    /// Hooks for `entity`: client-wide first, then per-entity registrations.
    pub(crate) fn hooks_for(&self, entity: &'static str) -> Vec<Hook> {
        let mut hooks = self.config.hooks.clone();
        if let Some(entity_hooks) = self.config.entity_hooks.get(entity) {
            hooks.extend(entity_hooks.iter().cloned());
        }
        hooks
    }

    pub(crate) fn interceptors(&self) -> &[Interceptor] {
        &self.config.interceptors
    }

    pub(crate) async fn query(&self, statement: Statement) -> Result<Vec<Row>> {
        let Statement { sql, params } = statement;
        let rows = match &self.conn {
            Conn::Driver(driver) => driver.query(sql, params),
            Conn::Tx { tx, .. } => tx.query(sql, params),
        };
        Ok(rows.await?)
    }

    pub(crate) async fn exec(&self, statement: Statement) -> Result<ExecResult> {
        let Statement { sql, params } = statement;
        let result = match &self.conn {
            Conn::Driver(driver) => driver.exec(sql, params),
            Conn::Tx { tx, .. } => tx.exec(sql, params),
        };
        Ok(result.await?)
    }
}

/// An open transaction.
///
/// Dropping a `Tx` without committing leaves the outcome to the driver;
/// call [`Tx::rollback`] to abandon it explicitly.
#[derive(Debug)]
pub struct Tx {
    client: Client,
    tx: Arc<dyn Transaction>,
}

impl Tx {
    /// A client whose operations run inside this transaction.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns the driver's error if the commit fails.
    pub async fn commit(self) -> Result<()> {
        tracing::debug!("committing transaction");
        Ok(self.tx.commit().await?)
    }

    /// Roll the transaction back.
    ///
    /// # Errors
    ///
    /// Returns the driver's error if the rollback fails.
    pub async fn rollback(self) -> Result<()> {
        tracing::debug!("rolling back transaction");
        Ok(self.tx.rollback().await?)
    }
}
