//! Common test helpers shared across integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use strata_orm::{
    Client, Dialect, ForeignKey, Json, Mutation, ObjectId, Relation, RelationKind, Result, Schema,
    TimeMixin, ToMany, ToOne, entity,
};
use strata_sql::{
    Backend, ConnectOptions, Connection, DataType, Driver, ExecResult, FutureResult, Row,
    SqlDefault, Transaction,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

// Common test entities used across multiple test files

#[derive(Debug, Clone, Default)]
pub struct ProjectEdges {
    pub environments: ToMany<Environment>,
}

entity! {
    table = "projects",
    name = "Project",
    id = ObjectId,
    edges = ProjectEdges,
    pub struct Project {
        pub name: String,
        pub description: String,
        pub revision: i64,
        pub labels: Json<BTreeMap<String, String>>,
        pub tags: Json<Vec<String>>,
        pub create_time: Option<DateTime<Utc>>,
        pub update_time: Option<DateTime<Utc>>,
    }
}

impl Project {
    pub const ENVIRONMENTS: Relation<Self, Environment> = Relation {
        name: "environments",
        kind: RelationKind::HasMany {
            column: "project_id",
            key: |env| Some(env.project_id),
            edge: |project| &mut project.edges.environments,
        },
    };
}

impl Schema for Project {
    fn required() -> &'static [&'static str] {
        &["name"]
    }

    fn immutable() -> &'static [&'static str] {
        &["name", "create_time"]
    }

    fn create_defaults(mutation: &mut Mutation) -> Result<()> {
        TimeMixin::create(mutation);
        Ok(())
    }

    fn update_defaults(mutation: &mut Mutation) -> Result<()> {
        TimeMixin::update(mutation);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnvironmentEdges {
    pub project: ToOne<Project>,
}

entity! {
    table = "environments",
    name = "Environment",
    id = ObjectId,
    edges = EnvironmentEdges,
    pub struct Environment {
        pub name: String,
        pub project_id: ObjectId,
        pub description: String,
    }
}

impl Environment {
    pub const PROJECT: Relation<Self, Project> = Relation {
        name: "project",
        kind: RelationKind::BelongsTo {
            column: "project_id",
            key: |env| Some(env.project_id),
            edge: |env| &mut env.edges.project,
        },
    };
}

impl Schema for Environment {
    fn required() -> &'static [&'static str] {
        &["name"]
    }

    fn immutable() -> &'static [&'static str] {
        &["name", "project_id"]
    }

    fn foreign_keys() -> &'static [ForeignKey] {
        const KEYS: &[ForeignKey] = &[ForeignKey::required("project", "project_id")];
        KEYS
    }
}

const SCHEMA: &str = r"
    CREATE TABLE projects (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        revision INTEGER NOT NULL DEFAULT 0,
        labels TEXT,
        tags TEXT,
        create_time TEXT,
        update_time TEXT
    );
    CREATE TABLE environments (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        project_id TEXT NOT NULL REFERENCES projects (id) ON DELETE RESTRICT,
        description TEXT NOT NULL DEFAULT '',
        UNIQUE (project_id, name)
    );
";

/// Driver wrapper recording every statement it runs.
///
/// The dialect may be overridden to exercise the code paths of backends
/// without `RETURNING` against `SQLite`.
#[derive(Debug, Clone)]
pub struct Recorder {
    inner: SqlDefault,
    dialect: Dialect,
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    /// Statements run so far.
    pub fn statements(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Number of statements run so far.
    pub fn count(&self) -> usize {
        self.log.lock().len()
    }

    /// Forget recorded statements.
    pub fn reset(&self) {
        self.log.lock().clear();
    }
}

impl Connection for Recorder {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn query(&self, query: String, params: Vec<DataType>) -> FutureResult<Vec<Row>> {
        self.log.lock().push(query.clone());
        self.inner.query(query, params)
    }

    fn exec(&self, query: String, params: Vec<DataType>) -> FutureResult<ExecResult> {
        self.log.lock().push(query.clone());
        self.inner.exec(query, params)
    }
}

impl Driver for Recorder {
    fn begin(&self) -> FutureResult<Arc<dyn Transaction>> {
        self.inner.begin()
    }
}

/// A fresh in-memory database with the test schema.
#[allow(clippy::missing_panics_doc)]
pub async fn setup() -> (Client, Recorder) {
    setup_with(Dialect::Sqlite).await
}

/// As [`setup`], reporting `dialect` to the ORM.
#[allow(clippy::missing_panics_doc)]
pub async fn setup_with(dialect: Dialect) -> (Client, Recorder) {
    let _ = Registry::default()
        .with(EnvFilter::new("strata_orm=debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();

    let inner = SqlDefault::connect_with(ConnectOptions {
        database: ":memory:".to_string(),
    })
    .await
    .expect("should open database");
    inner.execute_batch(SCHEMA).expect("should create schema");

    let recorder = Recorder {
        inner,
        dialect,
        log: Arc::new(Mutex::new(Vec::new())),
    };
    (Client::new(recorder.clone()), recorder)
}

/// Insert a project named `name`.
#[allow(clippy::missing_panics_doc)]
pub async fn project(client: &Client, name: &str) -> Project {
    Project::create().set("name", name).save(client).await.expect("should create project")
}

/// Insert an environment named `name` under `project`.
#[allow(clippy::missing_panics_doc)]
pub async fn environment(client: &Client, project: &Project, name: &str) -> Environment {
    Environment::create()
        .set("name", name)
        .set("project_id", project.id)
        .save(client)
        .await
        .expect("should create environment")
}

/// Normalize SQL by collapsing whitespace.
fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonicalize SQL for comparison by removing identifier quotes and normalizing whitespace.
/// Preserves quotes inside string literals.
fn canonicalize_sql(sql: &str) -> String {
    let mut cleaned = String::with_capacity(sql.len());
    let mut in_single_quote = false;

    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_single_quote = !in_single_quote;
                cleaned.push(ch);
            }
            '"' | '`' if !in_single_quote => {
                // Strip identifier quoting to avoid brittle comparisons.
            }
            _ => cleaned.push(ch),
        }
    }

    normalize_sql(&cleaned)
}

/// Assert that SQL contains all expected fragments in order.
///
/// This helper normalizes SQL to avoid brittle exact-string matching with ``SeaQuery`` output.
/// It strips identifier quotes, normalizes whitespace, and checks that fragments appear
/// sequentially in the generated SQL.
#[allow(clippy::missing_panics_doc)]
pub fn assert_sql_contains(actual: &str, fragments: &[&str]) {
    let actual_canonical = canonicalize_sql(actual);
    let mut search_start = 0usize;

    for fragment in fragments {
        let fragment_canonical = canonicalize_sql(fragment);
        if fragment_canonical.is_empty() {
            continue;
        }

        if let Some(pos) = actual_canonical[search_start..].find(&fragment_canonical) {
            search_start += pos + fragment_canonical.len();
        } else {
            panic!(
                "expected SQL fragment `{fragment_canonical}` not found in `{actual_canonical}`"
            );
        }
    }
}
