//! Common test helpers shared across integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use strata_model::{Connector, Environment, Project, Service, TemplateVersion};
use strata_orm::{Client, Dialect, Schema};
use strata_sql::{
    Backend, ConnectOptions, Connection, DataType, Driver, ExecResult, FutureResult, Row, SqlDefault,
    Transaction,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

const SCHEMA: &str = r"
    CREATE TABLE projects (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        labels TEXT,
        create_time TEXT,
        update_time TEXT
    );
    CREATE TABLE environments (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        labels TEXT,
        project_id TEXT NOT NULL REFERENCES projects (id) ON DELETE RESTRICT,
        create_time TEXT,
        update_time TEXT,
        UNIQUE (project_id, name)
    );
    CREATE TABLE connectors (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        labels TEXT,
        project_id TEXT REFERENCES projects (id) ON DELETE CASCADE,
        category TEXT NOT NULL,
        connector_type TEXT NOT NULL,
        config_version TEXT NOT NULL DEFAULT '',
        config_data TEXT,
        enable_fin_ops INTEGER NOT NULL DEFAULT 0,
        status TEXT,
        create_time TEXT,
        update_time TEXT
    );
    CREATE TABLE environment_connector_relationships (
        id TEXT PRIMARY KEY,
        environment_id TEXT NOT NULL REFERENCES environments (id) ON DELETE CASCADE,
        connector_id TEXT NOT NULL REFERENCES connectors (id) ON DELETE RESTRICT,
        create_time TEXT,
        UNIQUE (environment_id, connector_id)
    );
    CREATE TABLE template_versions (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        version TEXT NOT NULL,
        source TEXT NOT NULL,
        schema TEXT,
        project_id TEXT REFERENCES projects (id) ON DELETE CASCADE,
        create_time TEXT,
        update_time TEXT
    );
    CREATE TABLE services (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        labels TEXT,
        project_id TEXT NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
        environment_id TEXT NOT NULL REFERENCES environments (id) ON DELETE CASCADE,
        template_id TEXT REFERENCES template_versions (id) ON DELETE RESTRICT,
        attributes TEXT,
        status TEXT,
        create_time TEXT,
        update_time TEXT,
        UNIQUE (environment_id, name)
    );
    CREATE TABLE service_resources (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
        service_id TEXT NOT NULL REFERENCES services (id) ON DELETE CASCADE,
        composition_id TEXT REFERENCES service_resources (id) ON DELETE CASCADE,
        class_id TEXT REFERENCES service_resources (id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        mode TEXT NOT NULL,
        resource_type TEXT NOT NULL,
        deployer_type TEXT NOT NULL,
        shape TEXT NOT NULL,
        status TEXT,
        create_time TEXT,
        update_time TEXT
    );
    CREATE TABLE service_resource_relationships (
        id TEXT PRIMARY KEY,
        service_resource_id TEXT NOT NULL REFERENCES service_resources (id) ON DELETE CASCADE,
        dependency_id TEXT NOT NULL REFERENCES service_resources (id) ON DELETE CASCADE,
        dependency_type TEXT NOT NULL,
        create_time TEXT
    );
    CREATE TABLE variables (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        value TEXT NOT NULL,
        sensitive INTEGER NOT NULL DEFAULT 0,
        description TEXT NOT NULL DEFAULT '',
        project_id TEXT REFERENCES projects (id) ON DELETE CASCADE,
        environment_id TEXT REFERENCES environments (id) ON DELETE CASCADE,
        create_time TEXT,
        update_time TEXT
    );
    CREATE TABLE cluster_costs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        minutes REAL NOT NULL DEFAULT 0,
        connector_id TEXT NOT NULL REFERENCES connectors (id) ON DELETE CASCADE,
        cluster_name TEXT NOT NULL DEFAULT '',
        total_cost REAL NOT NULL DEFAULT 0,
        currency INTEGER NOT NULL DEFAULT 0,
        allocation_cost REAL NOT NULL DEFAULT 0,
        idle_cost REAL NOT NULL DEFAULT 0,
        management_cost REAL NOT NULL DEFAULT 0
    );
";

/// Driver wrapper recording every statement it runs.
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

/// A fresh in-memory database with every table of the model.
#[allow(clippy::missing_panics_doc)]
pub async fn setup() -> (Client, Recorder) {
    let _ = Registry::default()
        .with(EnvFilter::new("strata_orm=debug,strata_model=debug"))
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
        dialect: Dialect::Sqlite,
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

/// Insert a Kubernetes connector named `name`, global when `project` is
/// `None`.
#[allow(clippy::missing_panics_doc)]
pub async fn connector(client: &Client, project: Option<&Project>, name: &str) -> Connector {
    Connector::create()
        .set("name", name)
        .set("category", "Kubernetes")
        .set("connector_type", "Kubernetes")
        .set_opt("project_id", project.map(|p| p.id))
        .save(client)
        .await
        .expect("should create connector")
}

/// Insert a template version, global when `project` is `None`.
#[allow(clippy::missing_panics_doc)]
pub async fn template(
    client: &Client, project: Option<&Project>, name: &str, version: &str,
) -> TemplateVersion {
    TemplateVersion::create()
        .set("name", name)
        .set("version", version)
        .set("source", format!("https://example.com/{name}?ref={version}"))
        .set_opt("project_id", project.map(|p| p.id))
        .save(client)
        .await
        .expect("should create template version")
}

/// Insert a service named `name` into `environment`.
#[allow(clippy::missing_panics_doc)]
pub async fn service(
    client: &Client, environment: &Environment, template: Option<&TemplateVersion>, name: &str,
) -> Service {
    Service::create()
        .set("name", name)
        .set("project_id", environment.project_id)
        .set("environment_id", environment.id)
        .set_opt("template_id", template.map(|t| t.id))
        .save(client)
        .await
        .expect("should create service")
}

/// Normalize SQL by collapsing whitespace.
fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonicalize SQL for comparison by removing identifier quotes and normalizing whitespace.
fn canonicalize_sql(sql: &str) -> String {
    let mut cleaned = String::with_capacity(sql.len());
    let mut in_single_quote = false;

    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_single_quote = !in_single_quote;
                cleaned.push(ch);
            }
            '"' | '`' if !in_single_quote => {}
            _ => cleaned.push(ch),
        }
    }

    normalize_sql(&cleaned)
}

/// Assert that SQL contains all expected fragments in order.
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
