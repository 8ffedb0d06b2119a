//! Entity schema descriptors and schema-name configuration.

use std::collections::HashMap;

use anyhow::Context;
use chrono::Utc;
use fromenv::FromEnv;
use sea_query::{Alias, IntoTableRef, TableRef};

use crate::create::{Create, CreateBulk};
use crate::delete::{Delete, DeleteOne};
use crate::entity::Entity;
use crate::hook::Hook;
use crate::mutation::Mutation;
use crate::query::Query;
use crate::update::{Update, UpdateOne};

/// Redirects table references to alternate database schemas.
///
/// Every statement the ORM compiles resolves its tables through the client's
/// `SchemaConfig`: a per-table override wins over the default schema, and an
/// empty schema leaves the table unqualified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaConfig {
    schema: String,
    tables: HashMap<&'static str, String>,
}

/// Environment-sourced options for [`SchemaConfig::from_env`].
#[derive(Debug, Clone, FromEnv)]
pub struct SchemaOptions {
    #[env(from = "SQL_SCHEMA", default = "")]
    schema: String,
}

impl SchemaConfig {
    /// Qualify every table with `schema`.
    #[must_use]
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            tables: HashMap::new(),
        }
    }

    /// Load the default schema from `SQL_SCHEMA`.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be read.
    pub fn from_env() -> anyhow::Result<Self> {
        let options =
            SchemaOptions::from_env().finalize().context("issue loading schema options")?;
        Ok(Self::new(options.schema))
    }

    /// Place `table` in `schema`, overriding the default.
    #[must_use]
    pub fn with_table(mut self, table: &'static str, schema: impl Into<String>) -> Self {
        self.tables.insert(table, schema.into());
        self
    }

    /// The schema `table` lives in, if any.
    #[must_use]
    pub fn schema_for(&self, table: &str) -> Option<&str> {
        let schema = self.tables.get(table).unwrap_or(&self.schema);
        (!schema.is_empty()).then_some(schema.as_str())
    }

    /// A (possibly schema-qualified) reference to `table`.
    #[must_use]
    pub fn table_ref(&self, table: &'static str) -> TableRef {
        match self.schema_for(table) {
            Some(schema) => (Alias::new(schema), Alias::new(table)).into_table_ref(),
            None => Alias::new(table).into_table_ref(),
        }
    }
}

/// A foreign-key column backing a to-one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    /// Edge name, e.g. `project`.
    pub edge: &'static str,

    /// Column holding the referenced id, e.g. `project_id`.
    pub column: &'static str,

    /// Whether the edge must always be set.
    pub required: bool,
}

impl ForeignKey {
    /// A required unique edge.
    #[must_use]
    pub const fn required(edge: &'static str, column: &'static str) -> Self {
        Self {
            edge,
            column,
            required: true,
        }
    }

    /// An optional edge.
    #[must_use]
    pub const fn optional(edge: &'static str, column: &'static str) -> Self {
        Self {
            edge,
            column,
            required: false,
        }
    }
}

/// Per-entity constraints, defaults and hooks, plus the builder entry points.
pub trait Schema: Entity {
    /// Columns that must be set (and non-null) on create and may not be cleared.
    #[must_use]
    fn required() -> &'static [&'static str] {
        &[]
    }

    /// Columns that may not change once the row exists.
    #[must_use]
    fn immutable() -> &'static [&'static str] {
        &[]
    }

    /// Foreign keys backing this entity's to-one edges.
    #[must_use]
    fn foreign_keys() -> &'static [ForeignKey] {
        &[]
    }

    /// Fill default values on create. Only absent fields should be set.
    ///
    /// # Errors
    ///
    /// Returns an error if a default cannot be produced.
    fn create_defaults(_mutation: &mut Mutation) -> crate::error::Result<()> {
        Ok(())
    }

    /// Fill default values on update. Only absent fields should be set.
    ///
    /// # Errors
    ///
    /// Returns an error if a default cannot be produced.
    fn update_defaults(_mutation: &mut Mutation) -> crate::error::Result<()> {
        Ok(())
    }

    /// Field validators, run after defaulting and the built-in checks.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] when a field is invalid.
    fn validate(_mutation: &Mutation) -> crate::error::Result<()> {
        Ok(())
    }

    /// Hooks declared by the schema. They run innermost, closest to the I/O.
    #[must_use]
    fn hooks() -> Vec<Hook> {
        Vec::new()
    }

    /// Start a query.
    #[must_use]
    fn query() -> Query<Self> {
        Query::new()
    }

    /// Start a create.
    #[must_use]
    fn create() -> Create<Self> {
        Create::new()
    }

    /// Batch several creates into one statement.
    #[must_use]
    fn create_bulk(builders: impl IntoIterator<Item = Create<Self>>) -> CreateBulk<Self> {
        CreateBulk::new(builders)
    }

    /// Start a predicate-scoped update.
    #[must_use]
    fn update() -> Update<Self> {
        Update::new()
    }

    /// Start an update of this row.
    #[must_use]
    fn update_one(&self) -> UpdateOne<Self> {
        UpdateOne::new(self.id().clone())
    }

    /// Start an update of the row with `id`.
    #[must_use]
    fn update_one_id(id: Self::Id) -> UpdateOne<Self> {
        UpdateOne::new(id)
    }

    /// Start a predicate-scoped delete.
    #[must_use]
    fn delete() -> Delete<Self> {
        Delete::new()
    }

    /// Start a delete of this row.
    #[must_use]
    fn delete_one(&self) -> DeleteOne<Self> {
        DeleteOne::new(self.id().clone())
    }

    /// Start a delete of the row with `id`.
    #[must_use]
    fn delete_one_id(id: Self::Id) -> DeleteOne<Self> {
        DeleteOne::new(id)
    }
}

/// Defaults for entities carrying `create_time` and `update_time`.
pub struct TimeMixin;

impl TimeMixin {
    /// Set `create_time` and `update_time` to now when absent.
    pub fn create(mutation: &mut Mutation) {
        let now = Utc::now();
        if !mutation.has_field("create_time") {
            mutation.set_field("create_time", now);
        }
        if !mutation.has_field("update_time") {
            mutation.set_field("update_time", now);
        }
    }

    /// Set `update_time` to now when absent.
    pub fn update(mutation: &mut Mutation) {
        if !mutation.has_field("update_time") {
            mutation.set_field("update_time", Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use sea_query::{Query, SqliteQueryBuilder};

    use super::*;

    #[test]
    fn table_override_wins() {
        let config = SchemaConfig::new("tenant").with_table("projects", "shared");
        assert_eq!(config.schema_for("projects"), Some("shared"));
        assert_eq!(config.schema_for("services"), Some("tenant"));
        assert_eq!(SchemaConfig::default().schema_for("services"), None);

        let sql = Query::select()
            .column(Alias::new("id"))
            .from(config.table_ref("projects"))
            .to_string(SqliteQueryBuilder);
        assert_eq!(sql, r#"SELECT "id" FROM "shared"."projects""#);
    }
}
