//! Mutation tracking shared by the create, update and delete builders.

use std::fmt;

use chrono::{DateTime, Utc};
use sea_query::Value;
use strata_sql::Row;

use crate::codec::value_to_datatype;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::schema::Schema;
use crate::upsert::Conflict;

/// The kind of write a [`Mutation`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Insert one or more rows.
    Create,
    /// Update one row by id.
    UpdateOne,
    /// Update every row matching the predicates.
    Update,
    /// Delete one row by id.
    DeleteOne,
    /// Delete every row matching the predicates.
    Delete,
}

impl Op {
    /// `UpdateOne` or `Update`.
    #[must_use]
    pub const fn is_update(self) -> bool {
        matches!(self, Self::UpdateOne | Self::Update)
    }

    /// `DeleteOne` or `Delete`.
    #[must_use]
    pub const fn is_delete(self) -> bool {
        matches!(self, Self::DeleteOne | Self::Delete)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "OpCreate",
            Self::UpdateOne => "OpUpdateOne",
            Self::Update => "OpUpdate",
            Self::DeleteOne => "OpDeleteOne",
            Self::Delete => "OpDelete",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a mutation. Each step may only be entered from its
/// predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MutationState {
    /// Field setters are being applied.
    Accumulating,
    /// Defaults have been filled in.
    Defaulted,
    /// Required fields, validators and edge invariants passed.
    Checked,
    /// Compiled into a statement.
    Compiled,
    /// Sent to the driver.
    Executed,
    /// Result consumed; the mutation cannot be reused.
    Done,
}

impl MutationState {
    const fn successor(self) -> Option<Self> {
        match self {
            Self::Accumulating => Some(Self::Defaulted),
            Self::Defaulted => Some(Self::Checked),
            Self::Checked => Some(Self::Compiled),
            Self::Compiled => Some(Self::Executed),
            Self::Executed => Some(Self::Done),
            Self::Done => None,
        }
    }
}

/// Result of running a mutation through the hook chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Rows written, as returned by the database.
    Rows(Vec<Row>),
    /// Number of rows affected.
    Affected(u64),
}

impl Outcome {
    /// Number of rows this outcome covers.
    #[must_use]
    pub fn affected(&self) -> u64 {
        match self {
            Self::Rows(rows) => rows.len() as u64,
            Self::Affected(n) => *n,
        }
    }
}

/// The in-memory description of a pending write.
///
/// Builders accumulate into a `Mutation`; hooks receive it and may inspect or
/// change it before it reaches the database. A column appears in at most one
/// of the set, add, append and clear collections: the latest call wins.
#[derive(Debug, Clone)]
pub struct Mutation {
    op: Op,
    table: &'static str,
    entity: &'static str,
    columns: &'static [&'static str],
    state: MutationState,
    id: Option<Value>,
    fields: Vec<(&'static str, Value)>,
    adds: Vec<(&'static str, Value)>,
    appends: Vec<(&'static str, Vec<serde_json::Value>)>,
    cleared: Vec<&'static str>,
    cleared_edges: Vec<&'static str>,
    predicates: Vec<Filter>,
    conflict: Option<Conflict>,
}

impl Mutation {
    pub(crate) fn new<E: Entity>(op: Op) -> Self {
        Self {
            op,
            table: E::TABLE,
            entity: E::NAME,
            columns: E::columns(),
            state: MutationState::Accumulating,
            id: None,
            fields: Vec::new(),
            adds: Vec::new(),
            appends: Vec::new(),
            cleared: Vec::new(),
            cleared_edges: Vec::new(),
            predicates: Vec::new(),
            conflict: None,
        }
    }

    /// The operation.
    #[must_use]
    pub const fn op(&self) -> Op {
        self.op
    }

    /// Entity name, e.g. `Environment`.
    #[must_use]
    pub const fn entity(&self) -> &'static str {
        self.entity
    }

    /// Table written to.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        self.table
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> MutationState {
        self.state
    }

    /// Target id of a single-row update or delete.
    #[must_use]
    pub const fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    pub(crate) fn set_id(&mut self, id: Value) {
        self.id = Some(id);
    }

    /// Value assigned to `name`, if any.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(col, _)| *col == name).map(|(_, value)| value)
    }

    /// Text assigned to `name`, if it is set to a non-null string.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.field(name)? {
            Value::String(Some(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Timestamp assigned to `name`, if it is set to a non-null time.
    #[must_use]
    pub fn time(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.field(name)? {
            Value::ChronoDateTimeUtc(Some(time)) => Some(**time),
            _ => None,
        }
    }

    /// Whether `name` has been assigned.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Assigned columns and values, in assignment order.
    #[must_use]
    pub fn fields(&self) -> &[(&'static str, Value)] {
        &self.fields
    }

    /// Numeric deltas.
    #[must_use]
    pub fn added_fields(&self) -> &[(&'static str, Value)] {
        &self.adds
    }

    /// JSON array appends.
    #[must_use]
    pub fn appended_fields(&self) -> &[(&'static str, Vec<serde_json::Value>)] {
        &self.appends
    }

    /// Columns being set to `NULL`.
    #[must_use]
    pub fn cleared_fields(&self) -> &[&'static str] {
        &self.cleared
    }

    /// Edges being cleared.
    #[must_use]
    pub fn cleared_edges(&self) -> &[&'static str] {
        &self.cleared_edges
    }

    /// Predicates of a predicate-scoped update or delete.
    #[must_use]
    pub fn predicates(&self) -> &[Filter] {
        &self.predicates
    }

    /// Assign `value` to `column`.
    pub fn set_field(&mut self, column: &'static str, value: impl Into<Value>) {
        self.forget(column);
        self.fields.push((column, value.into()));
    }

    /// Add `delta` to the numeric `column`.
    pub fn add_field(&mut self, column: &'static str, delta: impl Into<Value>) {
        self.forget(column);
        self.adds.push((column, delta.into()));
    }

    /// Append `items` to the JSON array in `column`.
    pub fn append_field(&mut self, column: &'static str, items: Vec<serde_json::Value>) {
        self.forget(column);
        self.appends.push((column, items));
    }

    /// Set `column` to `NULL`.
    pub fn clear_field(&mut self, column: &'static str) {
        self.forget(column);
        self.cleared.push(column);
    }

    /// Clear the to-one edge `edge`.
    pub fn clear_edge(&mut self, edge: &'static str) {
        if !self.cleared_edges.contains(&edge) {
            self.cleared_edges.push(edge);
        }
    }

    /// Restrict the rows affected.
    pub fn r#where(&mut self, filter: Filter) {
        self.predicates.push(filter);
    }

    pub(crate) const fn conflict(&self) -> Option<&Conflict> {
        self.conflict.as_ref()
    }

    pub(crate) fn set_conflict(&mut self, conflict: Conflict) {
        self.conflict = Some(conflict);
    }

    fn forget(&mut self, column: &str) {
        self.fields.retain(|(col, _)| *col != column);
        self.adds.retain(|(col, _)| *col != column);
        self.appends.retain(|(col, _)| *col != column);
        self.cleared.retain(|col| *col != column);
    }

    /// Move to `next`, rejecting out-of-order or repeated transitions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless `next` directly follows the
    /// current state.
    pub fn advance(&mut self, next: MutationState) -> Result<()> {
        if self.state.successor() != Some(next) {
            return Err(Error::InvalidState(format!(
                "{} mutation on {} cannot move from {:?} to {:?}",
                self.op, self.entity, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Run the schema's defaults for this operation.
    pub(crate) fn apply_defaults<E: Schema>(&mut self) -> Result<()> {
        match self.op {
            Op::Create => E::create_defaults(self)?,
            Op::UpdateOne | Op::Update => E::update_defaults(self)?,
            Op::DeleteOne | Op::Delete => {}
        }
        self.advance(MutationState::Defaulted)
    }

    /// Verify the mutation against the schema before it is compiled.
    pub(crate) fn check<E: Schema>(&mut self) -> Result<()> {
        self.advance(MutationState::Checked)?;
        tracing::debug!(op = %self.op, entity = self.entity, "checking mutation");

        for column in self.touched() {
            if !self.columns.contains(&column) {
                return Err(Error::validation(format!(
                    "unknown field \"{}.{column}\"",
                    self.entity
                )));
            }
        }

        match self.op {
            Op::Create => self.check_create::<E>()?,
            Op::UpdateOne | Op::Update => self.check_update::<E>()?,
            Op::DeleteOne | Op::Delete => {}
        }

        E::validate(self)
    }

    fn check_create<E: Schema>(&self) -> Result<()> {
        for column in E::required() {
            if !self.field(column).is_some_and(|value| !is_null(value)) {
                return Err(Error::validation(format!(
                    "missing required field \"{}.{column}\"",
                    self.entity
                )));
            }
        }
        for fk in E::foreign_keys().iter().filter(|fk| fk.required) {
            if !self.field(fk.column).is_some_and(|value| !is_null(value)) {
                return Err(Error::validation(format!(
                    "missing required edge \"{}.{}\"",
                    self.entity, fk.edge
                )));
            }
        }
        Ok(())
    }

    fn check_update<E: Schema>(&mut self) -> Result<()> {
        for column in self.touched() {
            if column == "id" || E::immutable().contains(&column) {
                return Err(Error::validation(format!(
                    "immutable field \"{}.{column}\" cannot be changed",
                    self.entity
                )));
            }
        }

        for column in &self.cleared {
            if E::required().contains(column) {
                return Err(Error::validation(format!(
                    "clearing a required field \"{}.{column}\"",
                    self.entity
                )));
            }
        }

        let mut clear = Vec::new();
        for edge in &self.cleared_edges {
            let Some(fk) = E::foreign_keys().iter().find(|fk| fk.edge == *edge) else {
                return Err(Error::validation(format!("unknown edge \"{}.{edge}\"", self.entity)));
            };
            let replaced = self.field(fk.column).is_some_and(|value| !is_null(value));
            if fk.required && !replaced {
                return Err(Error::validation(format!(
                    "clearing a required unique edge \"{}.{edge}\"",
                    self.entity
                )));
            }
            if !replaced {
                clear.push(fk.column);
            }
        }
        for column in clear {
            self.clear_field(column);
        }

        Ok(())
    }

    fn touched(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .map(|(col, _)| *col)
            .chain(self.adds.iter().map(|(col, _)| *col))
            .chain(self.appends.iter().map(|(col, _)| *col))
            .chain(self.cleared.iter().copied())
            .collect()
    }
}

/// Whether `value` is SQL `NULL`.
pub(crate) fn is_null(value: &Value) -> bool {
    value_to_datatype(value.clone()).is_ok_and(|data_type| data_type.is_null())
}
