//! Update builders, predicate-scoped and by id.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use sea_query::{Alias, Expr, Func, Keyword, Query, SimpleExpr, Value};
use strata_sql::{Dialect, Row};

use crate::client::Client;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::hook::{Mutator, apply};
use crate::mutation::{Mutation, MutationState, Op, Outcome};
use crate::schema::Schema;
use crate::statement::Statement;

// Setters shared by both update builders.
macro_rules! update_setters {
    () => {
        /// Sets a column to a new value.
        #[must_use]
        pub fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
            self.mutation.set_field(column, value);
            self
        }

        /// Sets a column when `value` is present.
        #[must_use]
        pub fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
            match value {
                Some(value) => self.set(column, value),
                None => self,
            }
        }

        /// Adds `delta` to a numeric column; `NULL` counts as zero.
        #[must_use]
        pub fn add(mut self, column: &'static str, delta: impl Into<Value>) -> Self {
            self.mutation.add_field(column, delta);
            self
        }

        /// Appends `items` to a JSON array column in the database.
        #[must_use]
        pub fn append(
            mut self, column: &'static str, items: impl IntoIterator<Item = serde_json::Value>,
        ) -> Self {
            self.mutation.append_field(column, items.into_iter().collect());
            self
        }

        /// Sets a column to `NULL`.
        #[must_use]
        pub fn clear(mut self, column: &'static str) -> Self {
            self.mutation.clear_field(column);
            self
        }

        /// Clears the to-one edge `edge`. Clearing a required edge fails unless
        /// its foreign key is set in the same update.
        #[must_use]
        pub fn clear_edge(mut self, edge: &'static str) -> Self {
            self.mutation.clear_edge(edge);
            self
        }

        /// The pending mutation.
        #[must_use]
        pub const fn mutation(&self) -> &Mutation {
            &self.mutation
        }

        /// Mutable access to the pending mutation.
        pub const fn mutation_mut(&mut self) -> &mut Mutation {
            &mut self.mutation
        }
    };
}

/// Builder updating every row that matches its predicates.
pub struct Update<E: Schema> {
    mutation: Mutation,
    _marker: PhantomData<E>,
}

impl<E: Schema> fmt::Debug for Update<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update").field("mutation", &self.mutation).finish()
    }
}

impl<E: Schema> Default for Update<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Schema> Update<E> {
    /// Creates a new UPDATE builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mutation: Mutation::new::<E>(Op::Update),
            _marker: PhantomData,
        }
    }

    update_setters!();

    /// Adds a WHERE clause filter.
    #[must_use]
    pub fn r#where(mut self, filter: Filter) -> Self {
        self.mutation.r#where(filter);
        self
    }

    /// Run the update and return the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when a check fails, [`Error::Constraint`]
    /// on a constraint violation, or the driver's error.
    pub async fn exec(self, client: &Client) -> Result<u64> {
        let mut mutation = self.mutation;
        mutation.apply_defaults::<E>()?;

        let base: Arc<dyn Mutator> = Arc::new(|client: Client, mut mutation: Mutation| async move {
            mutation.check::<E>()?;
            mutation.advance(MutationState::Compiled)?;
            let affected = match update_statement::<E>(&client, &mutation, false)? {
                Some(statement) => {
                    tracing::debug!(op = %mutation.op(), entity = E::NAME, "executing mutation");
                    client.exec(statement).await?.rows_affected
                }
                None => 0,
            };
            mutation.advance(MutationState::Executed)?;
            mutation.advance(MutationState::Done)?;
            Ok::<_, Error>(Outcome::Affected(affected))
        });

        Ok(apply::<E>(client, mutation, base).await?.affected())
    }
}

/// Builder updating one row by id.
///
/// ```ignore
/// let service = service
///     .update_one()
///     .set("description", "billing")
///     .add("replicas", 1)
///     .save(&client)
///     .await?;
/// ```
pub struct UpdateOne<E: Schema> {
    mutation: Mutation,
    _marker: PhantomData<E>,
}

impl<E: Schema> fmt::Debug for UpdateOne<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateOne").field("mutation", &self.mutation).finish()
    }
}

impl<E: Schema> UpdateOne<E> {
    /// Creates an UPDATE builder for the row with `id`.
    #[must_use]
    pub fn new(id: E::Id) -> Self {
        let mut mutation = Mutation::new::<E>(Op::UpdateOne);
        mutation.set_id(id.into());
        Self {
            mutation,
            _marker: PhantomData,
        }
    }

    update_setters!();

    /// Run the update and return the row as stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no row has the id,
    /// [`Error::Validation`] when a check fails, [`Error::Constraint`] on a
    /// constraint violation, or the driver's error.
    pub async fn save(self, client: &Client) -> Result<E> {
        let mut mutation = self.mutation;
        mutation.apply_defaults::<E>()?;

        let base: Arc<dyn Mutator> = Arc::new(|client: Client, mut mutation: Mutation| async move {
            mutation.check::<E>()?;
            mutation.advance(MutationState::Compiled)?;
            let returning = client.dialect().supports_returning();
            let rows = match update_statement::<E>(&client, &mutation, returning)? {
                Some(statement) if returning => {
                    tracing::debug!(op = %mutation.op(), entity = E::NAME, "executing mutation");
                    client.query(statement).await?
                }
                Some(statement) => {
                    tracing::debug!(op = %mutation.op(), entity = E::NAME, "executing mutation");
                    client.exec(statement).await?;
                    select_one::<E>(&client, &mutation).await?
                }
                None => select_one::<E>(&client, &mutation).await?,
            };
            mutation.advance(MutationState::Executed)?;
            mutation.advance(MutationState::Done)?;
            Ok::<_, Error>(Outcome::Rows(rows))
        });

        match apply::<E>(client, mutation, base).await? {
            Outcome::Rows(rows) => {
                let row = rows.first().ok_or_else(|| Error::not_found(E::NAME))?;
                E::from_row(row, E::columns(), false)
            }
            Outcome::Affected(_) => Err(Error::not_found(E::NAME)),
        }
    }

    /// Run the update.
    ///
    /// # Errors
    ///
    /// As [`Self::save`].
    pub async fn exec(self, client: &Client) -> Result<()> {
        self.save(client).await.map(|_| ())
    }
}

fn target(mutation: &Mutation) -> Vec<Filter> {
    let mut filters = mutation.predicates().to_vec();
    if let Some(id) = mutation.id() {
        filters.push(Filter::eq("id", id.clone()));
    }
    filters
}

async fn select_one<E: Schema>(client: &Client, mutation: &Mutation) -> Result<Vec<Row>> {
    let mut query = E::query();
    for filter in target(mutation) {
        query = query.r#where(filter);
    }
    client.query(query.limit(1).statement(client)?).await
}

/// Compile the UPDATE for `mutation`, or `None` when it changes nothing.
pub(crate) fn update_statement<E: Schema>(
    client: &Client, mutation: &Mutation, returning: bool,
) -> Result<Option<Statement>> {
    let dialect = client.dialect();
    let mut assignments: Vec<(&'static str, SimpleExpr)> = Vec::new();

    for (column, value) in mutation.fields() {
        assignments.push((*column, value.clone().into()));
    }
    for (column, delta) in mutation.added_fields() {
        let current = Func::coalesce([Expr::col(Alias::new(*column)).into(), Expr::val(0).into()]);
        assignments.push((*column, SimpleExpr::from(current).add(delta.clone())));
    }
    for (column, items) in mutation.appended_fields() {
        assignments.push((*column, append_expr(dialect, *column, items)));
    }
    for column in mutation.cleared_fields() {
        assignments.push((*column, SimpleExpr::Keyword(Keyword::Null)));
    }
    if assignments.is_empty() {
        return Ok(None);
    }

    let schema = client.schema_config();
    let mut update = Query::update();
    update.table(schema.table_ref(E::TABLE));
    for (column, expr) in assignments {
        update.value(Alias::new(column), expr);
    }
    for filter in target(mutation) {
        update.and_where(filter.into_expr(E::TABLE, schema));
    }
    if returning {
        update.returning(Query::returning().columns(E::columns().iter().map(|c| Alias::new(*c))));
    }

    Statement::build(&update, dialect, E::TABLE).map(Some)
}

/// JSON array append evaluated by the database.
fn append_expr(dialect: Dialect, column: &'static str, items: &[serde_json::Value]) -> SimpleExpr {
    let current: SimpleExpr = Expr::col(Alias::new(column)).into();
    match dialect {
        Dialect::Postgres => Expr::cust_with_exprs("COALESCE($1, '[]'::jsonb) || $2::jsonb", [
            current,
            Expr::val(json_array(items)).into(),
        ]),
        Dialect::MySql => Expr::cust_with_exprs(
            "JSON_MERGE_PRESERVE(COALESCE(?, JSON_ARRAY()), CAST(? AS JSON))",
            [current, Expr::val(json_array(items)).into()],
        ),
        Dialect::Sqlite => {
            items.iter().fold(Expr::cust_with_exprs("coalesce(?, '[]')", [current]), |expr, item| {
                Expr::cust_with_exprs("json_insert(?, '$[#]', json(?))", [
                    expr,
                    Expr::val(item.to_string()).into(),
                ])
            })
        }
    }
}

fn json_array(items: &[serde_json::Value]) -> String {
    serde_json::Value::Array(items.to_vec()).to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn append_per_dialect() {
        let render = |dialect: Dialect| {
            let expr = append_expr(dialect, "steps", &[json!("a"), json!({"b": 1})]);
            let mut update = Query::update();
            update.table(Alias::new("services")).value(Alias::new("steps"), expr);
            Statement::build(&update, dialect, "services").unwrap()
        };

        let pg = render(Dialect::Postgres);
        assert_eq!(
            pg.sql,
            r#"UPDATE "services" SET "steps" = COALESCE("steps", '[]'::jsonb) || $1::jsonb"#
        );
        assert_eq!(pg.params, vec![strata_sql::DataType::Str(Some(r#"["a",{"b":1}]"#.to_string()))]);

        let mysql = render(Dialect::MySql);
        assert_eq!(
            mysql.sql,
            "UPDATE `services` SET `steps` = JSON_MERGE_PRESERVE(COALESCE(`steps`, JSON_ARRAY()), CAST(? AS JSON))"
        );

        let sqlite = render(Dialect::Sqlite);
        assert_eq!(
            sqlite.sql,
            r#"UPDATE "services" SET "steps" = json_insert(json_insert(coalesce("steps", '[]'), '$[#]', json(?)), '$[#]', json(?))"#
        );
        assert_eq!(sqlite.params.len(), 2);
    }
}
