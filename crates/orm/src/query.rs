//! Query builder for loading entities.

use std::fmt;
use std::sync::Arc;

use sea_query::{Alias, Asterisk, Expr, Func, LockType, Order};
use strata_sql::{Dialect, Row};

use crate::client::Client;
use crate::codec::decode;
use crate::eager::{EagerLoad, Relation, WithEdge};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::filter::{Filter, table_column};
use crate::hook::{Querier, chain_queriers};
use crate::join::Join;
use crate::schema::{Schema, SchemaConfig};
use crate::select::{Aggregate, Selector};
use crate::statement::Statement;

/// Row-lock mode for `SELECT` statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lock {
    /// `FOR UPDATE`
    Update,
    /// `FOR SHARE`
    Share,
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    /// Table qualifier; `None` is the queried table.
    pub table: Option<&'static str>,
    /// Column ordered by.
    pub column: &'static str,
    /// Descending when set.
    pub descending: bool,
}

/// A column of another (joined) table selected under an alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Source table.
    pub table: &'static str,
    /// Source column.
    pub column: &'static str,
    /// Name the value is reported under.
    pub alias: &'static str,
}

/// Everything a query has accumulated, in a form interceptors can inspect
/// and rewrite.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Table queried.
    pub table: &'static str,
    /// Entity name.
    pub entity: &'static str,
    /// Columns of `table` projected.
    pub columns: Vec<&'static str>,
    /// Extra aliased columns; rows then carry dynamic values.
    pub selections: Vec<Selection>,
    /// Aggregate expressions.
    pub aggregates: Vec<Aggregate>,
    /// `GROUP BY` columns.
    pub group_by: Vec<&'static str>,
    /// Predicates, AND-combined.
    pub filters: Vec<Filter>,
    /// Joined tables.
    pub joins: Vec<Join>,
    /// Ordering.
    pub order: Vec<OrderBy>,
    /// `LIMIT`
    pub limit: Option<u64>,
    /// `OFFSET`
    pub offset: Option<u64>,
    /// `DISTINCT`; unset means no de-duplication.
    pub unique: Option<bool>,
    /// Row lock.
    pub lock: Option<Lock>,
    /// Compile to a row count instead of a projection.
    pub count: bool,
}

impl QuerySpec {
    fn new<E: Entity>() -> Self {
        Self {
            table: E::TABLE,
            entity: E::NAME,
            columns: E::columns().to_vec(),
            selections: Vec::new(),
            aggregates: Vec::new(),
            group_by: Vec::new(),
            filters: Vec::new(),
            joins: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            unique: None,
            lock: None,
            count: false,
        }
    }

    /// Add a predicate.
    pub fn r#where(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// Column names the compiled statement returns, in order.
    #[must_use]
    pub fn requested(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .copied()
            .chain(self.selections.iter().map(|selection| selection.alias))
            .chain(self.aggregates.iter().map(Aggregate::name))
            .collect()
    }

    /// Compile into a statement for `dialect`.
    ///
    /// Row locks are omitted on dialects without them, and Postgres drops
    /// `DISTINCT` under a lock since it rejects the combination.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if a bound value has no driver representation.
    pub fn statement(&self, dialect: Dialect, schema: &SchemaConfig) -> Result<Statement> {
        let mut select = sea_query::Query::select();
        let unique = self.unique.unwrap_or(false);

        if self.count {
            let id = Expr::col(table_column(self.table, "id"));
            let count =
                if unique { Func::count_distinct(id) } else { Func::count(Expr::col(Asterisk)) };
            select.expr_as(count, Alias::new("count"));
        } else {
            for column in &self.columns {
                select.column(table_column(self.table, column));
            }
            for Selection {
                table,
                column,
                alias,
            } in &self.selections
            {
                select.expr_as(Expr::col(table_column(table, column)), Alias::new(*alias));
            }
            for aggregate in &self.aggregates {
                select.expr_as(aggregate.expr(self.table), Alias::new(aggregate.name()));
            }
        }

        select.from(schema.table_ref(self.table));

        for join in self.joins.iter().cloned() {
            join.apply(&mut select, self.table, schema);
        }

        for filter in self.filters.iter().cloned() {
            select.and_where(filter.into_expr(self.table, schema));
        }

        for column in &self.group_by {
            select.group_by_col(table_column(self.table, column));
        }

        if !self.count {
            for OrderBy {
                table,
                column,
                descending,
            } in &self.order
            {
                let order = if *descending { Order::Desc } else { Order::Asc };
                select.order_by(table_column(table.unwrap_or(self.table), column), order);
            }
            if let Some(limit) = self.limit {
                select.limit(limit);
            }
            if let Some(offset) = self.offset {
                select.offset(offset);
            }
        }

        let locked = self.lock.is_some() && dialect.supports_row_locks();
        if let Some(lock) = self.lock.filter(|_| locked) {
            select.lock(match lock {
                Lock::Update => LockType::Update,
                Lock::Share => LockType::Share,
            });
        }

        if unique && !self.count && !(locked && dialect == Dialect::Postgres) {
            select.distinct();
        }

        Statement::build(&select, dialect, self.table)
    }
}

/// Fluent builder for loading entities of type `E`.
///
/// ```ignore
/// let envs = Environment::query()
///     .r#where(Filter::eq("project_id", project.id))
///     .order_by(None, "name")
///     .with(Environment::PROJECT, |q| q)
///     .all(&client)
///     .await?;
/// ```
pub struct Query<E: Schema> {
    pub(crate) spec: QuerySpec,
    eager: Vec<Box<dyn EagerLoad<E>>>,
}

impl<E: Schema> fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("spec", &self.spec).field("eager", &self.eager.len()).finish()
    }
}

impl<E: Schema> Default for Query<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Schema> Query<E> {
    /// Creates a query over every column of `E`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: QuerySpec::new::<E>(),
            eager: Vec::new(),
        }
    }

    /// Adds a WHERE clause filter.
    #[must_use]
    pub fn r#where(mut self, filter: Filter) -> Self {
        self.spec.filters.push(filter);
        self
    }

    /// Sets the maximum number of rows to return.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.spec.limit = Some(limit);
        self
    }

    /// Sets the number of rows to skip.
    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.spec.offset = Some(offset);
        self
    }

    /// Adds ascending ORDER BY clause.
    #[must_use]
    pub fn order_by(mut self, table: Option<&'static str>, column: &'static str) -> Self {
        self.spec.order.push(OrderBy {
            table,
            column,
            descending: false,
        });
        self
    }

    /// Adds descending ORDER BY clause.
    #[must_use]
    pub fn order_by_desc(mut self, table: Option<&'static str>, column: &'static str) -> Self {
        self.spec.order.push(OrderBy {
            table,
            column,
            descending: true,
        });
        self
    }

    /// Toggles `SELECT DISTINCT`.
    #[must_use]
    pub const fn unique(mut self, unique: bool) -> Self {
        self.spec.unique = Some(unique);
        self
    }

    /// Restricts the projection to `columns`; the id is always loaded.
    #[must_use]
    pub fn fields(mut self, columns: &[&'static str]) -> Self {
        self.spec.columns = std::iter::once("id")
            .chain(columns.iter().copied().filter(|column| *column != "id"))
            .collect();
        self
    }

    /// Locks the selected rows `FOR UPDATE` until the transaction ends.
    #[must_use]
    pub const fn for_update(mut self) -> Self {
        self.spec.lock = Some(Lock::Update);
        self
    }

    /// Locks the selected rows `FOR SHARE` until the transaction ends.
    #[must_use]
    pub const fn for_share(mut self) -> Self {
        self.spec.lock = Some(Lock::Share);
        self
    }

    /// Adds a JOIN clause to the query.
    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.spec.joins.push(join);
        self
    }

    /// Also selects `table.column AS alias`; read it back with
    /// [`Entity::value`].
    #[must_use]
    pub fn append_select(
        mut self, table: &'static str, column: &'static str, alias: &'static str,
    ) -> Self {
        self.spec.selections.push(Selection {
            table,
            column,
            alias,
        });
        self
    }

    /// Keeps rows having at least one related row over `relation`.
    #[must_use]
    pub fn has<C: Schema>(self, relation: Relation<E, C>) -> Self {
        self.has_with(relation, |query| query)
    }

    /// Keeps rows having at least one related row matching `f`'s predicates.
    #[must_use]
    pub fn has_with<C: Schema>(
        mut self, relation: Relation<E, C>, f: impl FnOnce(Query<C>) -> Query<C>,
    ) -> Self {
        let related = f(C::query());
        self.spec.filters.push(relation.predicate(related.spec.filters));
        self
    }

    /// Eager-loads `relation`, configuring the related query with `f`.
    #[must_use]
    pub fn with<C: Schema>(
        mut self, relation: Relation<E, C>, f: impl FnOnce(Query<C>) -> Query<C>,
    ) -> Self {
        self.eager.push(Box::new(WithEdge::new(relation, f(C::query()))));
        self
    }

    /// Switches to a projection for scanning into custom types.
    #[must_use]
    pub fn select(mut self, columns: &[&'static str]) -> Selector<E> {
        self.spec.columns = columns.to_vec();
        Selector::new(self.spec)
    }

    /// Groups by `columns` for aggregation.
    #[must_use]
    pub fn group_by(mut self, columns: &[&'static str]) -> Selector<E> {
        self.spec.columns = columns.to_vec();
        self.spec.group_by = columns.to_vec();
        Selector::new(self.spec)
    }

    /// The accumulated specification.
    #[must_use]
    pub const fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Compile for `client`'s dialect and schema configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if a bound value has no driver representation.
    pub fn statement(&self, client: &Client) -> Result<Statement> {
        self.spec.statement(client.dialect(), client.schema_config())
    }

    /// Memoization key: the compiled statement followed by every eager load,
    /// so the same rows with different edges requested never share a key.
    pub(crate) fn cache_key(&self, client: &Client) -> Result<String> {
        let mut key = self.statement(client)?.cache_key();
        for load in &self.eager {
            key.push_str(" WITH ");
            key.push_str(&load.cache_key(client)?);
        }
        Ok(key)
    }

    /// Compile for `dialect` with unqualified tables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if a bound value has no driver representation.
    pub fn build(&self, dialect: Dialect) -> Result<Statement> {
        self.spec.statement(dialect, &SchemaConfig::default())
    }

    /// Every matching entity, with requested edges loaded.
    ///
    /// # Errors
    ///
    /// Returns the driver's error, or [`Error::Codec`] if rows cannot be
    /// decoded.
    pub async fn all(self, client: &Client) -> Result<Vec<E>> {
        let Self { spec, eager } = self;
        let requested = spec.requested();
        let dynamic = !spec.selections.is_empty() || !spec.aggregates.is_empty();

        let rows = run(client, spec).await?;
        let mut entities = rows
            .iter()
            .map(|row| E::from_row(row, &requested, dynamic))
            .collect::<Result<Vec<_>>>()?;

        for load in eager {
            load.load(client, &mut entities).await?;
        }
        Ok(entities)
    }

    /// The first matching entity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when nothing matches.
    pub async fn first(mut self, client: &Client) -> Result<E> {
        self.spec.limit = Some(1);
        self.all(client).await?.into_iter().next().ok_or_else(|| Error::not_found(E::NAME))
    }

    /// The id of the first matching entity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when nothing matches.
    pub async fn first_id(mut self, client: &Client) -> Result<E::Id> {
        self.spec.limit = Some(1);
        self.ids(client).await?.into_iter().next().ok_or_else(|| Error::not_found(E::NAME))
    }

    /// The single matching entity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when nothing matches and
    /// [`Error::NotSingular`] when more than one row does.
    pub async fn only(mut self, client: &Client) -> Result<E> {
        self.spec.limit = Some(2);
        let mut entities = self.all(client).await?;
        match entities.len() {
            0 => Err(Error::not_found(E::NAME)),
            1 => Ok(entities.swap_remove(0)),
            _ => Err(Error::NotSingular {
                entity: E::NAME.to_string(),
            }),
        }
    }

    /// The id of the single matching entity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when nothing matches and
    /// [`Error::NotSingular`] when more than one row does.
    pub async fn only_id(mut self, client: &Client) -> Result<E::Id> {
        self.spec.limit = Some(2);
        let mut ids = self.ids(client).await?;
        match ids.len() {
            0 => Err(Error::not_found(E::NAME)),
            1 => Ok(ids.swap_remove(0)),
            _ => Err(Error::NotSingular {
                entity: E::NAME.to_string(),
            }),
        }
    }

    /// Ids of every matching entity.
    ///
    /// # Errors
    ///
    /// Returns the driver's error, or [`Error::Codec`] if an id cannot be
    /// decoded.
    pub async fn ids(self, client: &Client) -> Result<Vec<E::Id>> {
        let mut spec = self.spec;
        spec.columns = vec!["id"];
        spec.selections.clear();
        spec.aggregates.clear();

        let rows = run(client, spec).await?;
        rows.iter().map(first_value).collect()
    }

    /// Number of matching rows.
    ///
    /// # Errors
    ///
    /// Returns the driver's error, or [`Error::Codec`] if the count cannot be
    /// decoded.
    pub async fn count(self, client: &Client) -> Result<u64> {
        let mut spec = self.spec;
        spec.count = true;

        let rows = run(client, spec).await?;
        let count: i64 = rows
            .first()
            .map(first_value::<i64>)
            .ok_or_else(|| Error::Codec("count query returned no rows".to_string()))??;
        u64::try_from(count).map_err(|e| Error::Codec(e.to_string()))
    }

    /// Whether anything matches.
    ///
    /// # Errors
    ///
    /// Returns any error other than [`Error::NotFound`].
    pub async fn exist(self, client: &Client) -> Result<bool> {
        match self.first_id(client).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Run `spec` through the client's interceptors.
pub(crate) async fn run(client: &Client, spec: QuerySpec) -> Result<Vec<Row>> {
    let base: Arc<dyn Querier> = Arc::new(|client: Client, spec: QuerySpec| async move {
        let statement = spec.statement(client.dialect(), client.schema_config())?;
        client.query(statement).await
    });
    chain_queriers(base, client.interceptors()).query(client.clone(), spec).await
}

pub(crate) fn first_value<T: crate::codec::FetchValue + Default>(row: &Row) -> Result<T> {
    let field = row.fields.first().ok_or_else(|| Error::Codec("empty row".to_string()))?;
    decode(&field.value).map_err(|e| Error::Codec(format!("{}: {e}", field.name)))
}
