//! Create builders: single-row, bulk and upsert inserts.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use sea_query::{Alias, Keyword, Query, SimpleExpr, Value};
use strata_sql::Row;

use crate::client::Client;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::hook::{Mutator, chain, entity_hooks};
use crate::id::EntityId;
use crate::mutation::{Mutation, MutationState, Op, Outcome, is_null};
use crate::schema::Schema;
use crate::statement::Statement;
use crate::upsert::{Conflict, Upsert};

/// Builder for inserting one `E`.
///
/// ```ignore
/// let env = Environment::create()
///     .set("name", "dev")
///     .set("project_id", project.id)
///     .save(&client)
///     .await?;
/// ```
pub struct Create<E: Schema> {
    mutation: Mutation,
    _marker: PhantomData<E>,
}

impl<E: Schema> fmt::Debug for Create<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Create").field("mutation", &self.mutation).finish()
    }
}

impl<E: Schema> Default for Create<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Schema> Create<E> {
    /// Creates an empty INSERT builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mutation: Mutation::new::<E>(Op::Create),
            _marker: PhantomData,
        }
    }

    /// Populate every non-null field of `entity`. A zero id is left for the
    /// builder to generate.
    #[must_use]
    pub fn from_entity(entity: &E) -> Self {
        let mut create = Self::new();
        for (column, value) in entity.to_values() {
            if column == "id" && entity.id().is_zero() {
                continue;
            }
            if is_null(&value) {
                continue;
            }
            create.mutation.set_field(column, value);
        }
        create
    }

    /// Sets a column value for the insert.
    #[must_use]
    pub fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.mutation.set_field(column, value);
        self
    }

    /// Sets a column value when `value` is present.
    #[must_use]
    pub fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.set(column, value),
            None => self,
        }
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

    /// Resolve conflicts on `columns` instead of failing.
    #[must_use]
    pub fn on_conflict(self, columns: &[&'static str]) -> Upsert<E> {
        Upsert::new(vec![self], columns)
    }

    /// Insert the row and return it as stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when a required field is missing or a
    /// validator fails, [`Error::Constraint`] on a constraint violation, or
    /// the driver's error.
    pub async fn save(self, client: &Client) -> Result<E> {
        let rows = into_rows::<E>(create_all(client, vec![self], None).await?)?;
        rows.into_iter().next().ok_or_else(|| Error::not_found(E::NAME))
    }

    /// Insert the row.
    ///
    /// # Errors
    ///
    /// As [`Self::save`].
    pub async fn exec(self, client: &Client) -> Result<()> {
        create_all(client, vec![self], None).await?;
        Ok(())
    }

    /// Generate the id if needed and run the schema defaults.
    fn prepare(self) -> Result<Mutation> {
        let mut mutation = self.mutation;
        if !mutation.has_field("id")
            && let Some(id) = E::Id::generate()
        {
            mutation.set_field("id", id);
        }
        mutation.apply_defaults::<E>()?;
        Ok(mutation)
    }
}

/// Builder for inserting many `E` in one statement.
pub struct CreateBulk<E: Schema> {
    builders: Vec<Create<E>>,
}

impl<E: Schema> fmt::Debug for CreateBulk<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateBulk").field("builders", &self.builders.len()).finish()
    }
}

impl<E: Schema> CreateBulk<E> {
    /// Batch `builders`.
    #[must_use]
    pub fn new(builders: impl IntoIterator<Item = Create<E>>) -> Self {
        Self {
            builders: builders.into_iter().collect(),
        }
    }

    /// Resolve conflicts on `columns` instead of failing.
    #[must_use]
    pub fn on_conflict(self, columns: &[&'static str]) -> Upsert<E> {
        Upsert::new(self.builders, columns)
    }

    /// Insert every row and return them as stored.
    ///
    /// Nothing is written unless every builder passes defaulting, checks and
    /// hooks.
    ///
    /// # Errors
    ///
    /// As [`Create::save`], for any builder.
    pub async fn save(self, client: &Client) -> Result<Vec<E>> {
        into_rows::<E>(create_all(client, self.builders, None).await?)
    }

    /// Insert every row.
    ///
    /// # Errors
    ///
    /// As [`Create::save`], for any builder.
    pub async fn exec(self, client: &Client) -> Result<()> {
        create_all(client, self.builders, None).await?;
        Ok(())
    }
}

fn into_rows<E: Entity>(outcome: Outcome) -> Result<Vec<E>> {
    match outcome {
        Outcome::Rows(rows) => rows.iter().map(|row| E::from_row(row, E::columns(), false)).collect(),
        Outcome::Affected(_) => Err(Error::not_found(E::NAME)),
    }
}

/// Run `builders` through the hook chain, issuing one INSERT for all of them.
///
/// Every builder gets its own chain; the base mutator of each one checks its
/// mutation and hands over to the next chain, and the last issues the
/// statement. A failing step anywhere leaves the database untouched.
pub(crate) async fn create_all<E: Schema>(
    client: &Client, builders: Vec<Create<E>>, conflict: Option<Conflict>,
) -> Result<Outcome> {
    let mut mutations = Vec::with_capacity(builders.len());
    for builder in builders {
        let mut mutation = builder.prepare()?;
        if let Some(conflict) = &conflict {
            mutation.set_conflict(conflict.clone());
        }
        mutations.push(mutation);
    }

    let hooks = entity_hooks::<E>(client);

    let collected = Arc::new(Mutex::new(Vec::with_capacity(mutations.len())));
    let mut next: Option<(Arc<dyn Mutator>, Mutation)> = None;
    for mutation in mutations.into_iter().rev() {
        let step = chain(step::<E>(Arc::clone(&collected), next.take()), &hooks);
        next = Some((step, mutation));
    }

    let Some((first, mutation)) = next else {
        return Ok(Outcome::Rows(Vec::new()));
    };
    first.mutate(client.clone(), mutation).await
}

fn step<E: Schema>(
    collected: Arc<Mutex<Vec<Mutation>>>, next: Option<(Arc<dyn Mutator>, Mutation)>,
) -> Arc<dyn Mutator> {
    Arc::new(move |client: Client, mut mutation: Mutation| {
        let collected = Arc::clone(&collected);
        let next = next.clone();
        async move {
            mutation.check::<E>()?;
            collected.lock().push(mutation);
            match next {
                Some((mutator, mutation)) => mutator.mutate(client, mutation).await,
                None => {
                    let batch = std::mem::take(&mut *collected.lock());
                    insert::<E>(&client, batch).await
                }
            }
        }
    })
}

/// Compile and execute one INSERT for `mutations`.
async fn insert<E: Schema>(client: &Client, mut mutations: Vec<Mutation>) -> Result<Outcome> {
    for mutation in &mut mutations {
        mutation.advance(MutationState::Compiled)?;
    }
    let statement = insert_statement::<E>(client, &mutations)?;
    let conflict = mutations.first().and_then(|mutation| mutation.conflict().cloned());

    tracing::debug!(op = %Op::Create, entity = E::NAME, rows = mutations.len(), "executing mutation");

    let outcome = if client.dialect().supports_returning() {
        Outcome::Rows(client.query(statement).await?)
    } else {
        let result = client.exec(statement).await?;
        if conflict.is_some() {
            Outcome::Affected(result.rows_affected)
        } else {
            Outcome::Rows(select_inserted::<E>(client, &mutations, result.last_insert_id).await?)
        }
    };

    for mutation in &mut mutations {
        mutation.advance(MutationState::Executed)?;
        mutation.advance(MutationState::Done)?;
    }
    Ok(outcome)
}

pub(crate) fn insert_statement<E: Schema>(
    client: &Client, mutations: &[Mutation],
) -> Result<Statement> {
    // union of assigned columns, in declaration order
    let columns: Vec<&'static str> = E::columns()
        .iter()
        .copied()
        .filter(|column| mutations.iter().any(|mutation| mutation.has_field(column)))
        .collect();

    let mut insert = Query::insert();
    insert.into_table(client.schema_config().table_ref(E::TABLE));

    if columns.is_empty() {
        insert.or_default_values_many(u32::try_from(mutations.len()).unwrap_or(u32::MAX));
    } else {
        insert.columns(columns.iter().map(|column| Alias::new(*column)));
        for mutation in mutations {
            let row = columns.iter().map(|column| {
                mutation
                    .field(column)
                    .map_or(SimpleExpr::Keyword(Keyword::Null), |value| value.clone().into())
            });
            insert.values(row)?;
        }
    }

    if let Some(conflict) = mutations.first().and_then(Mutation::conflict) {
        insert.on_conflict(conflict.clause::<E>(&columns));
    }

    if client.dialect().supports_returning() {
        insert.returning(Query::returning().columns(E::columns().iter().map(|c| Alias::new(*c))));
    }

    Statement::build(&insert, client.dialect(), E::TABLE)
}

/// Read back rows inserted on a dialect without `RETURNING`.
async fn select_inserted<E: Schema>(
    client: &Client, mutations: &[Mutation], last_insert_id: Option<i64>,
) -> Result<Vec<Row>> {
    let explicit = mutations.iter().map(|mutation| mutation.field("id").cloned()).collect();
    let ids = inserted_ids(E::NAME, explicit, last_insert_id)?;
    let statement = E::query().r#where(Filter::r#in("id", ids)).statement(client)?;
    client.query(statement).await
}

/// Ids of a batch in insert order. Rows without an explicit id were numbered
/// by the database consecutively from `last_insert_id`, the first id it
/// generated for the batch.
fn inserted_ids(
    entity: &str, explicit: Vec<Option<Value>>, last_insert_id: Option<i64>,
) -> Result<Vec<Value>> {
    let mut next = None;
    explicit
        .into_iter()
        .map(|id| -> Result<Value> {
            if let Some(id) = id {
                return Ok(id);
            }
            let generated = match next {
                Some(generated) => generated,
                None => last_insert_id
                    .ok_or_else(|| Error::Codec(format!("no insert id reported for {entity}")))?,
            };
            next = Some(generated + 1);
            Ok(Value::from(generated))
        })
        .collect()
}
