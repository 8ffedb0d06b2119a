use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use sea_query::Query;

use crate::client::Client;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::hook::{Mutator, apply};
use crate::mutation::{Mutation, MutationState, Op, Outcome};
use crate::schema::Schema;
use crate::statement::Statement;

/// Builder deleting every row that matches its predicates.
pub struct Delete<E: Schema> {
    mutation: Mutation,
    _marker: PhantomData<E>,
}

impl<E: Schema> fmt::Debug for Delete<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delete").field("mutation", &self.mutation).finish()
    }
}

impl<E: Schema> Default for Delete<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Schema> Delete<E> {
    /// Creates a new DELETE builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mutation: Mutation::new::<E>(Op::Delete),
            _marker: PhantomData,
        }
    }

    /// Adds a WHERE clause filter.
    #[must_use]
    pub fn r#where(mut self, filter: Filter) -> Self {
        self.mutation.r#where(filter);
        self
    }

    /// Delete the matching rows and return how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Constraint`] when a row is still referenced, or the
    /// driver's error.
    pub async fn exec(self, client: &Client) -> Result<u64> {
        Ok(run::<E>(client, self.mutation).await?.affected())
    }
}

/// Builder deleting one row by id.
pub struct DeleteOne<E: Schema> {
    mutation: Mutation,
    _marker: PhantomData<E>,
}

impl<E: Schema> fmt::Debug for DeleteOne<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeleteOne").field("mutation", &self.mutation).finish()
    }
}

impl<E: Schema> DeleteOne<E> {
    /// Creates a DELETE builder for the row with `id`.
    #[must_use]
    pub fn new(id: E::Id) -> Self {
        let mut mutation = Mutation::new::<E>(Op::DeleteOne);
        mutation.set_id(id.into());
        Self {
            mutation,
            _marker: PhantomData,
        }
    }

    /// Delete the row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no row has the id,
    /// [`Error::Constraint`] when the row is still referenced, or the
    /// driver's error.
    pub async fn exec(self, client: &Client) -> Result<()> {
        match run::<E>(client, self.mutation).await?.affected() {
            0 => Err(Error::not_found(E::NAME)),
            _ => Ok(()),
        }
    }
}

async fn run<E: Schema>(client: &Client, mut mutation: Mutation) -> Result<Outcome> {
    mutation.apply_defaults::<E>()?;

    let base: Arc<dyn Mutator> = Arc::new(|client: Client, mut mutation: Mutation| async move {
        mutation.check::<E>()?;
        mutation.advance(MutationState::Compiled)?;
        let statement = delete_statement::<E>(&client, &mutation)?;

        tracing::debug!(op = %mutation.op(), entity = E::NAME, "executing mutation");
        let affected = client.exec(statement).await?.rows_affected;

        mutation.advance(MutationState::Executed)?;
        mutation.advance(MutationState::Done)?;
        Ok::<_, Error>(Outcome::Affected(affected))
    });

    apply::<E>(client, mutation, base).await
}

pub(crate) fn delete_statement<E: Schema>(client: &Client, mutation: &Mutation) -> Result<Statement> {
    let schema = client.schema_config();
    let mut delete = Query::delete();
    delete.from_table(schema.table_ref(E::TABLE));

    for filter in mutation.predicates().iter().cloned() {
        delete.and_where(filter.into_expr(E::TABLE, schema));
    }
    if let Some(id) = mutation.id() {
        delete.and_where(Filter::eq("id", id.clone()).into_expr(E::TABLE, schema));
    }

    Statement::build(&delete, client.dialect(), E::TABLE)
}
