//! Mutation hooks and query interceptors.
//!
//! A hook wraps a [`Mutator`] and returns another one, so hooks compose into
//! a chain around the base mutator that talks to the database. The first
//! hook in a chain is the outermost:
//!
//! ```ignore
//! let audit = hook::hook(|next, client, mutation| async move {
//!     tracing::info!(op = %mutation.op(), entity = mutation.entity(), "mutating");
//!     next.mutate(client, mutation).await
//! });
//! client.use_hook(hook::on(audit, &[Op::Create, Op::UpdateOne]));
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use strata_sql::Row;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::mutation::{Mutation, Op, Outcome};
use crate::query::QuerySpec;
use crate::schema::Schema;

/// Applies a mutation.
pub trait Mutator: Send + Sync {
    /// Apply `mutation` using `client`.
    fn mutate(&self, client: Client, mutation: Mutation) -> BoxFuture<'static, Result<Outcome>>;
}

impl<F, Fut> Mutator for F
where
    F: Fn(Client, Mutation) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Outcome>> + Send + 'static,
{
    fn mutate(&self, client: Client, mutation: Mutation) -> BoxFuture<'static, Result<Outcome>> {
        self(client, mutation).boxed()
    }
}

/// Wraps a mutator with additional behavior.
pub type Hook = Arc<dyn Fn(Arc<dyn Mutator>) -> Arc<dyn Mutator> + Send + Sync>;

/// Build a hook from an async function receiving the next mutator in the
/// chain. The function may change the mutation, call `next`, or return
/// without calling it.
pub fn hook<F, Fut>(f: F) -> Hook
where
    F: Fn(Arc<dyn Mutator>, Client, Mutation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Outcome>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |next: Arc<dyn Mutator>| {
        let f = Arc::clone(&f);
        Arc::new(move |client: Client, mutation: Mutation| f(Arc::clone(&next), client, mutation))
            as Arc<dyn Mutator>
    })
}

/// Restrict `hook` to the listed operations.
#[must_use]
pub fn on(hook: Hook, ops: &[Op]) -> Hook {
    let ops = ops.to_vec();
    Arc::new(move |next: Arc<dyn Mutator>| {
        let hooked = hook(Arc::clone(&next));
        let ops = ops.clone();
        Arc::new(move |client: Client, mutation: Mutation| {
            if ops.contains(&mutation.op()) {
                hooked.mutate(client, mutation)
            } else {
                next.mutate(client, mutation)
            }
        }) as Arc<dyn Mutator>
    })
}

/// A hook rejecting the listed operations.
#[must_use]
pub fn reject(ops: &[Op]) -> Hook {
    let rejected = hook(|_next, _client, mutation: Mutation| async move {
        Err(Error::validation(format!(
            "{} operation is not allowed on {}",
            mutation.op(),
            mutation.entity()
        )))
    });
    on(rejected, ops)
}

/// Wrap `base` with `hooks`, the first hook outermost.
pub(crate) fn chain(base: Arc<dyn Mutator>, hooks: &[Hook]) -> Arc<dyn Mutator> {
    hooks.iter().rev().fold(base, |next, hook| hook(next))
}

/// Hooks applying to mutations of `E`, outermost first: client-wide, then
/// client registrations for `E`, then the schema's own.
pub(crate) fn entity_hooks<E: Schema>(client: &Client) -> Vec<Hook> {
    let mut hooks = client.hooks_for(E::NAME);
    hooks.extend(E::hooks());
    hooks
}

/// Run `mutation` through `E`'s hooks around `base`.
pub(crate) async fn apply<E: Schema>(
    client: &Client, mutation: Mutation, base: Arc<dyn Mutator>,
) -> Result<Outcome> {
    chain(base, &entity_hooks::<E>(client)).mutate(client.clone(), mutation).await
}

/// Executes a compiled query specification.
pub trait Querier: Send + Sync {
    /// Run `spec` using `client`.
    fn query(&self, client: Client, spec: QuerySpec) -> BoxFuture<'static, Result<Vec<Row>>>;
}

impl<F, Fut> Querier for F
where
    F: Fn(Client, QuerySpec) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Row>>> + Send + 'static,
{
    fn query(&self, client: Client, spec: QuerySpec) -> BoxFuture<'static, Result<Vec<Row>>> {
        self(client, spec).boxed()
    }
}

/// Wraps a querier, typically to add predicates or serve rows without
/// touching the database.
pub type Interceptor = Arc<dyn Fn(Arc<dyn Querier>) -> Arc<dyn Querier> + Send + Sync>;

/// Build an interceptor from an async function receiving the next querier.
pub fn intercept<F, Fut>(f: F) -> Interceptor
where
    F: Fn(Arc<dyn Querier>, Client, QuerySpec) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Row>>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |next: Arc<dyn Querier>| {
        let f = Arc::clone(&f);
        Arc::new(move |client: Client, spec: QuerySpec| f(Arc::clone(&next), client, spec))
            as Arc<dyn Querier>
    })
}

/// An interceptor that rewrites matching query specifications.
#[must_use]
pub fn traverse<F>(table: &'static str, f: F) -> Interceptor
where
    F: Fn(&mut QuerySpec) + Send + Sync + 'static,
{
    let f = Arc::new(f);
    intercept(move |next, client, mut spec| {
        if spec.table == table {
            f(&mut spec);
        }
        next.query(client, spec)
    })
}

pub(crate) fn chain_queriers(
    base: Arc<dyn Querier>, interceptors: &[Interceptor],
) -> Arc<dyn Querier> {
    interceptors.iter().rev().fold(base, |next, interceptor| interceptor(next))
}
