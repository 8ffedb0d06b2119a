//! Relations between entities and batched eager loading.

use std::collections::HashMap;
use std::fmt;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::client::Client;
use crate::edge::{Edge, ToMany, ToOne};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::filter::{Filter, SubQuery};
use crate::query::Query;
use crate::schema::Schema;

/// A named relation from `P` (parent) to `C` (child).
///
/// Relations are declared as constants on the parent entity:
///
/// ```ignore
/// impl Project {
///     pub const ENVIRONMENTS: Relation<Self, Environment> = Relation {
///         name: "environments",
///         kind: RelationKind::HasMany {
///             column: "project_id",
///             key: |env| Some(env.project_id),
///             edge: |project| &mut project.edges.environments,
///         },
///     };
/// }
/// ```
pub struct Relation<P: Schema, C: Schema> {
    /// Edge name, used in logs and errors.
    pub name: &'static str,
    /// Shape of the relation.
    pub kind: RelationKind<P, C>,
}

/// How a relation is stored.
pub enum RelationKind<P: Schema, C: Schema> {
    /// The child table holds the parent's id in `column`.
    HasMany {
        /// Foreign-key column on the child table.
        column: &'static str,
        /// Reads the foreign key from a child.
        key: fn(&C) -> Option<P::Id>,
        /// The parent's edge slot.
        edge: fn(&mut P) -> &mut ToMany<C>,
    },
    /// As `HasMany`, with at most one child per parent.
    HasOne {
        /// Foreign-key column on the child table.
        column: &'static str,
        /// Reads the foreign key from a child.
        key: fn(&C) -> Option<P::Id>,
        /// The parent's edge slot.
        edge: fn(&mut P) -> &mut ToOne<C>,
    },
    /// The parent table holds the child's id in `column`.
    BelongsTo {
        /// Foreign-key column on the parent table.
        column: &'static str,
        /// Reads the foreign key from a parent.
        key: fn(&P) -> Option<C::Id>,
        /// The parent's edge slot.
        edge: fn(&mut P) -> &mut ToOne<C>,
    },
}

impl<P: Schema, C: Schema> Clone for Relation<P, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Schema, C: Schema> Copy for Relation<P, C> {}

impl<P: Schema, C: Schema> Clone for RelationKind<P, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Schema, C: Schema> Copy for RelationKind<P, C> {}

impl<P: Schema, C: Schema> fmt::Debug for Relation<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation").field("from", &P::NAME).field("to", &C::NAME).field("name", &self.name).finish()
    }
}

impl<P: Schema, C: Schema> Relation<P, C> {
    /// Predicate on the parent table: at least one child matches `filters`.
    pub(crate) fn predicate(&self, mut filters: Vec<Filter>) -> Filter {
        let (column, sub) = match self.kind {
            RelationKind::HasMany { column, .. } | RelationKind::HasOne { column, .. } => {
                filters.insert(0, Filter::table_is_not_null(C::TABLE, column));
                ("id", SubQuery {
                    table: C::TABLE,
                    column,
                    filters,
                })
            }
            RelationKind::BelongsTo { column, .. } => (column, SubQuery {
                table: C::TABLE,
                column: "id",
                filters,
            }),
        };
        Filter::in_query(column, sub)
    }
}

/// Builds the query for the children of `parent` over `relation`.
///
/// A belongs-to relation with no foreign key set yields a query matching
/// nothing.
#[must_use]
pub fn query_edge<P: Schema, C: Schema>(parent: &P, relation: Relation<P, C>) -> Query<C> {
    let filter = match relation.kind {
        RelationKind::HasMany { column, .. } | RelationKind::HasOne { column, .. } => {
            Filter::eq(column, parent.id().clone())
        }
        RelationKind::BelongsTo { key, .. } => {
            key(parent).map_or_else(|| Filter::or(Vec::new()), |id| Filter::eq("id", id))
        }
    };
    C::query().r#where(filter).unique(true)
}

/// A pending eager load on parents of type `P`.
pub(crate) trait EagerLoad<P>: Send {
    fn load<'a>(self: Box<Self>, client: &'a Client, parents: &'a mut [P])
    -> BoxFuture<'a, Result<()>>;

    /// Identifies the edge and its nested query for memoization.
    fn cache_key(&self, client: &Client) -> Result<String>;
}

pub(crate) struct WithEdge<P: Schema, C: Schema> {
    relation: Relation<P, C>,
    query: Query<C>,
}

impl<P: Schema, C: Schema> WithEdge<P, C> {
    pub(crate) const fn new(relation: Relation<P, C>, query: Query<C>) -> Self {
        Self { relation, query }
    }
}

impl<P: Schema, C: Schema> EagerLoad<P> for WithEdge<P, C> {
    fn cache_key(&self, client: &Client) -> Result<String> {
        Ok(format!("{}({})", self.relation.name, self.query.cache_key(client)?))
    }

    fn load<'a>(
        self: Box<Self>, client: &'a Client, parents: &'a mut [P],
    ) -> BoxFuture<'a, Result<()>> {
        let Self { relation, query } = *self;
        async move {
            match relation.kind {
                RelationKind::HasMany { column, key, edge } => {
                    let children = load_children(client, &relation, query, column, parents).await?;
                    for parent in parents.iter_mut() {
                        *edge(parent) = Edge::Loaded(Vec::new());
                    }
                    let index = index_by(parents, |parent| Some(parent.id().clone()));
                    for child in children {
                        for &pos in lookup(&index, key(&child), relation.name)? {
                            if let Edge::Loaded(loaded) = edge(&mut parents[pos]) {
                                loaded.push(child.clone());
                            }
                        }
                    }
                }
                RelationKind::HasOne { column, key, edge } => {
                    let children = load_children(client, &relation, query, column, parents).await?;
                    for parent in parents.iter_mut() {
                        *edge(parent) = Edge::Loaded(None);
                    }
                    let index = index_by(parents, |parent| Some(parent.id().clone()));
                    for child in children {
                        for &pos in lookup(&index, key(&child), relation.name)? {
                            *edge(&mut parents[pos]) = Edge::Loaded(Some(Box::new(child.clone())));
                        }
                    }
                }
                RelationKind::BelongsTo { key, edge, .. } => {
                    for parent in parents.iter_mut() {
                        *edge(parent) = Edge::Loaded(None);
                    }
                    let index = index_by(parents, key);
                    if index.is_empty() {
                        return Ok(());
                    }
                    tracing::debug!(edge = relation.name, keys = index.len(), "eager loading edge");

                    let ids: Vec<C::Id> = index.keys().cloned().collect();
                    let children = query.r#where(Filter::r#in("id", ids)).all(client).await?;
                    for child in children {
                        for &pos in lookup(&index, Some(child.id().clone()), relation.name)? {
                            *edge(&mut parents[pos]) = Edge::Loaded(Some(Box::new(child.clone())));
                        }
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }
}

/// One batched query for the children of every parent.
async fn load_children<P: Schema, C: Schema>(
    client: &Client, relation: &Relation<P, C>, mut query: Query<C>, column: &'static str,
    parents: &[P],
) -> Result<Vec<C>> {
    let ids = index_by(parents, |parent| Some(parent.id().clone()));
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    tracing::debug!(edge = relation.name, keys = ids.len(), "eager loading edge");

    if !query.spec.columns.contains(&column) {
        query.spec.columns.push(column);
    }
    let keys: Vec<P::Id> = ids.into_keys().collect();
    query.r#where(Filter::r#in(column, keys)).all(client).await
}

/// Positions of `items` grouped by the key `key` extracts.
fn index_by<T, K, F>(items: &[T], key: F) -> HashMap<K, Vec<usize>>
where
    K: std::hash::Hash + Eq,
    F: Fn(&T) -> Option<K>,
{
    let mut index: HashMap<K, Vec<usize>> = HashMap::new();
    for (pos, item) in items.iter().enumerate() {
        if let Some(k) = key(item) {
            index.entry(k).or_default().push(pos);
        }
    }
    index
}

fn lookup<'i, K>(index: &'i HashMap<K, Vec<usize>>, key: Option<K>, edge: &str) -> Result<&'i [usize]>
where
    K: std::hash::Hash + Eq + fmt::Display,
{
    let Some(key) = key else {
        return Err(Error::Integrity(format!("{edge} row without a foreign key")));
    };
    index
        .get(&key)
        .map(Vec::as_slice)
        .ok_or_else(|| Error::Integrity(format!("unexpected foreign-key \"{key}\" returned for {edge}")))
}
