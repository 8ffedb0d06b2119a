//! Building blocks for wire-facing input and output types.
//!
//! Inputs name the rows they touch with [`Refer`]s (an id or a human-readable
//! key) and resolve them through a request-local [`ValidationCache`], so one
//! validation pass never issues the same lookup twice. Patches are applied as
//! JSON merge patches over the current row.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::Client;
use crate::edge::{Edge, ToMany, ToOne};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::id::EntityId;
use crate::query::Query;
use crate::schema::Schema;

/// Memoizes lookups for the duration of one validation pass.
///
/// Entries are keyed by the compiled statement and its arguments, so two
/// inputs referring to the same row share one query.
#[derive(Default)]
pub struct ValidationCache {
    entries: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl fmt::Debug for ValidationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationCache").field("entries", &self.entries.len()).finish()
    }
}

impl ValidationCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of memoized lookups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been looked up yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let hit = self.entries.get(key)?.downcast_ref::<T>().cloned();
        if hit.is_some() {
            tracing::debug!(key, "validation cache hit");
        }
        hit
    }

    fn put<T: Send + Sync + 'static>(&mut self, key: String, value: T) {
        self.entries.insert(key, Box::new(value));
    }

    /// [`Query::only`], memoized.
    ///
    /// # Errors
    ///
    /// As [`Query::only`]. Failures are not memoized.
    pub async fn only<E: Schema>(&mut self, client: &Client, query: Query<E>) -> Result<E> {
        let query = query.limit(2);
        let key = query.cache_key(client)?;
        if let Some(entity) = self.get::<E>(&key) {
            return Ok(entity);
        }
        let entity = query.only(client).await?;
        self.put(key, entity.clone());
        Ok(entity)
    }

    /// [`Query::all`], memoized.
    ///
    /// # Errors
    ///
    /// As [`Query::all`].
    pub async fn all<E: Schema>(&mut self, client: &Client, query: Query<E>) -> Result<Vec<E>> {
        let key = query.cache_key(client)?;
        if let Some(entities) = self.get::<Vec<E>>(&key) {
            return Ok(entities);
        }
        let entities = query.all(client).await?;
        self.put(key, entities.clone());
        Ok(entities)
    }

    /// [`Query::ids`], memoized.
    ///
    /// # Errors
    ///
    /// As [`Query::ids`].
    pub async fn ids<E: Schema>(&mut self, client: &Client, query: Query<E>) -> Result<Vec<E::Id>> {
        let mut spec = query.spec().clone();
        spec.columns = vec!["id"];
        spec.selections.clear();
        spec.aggregates.clear();
        let key = spec.statement(client.dialect(), client.schema_config())?.cache_key();
        if let Some(ids) = self.get::<Vec<E::Id>>(&key) {
            return Ok(ids);
        }
        let ids = query.ids(client).await?;
        self.put(key, ids.clone());
        Ok(ids)
    }
}

/// A reference to a row by id or by name, as received on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Refer(String);

impl Refer {
    /// Wrap a raw reference.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Whether nothing was supplied.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// The reference parsed as an id, if it is one.
    #[must_use]
    pub fn id<I: EntityId>(&self) -> Option<I> {
        I::parse(self.0.trim())
    }

    /// The raw reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A predicate matching the referenced row: by id when the reference
    /// parses as one, by `name_column` otherwise.
    #[must_use]
    pub fn filter<I: EntityId>(&self, name_column: &'static str) -> Filter {
        self.id::<I>().map_or_else(
            || Filter::eq(name_column, self.0.trim().to_string()),
            |id| Filter::eq("id", id),
        )
    }
}

impl fmt::Display for Refer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Refer {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Refer {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Require a route reference, e.g. the project a service is queried under.
///
/// # Errors
///
/// Returns [`Error::Validation`] when the reference is missing or blank.
pub fn require_route<'r>(route: &str, refer: Option<&'r Refer>) -> Result<&'r Refer> {
    refer
        .filter(|refer| !refer.is_blank())
        .ok_or_else(|| Error::validation(format!("must be queried under the {route} route")))
}

/// Resolve `refer` to the row it names within `scope`.
///
/// # Errors
///
/// Returns [`Error::BlankResourceRefer`] for a blank reference,
/// [`Error::NotFound`] when nothing matches, or the driver's error.
pub async fn resolve<E: Schema>(
    client: &Client, cache: &mut ValidationCache, refer: &Refer, name_column: &'static str,
    scope: Vec<Filter>,
) -> Result<E> {
    if refer.is_blank() {
        return Err(Error::BlankResourceRefer {
            entity: E::NAME.to_string(),
        });
    }
    let query = scope.into_iter().fold(E::query(), Query::r#where);
    cache.only(client, query.r#where(refer.filter::<E::Id>(name_column))).await
}

/// Resolve an optional scope reference: absent or blank means "not scoped".
///
/// # Errors
///
/// Returns [`Error::NotFound`] when a supplied reference matches nothing, or
/// the driver's error.
pub async fn resolve_scope<E: Schema>(
    client: &Client, cache: &mut ValidationCache, refer: Option<&Refer>,
    name_column: &'static str,
) -> Result<Option<E>> {
    let Some(refer) = refer else {
        return Ok(None);
    };
    match resolve(client, cache, refer, name_column, Vec::new()).await {
        Ok(entity) => Ok(Some(entity)),
        Err(err) if err.is_blank_resource_refer() => Ok(None),
        Err(err) => Err(err),
    }
}

/// How one item of a bulk input identifies its row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity<I> {
    /// The primary key.
    Id(I),
    /// Values of the entity's human-readable key columns, in order.
    Key(Vec<String>),
}

impl<I: fmt::Display> fmt::Display for Identity<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Key(values) => f.write_str(&values.join("/")),
        }
    }
}

/// Resolve a single item identified by id or by its key columns.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when nothing matches, [`Error::Validation`]
/// for a key of the wrong arity, or the driver's error.
pub async fn resolve_identity<E: Schema>(
    client: &Client, cache: &mut ValidationCache, identity: &Identity<E::Id>,
    key_columns: &[&'static str], scope: Vec<Filter>,
) -> Result<E> {
    let filter = match identity {
        Identity::Id(id) => Filter::eq("id", id.clone()),
        Identity::Key(values) if values.len() == key_columns.len() => Filter::and(
            key_columns
                .iter()
                .zip(values)
                .map(|(column, value)| Filter::eq(*column, value.clone()))
                .collect(),
        ),
        Identity::Key(values) => {
            return Err(Error::validation(format!(
                "{} key {values:?} does not match columns {key_columns:?}",
                E::NAME
            )));
        }
    };
    let query = scope.into_iter().fold(E::query(), Query::r#where);
    cache.only(client, query.r#where(filter)).await
}

/// Resolve every item of a bulk input in one query, returning the rows in
/// item order.
///
/// Items matching the same row each receive a copy of it.
///
/// # Errors
///
/// Returns [`Error::Validation`] when any item matches no row or carries a
/// key of the wrong arity, and [`Error::NotSingular`] when an item's key
/// matches more than one row; nothing is returned for the other items.
pub async fn resolve_all<E: Schema>(
    client: &Client, cache: &mut ValidationCache, items: &[Identity<E::Id>],
    key_columns: &[&'static str], key_of: impl Fn(&E) -> Vec<String>, scope: Vec<Filter>,
) -> Result<Vec<E>> {
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let mut ids = Vec::new();
    let mut keys = Vec::new();
    for item in items {
        match item {
            Identity::Id(id) => ids.push(id.clone()),
            Identity::Key(values) if values.len() == key_columns.len() => {
                let matches = key_columns
                    .iter()
                    .zip(values)
                    .map(|(column, value)| Filter::eq(*column, value.clone()))
                    .collect();
                keys.push(Filter::and(matches));
            }
            Identity::Key(values) => {
                return Err(Error::validation(format!(
                    "{} key {values:?} does not match columns {key_columns:?}",
                    E::NAME
                )));
            }
        }
    }

    let mut any = keys;
    if !ids.is_empty() {
        any.insert(0, Filter::r#in("id", ids));
    }
    let query = scope.into_iter().fold(E::query(), Query::r#where).r#where(Filter::or(any));
    let rows = cache.all(client, query).await?;

    let by_id: HashMap<&E::Id, &E> = rows.iter().map(|row| (row.id(), row)).collect();
    // `None` marks a key shared by several rows
    let mut by_key: HashMap<Vec<String>, Option<&E>> = HashMap::new();
    for row in &rows {
        by_key.entry(key_of(row)).and_modify(|slot| *slot = None).or_insert(Some(row));
    }

    let mut resolved = Vec::with_capacity(items.len());
    let mut missing = Vec::new();
    for item in items {
        let found = match item {
            Identity::Id(id) => by_id.get(id).copied(),
            Identity::Key(values) => match by_key.get(values) {
                Some(Some(row)) => Some(*row),
                Some(None) => {
                    return Err(Error::NotSingular {
                        entity: E::NAME.to_string(),
                    });
                }
                None => None,
            },
        };
        match found {
            Some(row) => resolved.push(row.clone()),
            None => missing.push(item.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(Error::validation(format!(
            "cannot resolve {} items: {}",
            E::NAME,
            missing.join(", ")
        )));
    }
    Ok(resolved)
}

/// Apply an RFC 7396 JSON merge patch to `target`.
///
/// Object members of `patch` are merged recursively, `null` members remove the
/// key, and any other value replaces the target wholesale.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(members) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    let Value::Object(object) = target else {
        return;
    };
    for (key, value) in members {
        if value.is_null() {
            object.remove(key);
        } else {
            merge_patch(object.entry(key.clone()).or_insert(Value::Null), value);
        }
    }
}

/// Merge `patch` over `current`, rejecting changes to `immutable` fields.
///
/// Fields are compared on their serialized JSON form, so a value that differs
/// only in formatting or precision still counts as a change.
///
/// # Errors
///
/// Returns [`Error::Validation`] when an immutable field changes or the merged
/// document is not a valid `T`.
pub fn patch<T>(entity: &str, current: &T, patch: &Value, immutable: &[&str]) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let before = serde_json::to_value(current).map_err(|e| Error::Codec(e.to_string()))?;
    let mut after = before.clone();
    merge_patch(&mut after, patch);
    check_immutable(entity, &before, &after, immutable)?;
    serde_json::from_value(after).map_err(|e| Error::validation(format!("invalid patch: {e}")))
}

/// Fail when any of `fields` differs between the two JSON documents.
///
/// # Errors
///
/// Returns [`Error::Validation`] naming the first changed field.
pub fn check_immutable(entity: &str, before: &Value, after: &Value, fields: &[&str]) -> Result<()> {
    for field in fields {
        if before.get(field) != after.get(field) {
            return Err(Error::validation(format!(
                "immutable field \"{entity}.{field}\" cannot be changed"
            )));
        }
    }
    Ok(())
}

/// Output for a to-one edge: the loaded entity, or a stub holding only the id
/// when the edge was not loaded but its foreign key is set.
pub fn expose_edge<T, O>(
    edge: &ToOne<T>, foreign_key: Option<&T::Id>, expose: impl FnOnce(&T) -> O,
) -> Option<O>
where
    T: Entity,
{
    match edge {
        Edge::Loaded(Some(entity)) => Some(expose(entity)),
        Edge::Loaded(None) => None,
        Edge::Unloaded => foreign_key
            .filter(|id| !id.is_zero())
            .map(|id| expose(&T::from_id(id.clone()))),
    }
}

/// Outputs for a to-many edge; empty when not loaded.
pub fn expose_edges<T, O>(edge: &ToMany<T>, expose: impl FnMut(&T) -> O) -> Vec<O> {
    edge.loaded().map(|entities| entities.iter().map(expose).collect()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::id::ObjectId;

    #[test]
    fn merge_patch_rfc7396() {
        let mut doc = json!({"a": "b", "c": {"d": "e", "f": "g"}});
        merge_patch(&mut doc, &json!({"a": "z", "c": {"f": null}}));
        assert_eq!(doc, json!({"a": "z", "c": {"d": "e"}}));

        let mut doc = json!({"a": [1, 2]});
        merge_patch(&mut doc, &json!({"a": [3], "b": {"c": null}}));
        assert_eq!(doc, json!({"a": [3], "b": {}}));

        let mut doc = json!({"a": "b"});
        merge_patch(&mut doc, &json!(["c"]));
        assert_eq!(doc, json!(["c"]));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Doc {
        name: String,
        description: String,
        create_time: String,
    }

    #[test]
    fn patch_rejects_immutable_changes() {
        let current = Doc {
            name: "dev".to_string(),
            description: String::new(),
            create_time: "2024-05-01T10:00:00Z".to_string(),
        };
        let immutable = ["name", "createTime"];

        let patched =
            patch("Environment", &current, &json!({"description": "x"}), &immutable).unwrap();
        assert_eq!(patched.description, "x");

        let err = patch("Environment", &current, &json!({"name": "prod"}), &immutable).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"validation failed: immutable field "Environment.name" cannot be changed"#
        );

        let err = patch(
            "Environment",
            &current,
            &json!({"createTime": "2024-05-01T10:00:00.000Z"}),
            &immutable,
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn refer_resolution_forms() {
        assert!(Refer::new("  ").is_blank());
        let id = ObjectId::new();
        let by_id = Refer::new(id.to_string());
        assert_eq!(by_id.id::<ObjectId>(), Some(id));
        assert!(by_id.filter::<ObjectId>("name").is_eq_on("id"));
        assert!(Refer::new("dev").filter::<ObjectId>("name").is_eq_on("name"));

        let err = require_route("Project", None).unwrap_err();
        assert_eq!(err.to_string(), "validation failed: must be queried under the Project route");
    }
}
