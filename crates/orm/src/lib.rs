//! Entity-relational mapping and a partial-update protocol over `strata-sql`
//! drivers.
//!
//! Statements are built with ``SeaQuery`` and rendered for the driver's
//! dialect (Postgres, `MySQL` or `SQLite`); every terminal operation runs
//! against a [`Client`].
//!
//! # Quick Start
//!
//! ## Define an Entity
//!
//! ```ignore
//! entity! {
//!     table = "environments",
//!     name = "Environment",
//!     id = ObjectId,
//!     edges = EnvironmentEdges,
//!     pub struct Environment {
//!         pub name: String,
//!         pub project_id: ObjectId,
//!         pub create_time: Option<DateTime<Utc>>,
//!     }
//! }
//!
//! impl Schema for Environment {
//!     fn required() -> &'static [&'static str] {
//!         &["name", "project_id"]
//!     }
//!
//!     fn immutable() -> &'static [&'static str] {
//!         &["name", "project_id"]
//!     }
//! }
//! ```
//!
//! ## CRUD Operations
//!
//! ```ignore
//! let client = Client::new(SqlDefault::connect().await?);
//!
//! // Create
//! let env = Environment::create()
//!     .set("name", "dev")
//!     .set("project_id", project.id)
//!     .save(&client)
//!     .await?;
//!
//! // Query, eager-loading the owning project
//! let envs = Environment::query()
//!     .r#where(Filter::eq("project_id", project.id))
//!     .with(Environment::PROJECT, |q| q)
//!     .order_by_desc(None, "create_time")
//!     .limit(10)
//!     .all(&client)
//!     .await?;
//!
//! // Update
//! env.update_one().set("description", "staging").save(&client).await?;
//!
//! // Delete
//! Environment::delete().r#where(Filter::eq("project_id", project.id)).exec(&client).await?;
//! ```
//!
//! ## Filtering
//!
//! ```ignore
//! Filter::eq("status", "ready")
//! Filter::r#in("id", ids)
//! Filter::or(vec![Filter::is_null("deleted_at"), Filter::gt("replicas", 0)])
//!
//! // Rows having a related row
//! Project::query().has(Project::ENVIRONMENTS)
//! ```
//!
//! ## Upserts
//!
//! Conflicts resolve in the same statement (`ON CONFLICT` / `ON DUPLICATE KEY`):
//!
//! ```ignore
//! Project::create()
//!     .set("name", "default")
//!     .on_conflict(&["name"])
//!     .update(|set| {
//!         set.set_excluded("description").add("revision", 1);
//!     })
//!     .exec(&client)
//!     .await?;
//! ```
//!
//! ## Transactions
//!
//! ```ignore
//! let tx = client.tx().await?;
//! Project::create().set("name", "p1").exec(tx.client()).await?;
//! tx.commit().await?;
//! ```

mod client;
pub mod codec;
mod create;
mod delete;
mod eager;
mod edge;
mod entity;
mod error;
mod filter;
pub mod hook;
mod id;
mod join;
mod mutation;
mod query;
mod schema;
mod select;
mod statement;
mod update;
mod upsert;
pub mod view;

pub use client::{Client, Tx};
pub use codec::{FetchValue, Json};
pub use create::{Create, CreateBulk};
pub use delete::{Delete, DeleteOne};
pub use eager::{Relation, RelationKind, query_edge};
pub use edge::{Edge, ToMany, ToOne};
pub use entity::{Entity, SelectValues};
pub use error::{Error, Must, Result};
pub use filter::{Column, Comparison, Filter, Predicate, SubQuery};
pub use hook::{Hook, Interceptor, Mutator, Querier};
pub use id::{EntityId, ObjectId};
pub use join::{Join, JoinKind};
pub use mutation::{Mutation, MutationState, Op, Outcome};
pub use query::{Lock, OrderBy, Query, QuerySpec, Selection};
pub use schema::{ForeignKey, Schema, SchemaConfig, TimeMixin};
pub use select::{Aggregate, Selector};
pub use statement::Statement;
// Re-export driver types used in rows, parameters and custom codecs.
pub use strata_sql::{DataType, Dialect, Field, Row};
pub use update::{Update, UpdateOne};
pub use upsert::{Upsert, UpsertSet};
pub use view::{Identity, Refer, ValidationCache};

// Re-exports for ``entity`` macro use only. This keeps ``SeaQuery`` value types
// out of the public API.
#[doc(hidden)]
pub mod __private {
    pub use sea_query::Value;
}
