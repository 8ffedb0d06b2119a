//! # Strata Model
//!
//! The entity schema of a deployment platform built on `strata-orm`, plus the
//! wire-facing views used to create, update, patch, delete and query it.
//!
//! [`schema`] declares the entities, their relations and their constraints.
//! [`view`] holds the camelCase input and output types: inputs resolve their
//! route scope (project, environment) and the rows they name through a
//! request-local [`ValidationCache`](strata_orm::ValidationCache) before they
//! are turned into entities and saved.
//!
//! ```ignore
//! use strata_model::schema::Environment;
//! use strata_model::view::EnvironmentCreateInput;
//! use strata_orm::{Create, Refer};
//!
//! let mut input: EnvironmentCreateInput = serde_json::from_str(body)?;
//! input.project = Some(Refer::new("billing"));
//! input.validate(&client).await?;
//! let env = Create::from_entity(&input.model()).save(&client).await?;
//! ```

pub mod schema;
pub mod view;

pub use self::schema::*;
