//! # Strata SQL
//!
//! The persistence boundary consumed by the Strata ORM: driver-level value
//! types, the [`Connection`], [`Driver`] and [`Transaction`] traits, and a
//! lightweight `SQLite` backend ([`SqlDefault`]) for development and tests.

#![forbid(unsafe_code)]

mod driver;
mod json;
pub mod sqlite;
mod types;

pub use crate::driver::*;
pub use crate::json::into_json;
pub use crate::sqlite::{ConnectOptions, SqlDefault};
pub use crate::types::*;
