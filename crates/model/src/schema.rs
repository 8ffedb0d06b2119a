//! Entity declarations and their constraints.
//!
//! Every entity carries an `ObjectId` primary key except [`ClusterCost`],
//! which uses an auto-increment integer. Structured attributes are stored as
//! JSON text columns through [`Json`].

mod connector;
mod cost;
mod environment;
mod project;
mod resource;
mod service;
mod template;
mod variable;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_orm::{Error, Json, Mutation, Result};

pub use self::connector::*;
pub use self::cost::*;
pub use self::environment::*;
pub use self::project::*;
pub use self::resource::*;
pub use self::service::*;
pub use self::template::*;
pub use self::variable::*;

/// Free-form string labels.
pub type Labels = Json<BTreeMap<String, String>>;

/// Observed state of a provisioned object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Condensed state, e.g. `Ready` or `Deploying`.
    #[serde(default)]
    pub summary: String,

    /// The last transition failed.
    #[serde(default)]
    pub error: bool,

    /// A transition is in progress.
    #[serde(default)]
    pub transitioning: bool,

    /// Detail accompanying the summary.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Reject a `column` value that is not an RFC 1123 DNS label.
pub(crate) fn dns_label(mutation: &Mutation, column: &str) -> Result<()> {
    let Some(value) = mutation.text(column) else {
        return Ok(());
    };
    if is_dns_label(value) {
        return Ok(());
    }
    Err(Error::validation(format!(
        "{}.{column} {value:?} is not a valid DNS label",
        mutation.entity()
    )))
}

fn is_dns_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() <= 63
        && bytes.first().is_some_and(u8::is_ascii_lowercase)
        && bytes.last().is_some_and(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        && bytes.iter().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

/// Set `create_time` to now when absent, for entities without `update_time`.
pub(crate) fn create_time(mutation: &mut Mutation) {
    if !mutation.has_field("create_time") {
        mutation.set_field("create_time", chrono::Utc::now());
    }
}
