//! Wire-facing inputs and outputs.
//!
//! Inputs are deserialized from camelCase JSON. Fields documented as bound
//! from the request path (`project`, `environment` and the target of a patch)
//! are filled in by the HTTP layer before validation.
//!
//! Every input follows the same protocol: `validate_with` resolves the route
//! scope, then the rows the input names, memoizing lookups in the supplied
//! [`ValidationCache`]; `model` then produces the entity to persist. `validate`
//! is `validate_with` over a fresh cache.

mod connector;
mod environment;
mod project;
mod service;
mod template;
mod variable;

use strata_orm::view::{self, Identity, Refer};
use strata_orm::{Client, Error, Filter, ObjectId, Result, ValidationCache};
use tracing::debug;

pub use self::connector::*;
pub use self::environment::*;
pub use self::project::*;
pub use self::service::*;
pub use self::template::*;
pub use self::variable::*;
use crate::schema::{Environment, Project};

/// Resolve the project route a request is made under.
pub(crate) async fn project_route(
    client: &Client, cache: &mut ValidationCache, project: Option<&Refer>,
) -> Result<Project> {
    let refer = view::require_route("Project", project)?;
    debug!(project = refer.as_str(), "resolving project route");
    view::resolve(client, cache, refer, "name", Vec::new()).await
}

/// Resolve the environment route a request is made under, within `project`.
pub(crate) async fn environment_route(
    client: &Client, cache: &mut ValidationCache, project: &Project, environment: Option<&Refer>,
) -> Result<Environment> {
    let refer = view::require_route("Environment", environment)?;
    debug!(project = %project.id, environment = refer.as_str(), "resolving environment route");
    view::resolve(client, cache, refer, "name", vec![Filter::eq("project_id", project.id)]).await
}

/// Resolve optional project and environment scopes.
///
/// An environment scope is only meaningful under a project.
pub(crate) async fn optional_scope(
    client: &Client, cache: &mut ValidationCache, project: Option<&Refer>,
    environment: Option<&Refer>,
) -> Result<(Option<Project>, Option<Environment>)> {
    let project = view::resolve_scope::<Project>(client, cache, project, "name").await?;
    let environment = match (&project, environment.filter(|refer| !refer.is_blank())) {
        (_, None) => None,
        (None, Some(_)) => {
            return Err(Error::validation("must be queried under the Project route"));
        }
        (Some(project), Some(refer)) => Some(
            view::resolve(client, cache, refer, "name", vec![Filter::eq("project_id", project.id)])
                .await?,
        ),
    };
    Ok((project, environment))
}

/// Filters restricting a query to a scope, where `None` means global.
pub(crate) fn scope_filters(
    project: Option<&Project>, environment: Option<&Environment>,
) -> Vec<Filter> {
    vec![
        project.map_or_else(|| Filter::is_null("project_id"), |p| Filter::eq("project_id", p.id)),
        environment
            .map_or_else(|| Filter::is_null("environment_id"), |e| Filter::eq("environment_id", e.id)),
    ]
}

/// How an input names its row: by id, or else by its human-readable key.
pub(crate) fn identity(
    entity: &str, id: Option<ObjectId>, key: &[&str],
) -> Result<Identity<ObjectId>> {
    if let Some(id) = id.filter(|id| !id.is_nil()) {
        return Ok(Identity::Id(id));
    }
    if !key.is_empty() && key.iter().all(|part| !part.trim().is_empty()) {
        return Ok(Identity::Key(key.iter().map(|part| (*part).to_string()).collect()));
    }
    Err(Error::validation(format!("{entity}: id or name is required")))
}

/// Reject a bulk input without items.
pub(crate) fn non_empty<T>(entity: &str, items: &[T]) -> Result<()> {
    if items.is_empty() {
        return Err(Error::validation(format!("{entity}: items are required")));
    }
    Ok(())
}

/// The value `validate_with` stored, failing if validation has not run.
pub(crate) fn validated<'a, T>(entity: &str, value: Option<&'a T>) -> Result<&'a T> {
    value.ok_or_else(|| Error::InvalidState(format!("{entity} input has not been validated")))
}
