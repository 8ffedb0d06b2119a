use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strata_orm::view::{self, Identity, Refer};
use strata_orm::{Client, Entity, Error, Filter, Json, ObjectId, Result, Schema, UpdateOne, ValidationCache};

use super::{ProjectOutput, identity, non_empty, project_route, validated};
use crate::schema::{Environment, Project};

const IMMUTABLE: &[&str] = &["id", "name", "project", "createTime"];

/// Input for creating an environment.
///
/// `project` is bound from the request path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentCreateInput {
    /// The owning project's id or name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// DNS-label name, unique within the project.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Free-form labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(skip)]
    project_id: Option<ObjectId>,
}

impl EnvironmentCreateInput {
    /// Resolve the project route.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the project route is missing or the
    /// name is blank, or [`Error::NotFound`] when the project does not exist.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let project = project_route(client, cache, self.project.as_ref()).await?;
        self.bind(&project)
    }

    /// [`Self::validate_with`] over a fresh cache.
    ///
    /// # Errors
    ///
    /// As [`Self::validate_with`].
    pub async fn validate(&mut self, client: &Client) -> Result<()> {
        self.validate_with(client, &mut ValidationCache::new()).await
    }

    fn bind(&mut self, project: &Project) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("Environment: name is required"));
        }
        self.project_id = Some(project.id);
        Ok(())
    }

    /// The environment to create.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Environment> {
        Ok(Environment {
            name: self.name.clone(),
            description: self.description.clone(),
            labels: Json(self.labels.clone()),
            project_id: *validated(Environment::NAME, self.project_id.as_ref())?,
            ..Environment::default()
        })
    }
}

/// Input for creating several environments of one project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentCreateInputs {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// Environments to create. Their own `project` is ignored.
    pub items: Vec<EnvironmentCreateInput>,
}

impl EnvironmentCreateInputs {
    /// Resolve the project route once and check every item.
    ///
    /// # Errors
    ///
    /// As [`EnvironmentCreateInput::validate_with`], or
    /// [`Error::Validation`] when there are no items or two share a name.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        non_empty(Environment::NAME, &self.items)?;
        let project = project_route(client, cache, self.project.as_ref()).await?;
        let mut seen = BTreeSet::new();
        for item in &mut self.items {
            item.bind(&project)?;
            if !seen.insert(item.name.clone()) {
                return Err(Error::validation(format!(
                    "Environment: duplicate name {:?}",
                    item.name
                )));
            }
        }
        Ok(())
    }

    /// [`Self::validate_with`] over a fresh cache.
    ///
    /// # Errors
    ///
    /// As [`Self::validate_with`].
    pub async fn validate(&mut self, client: &Client) -> Result<()> {
        self.validate_with(client, &mut ValidationCache::new()).await
    }

    /// The environments to create, in item order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Vec<Environment>> {
        self.items.iter().map(EnvironmentCreateInput::model).collect()
    }
}

/// Input naming one environment of a project by id or name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentQueryInput {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// Environment id; takes precedence over `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Environment name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip)]
    target: Option<Environment>,
}

impl EnvironmentQueryInput {
    /// Resolve the project route, then the environment within it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the route is missing or neither id
    /// nor name is given, or [`Error::NotFound`] when nothing matches.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let project = project_route(client, cache, self.project.as_ref()).await?;
        let identity = self.identity()?;
        let env = view::resolve_identity(client, cache, &identity, &["name"], scope(&project)).await?;
        self.target = Some(env);
        Ok(())
    }

    /// [`Self::validate_with`] over a fresh cache.
    ///
    /// # Errors
    ///
    /// As [`Self::validate_with`].
    pub async fn validate(&mut self, client: &Client) -> Result<()> {
        self.validate_with(client, &mut ValidationCache::new()).await
    }

    fn identity(&self) -> Result<Identity<ObjectId>> {
        identity(Environment::NAME, self.id, &[self.name.as_str()])
    }

    /// The resolved environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Environment> {
        validated(Environment::NAME, self.target.as_ref()).cloned()
    }
}

/// Input for deleting one environment.
pub type EnvironmentDeleteInput = EnvironmentQueryInput;

/// Input for deleting several environments of one project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentDeleteInputs {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// Environments to delete.
    pub items: Vec<EnvironmentQueryInput>,
}

impl EnvironmentDeleteInputs {
    /// Resolve the project route, then every item in one query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when there are no items, an item names
    /// nothing, or any item matches no environment of the project.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        non_empty(Environment::NAME, &self.items)?;
        let project = project_route(client, cache, self.project.as_ref()).await?;
        let identities =
            self.items.iter().map(EnvironmentQueryInput::identity).collect::<Result<Vec<_>>>()?;
        let envs = resolve_all(client, cache, &project, &identities).await?;
        for (item, env) in self.items.iter_mut().zip(envs) {
            item.target = Some(env);
        }
        Ok(())
    }

    /// [`Self::validate_with`] over a fresh cache.
    ///
    /// # Errors
    ///
    /// As [`Self::validate_with`].
    pub async fn validate(&mut self, client: &Client) -> Result<()> {
        self.validate_with(client, &mut ValidationCache::new()).await
    }

    /// The resolved environments, in item order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Vec<Environment>> {
        self.items.iter().map(EnvironmentQueryInput::model).collect()
    }
}

/// Input replacing the mutable fields of one environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentUpdateInput {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// Environment id; takes precedence over `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Environment name. Names are immutable, so this only identifies the row.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Replacement description.
    #[serde(default)]
    pub description: String,
    /// Replacement labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(skip)]
    target: Option<Environment>,
}

impl EnvironmentUpdateInput {
    /// Resolve the project route, then the environment within it.
    ///
    /// # Errors
    ///
    /// As [`EnvironmentQueryInput::validate_with`].
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let project = project_route(client, cache, self.project.as_ref()).await?;
        let identity = self.identity()?;
        let env = view::resolve_identity(client, cache, &identity, &["name"], scope(&project)).await?;
        self.target = Some(env);
        Ok(())
    }

    /// [`Self::validate_with`] over a fresh cache.
    ///
    /// # Errors
    ///
    /// As [`Self::validate_with`].
    pub async fn validate(&mut self, client: &Client) -> Result<()> {
        self.validate_with(client, &mut ValidationCache::new()).await
    }

    fn identity(&self) -> Result<Identity<ObjectId>> {
        identity(Environment::NAME, self.id, &[self.name.as_str()])
    }

    /// The environment as it will be after the update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Environment> {
        let mut env = validated(Environment::NAME, self.target.as_ref())?.clone();
        env.description.clone_from(&self.description);
        env.labels = Json(self.labels.clone());
        Ok(env)
    }

    /// An update writing the mutable fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn update(&self) -> Result<UpdateOne<Environment>> {
        self.model().map(|env| update(&env))
    }
}

/// Input updating several environments of one project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentUpdateInputs {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// Environments to update.
    pub items: Vec<EnvironmentUpdateInput>,
}

impl EnvironmentUpdateInputs {
    /// Resolve the project route, then every item in one query.
    ///
    /// # Errors
    ///
    /// As [`EnvironmentDeleteInputs::validate_with`].
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        non_empty(Environment::NAME, &self.items)?;
        let project = project_route(client, cache, self.project.as_ref()).await?;
        let identities =
            self.items.iter().map(EnvironmentUpdateInput::identity).collect::<Result<Vec<_>>>()?;
        let envs = resolve_all(client, cache, &project, &identities).await?;
        for (item, env) in self.items.iter_mut().zip(envs) {
            item.target = Some(env);
        }
        Ok(())
    }

    /// [`Self::validate_with`] over a fresh cache.
    ///
    /// # Errors
    ///
    /// As [`Self::validate_with`].
    pub async fn validate(&mut self, client: &Client) -> Result<()> {
        self.validate_with(client, &mut ValidationCache::new()).await
    }

    /// The environments as they will be after the update, in item order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Vec<Environment>> {
        self.items.iter().map(EnvironmentUpdateInput::model).collect()
    }

    /// One update per item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn update(&self) -> Result<Vec<UpdateOne<Environment>>> {
        self.items.iter().map(EnvironmentUpdateInput::update).collect()
    }
}

/// A partial update of one environment, applied as a JSON merge patch.
///
/// `project` and `refer` (the environment's id or name) are bound from the
/// request path; every other member of the body is merged over the current
/// [`EnvironmentOutput`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentPatchInput {
    /// The owning project's id or name.
    #[serde(skip)]
    pub project: Option<Refer>,
    /// The environment to patch.
    #[serde(skip)]
    pub refer: Refer,
    /// Members of the merge patch.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip)]
    patched: Option<Environment>,
}

impl EnvironmentPatchInput {
    /// Fetch the current environment, merge the patch over it and check that
    /// no immutable field changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the route is missing, an immutable
    /// field changes or the result is malformed, or the lookup's error.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let project = project_route(client, cache, self.project.as_ref()).await?;
        let current: Environment =
            view::resolve(client, cache, &self.refer, "name", scope(&project)).await?;
        let output = EnvironmentOutput::from(&current);
        let merged =
            view::patch(Environment::NAME, &output, &Value::Object(self.fields.clone()), IMMUTABLE)?;

        let mut env = current;
        env.description = merged.description;
        env.labels = Json(merged.labels);
        self.patched = Some(env);
        Ok(())
    }

    /// [`Self::validate_with`] over a fresh cache.
    ///
    /// # Errors
    ///
    /// As [`Self::validate_with`].
    pub async fn validate(&mut self, client: &Client) -> Result<()> {
        self.validate_with(client, &mut ValidationCache::new()).await
    }

    /// The environment with the patch applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Environment> {
        validated(Environment::NAME, self.patched.as_ref()).cloned()
    }

    /// An update writing the patched fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn update(&self) -> Result<UpdateOne<Environment>> {
        self.model().map(|env| update(&env))
    }
}

fn scope(project: &Project) -> Vec<Filter> {
    vec![Filter::eq("project_id", project.id)]
}

async fn resolve_all(
    client: &Client, cache: &mut ValidationCache, project: &Project,
    identities: &[Identity<ObjectId>],
) -> Result<Vec<Environment>> {
    view::resolve_all(
        client,
        cache,
        identities,
        &["name"],
        |env: &Environment| vec![env.name.clone()],
        scope(project),
    )
    .await
}

fn update(env: &Environment) -> UpdateOne<Environment> {
    env.update_one()
        .set("description", env.description.clone())
        .set("labels", env.labels.clone())
}

/// An environment as returned to callers.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentOutput {
    pub id: ObjectId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectOutput>,
}

impl From<&Environment> for EnvironmentOutput {
    fn from(env: &Environment) -> Self {
        Self {
            id: env.id,
            name: env.name.clone(),
            description: env.description.clone(),
            labels: env.labels.0.clone(),
            create_time: env.create_time,
            update_time: env.update_time,
            project: view::expose_edge(&env.edges.project, Some(&env.project_id), |project| {
                ProjectOutput::from(project)
            }),
        }
    }
}
