use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strata_orm::view::{self, Refer};
use strata_orm::{Client, Entity, Error, Json, ObjectId, Result, Schema, UpdateOne, ValidationCache};

use super::{EnvironmentOutput, identity, non_empty, validated};
use crate::schema::Project;

const IMMUTABLE: &[&str] = &["id", "name", "createTime"];

/// Input for creating a project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCreateInput {
    /// DNS-label name, unique across projects.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Free-form labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ProjectCreateInput {
    /// Check the input. Projects are global, so nothing is resolved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the name is blank.
    #[allow(clippy::unused_async)]
    pub async fn validate_with(&mut self, _client: &Client, _cache: &mut ValidationCache) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("Project: name is required"));
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

    /// The project to create.
    ///
    /// # Errors
    ///
    /// Infallible for projects; fallible for symmetry with scoped inputs.
    pub fn model(&self) -> Result<Project> {
        Ok(Project {
            name: self.name.clone(),
            description: self.description.clone(),
            labels: Json(self.labels.clone()),
            ..Project::default()
        })
    }
}

/// Input for creating several projects at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCreateInputs {
    /// Projects to create.
    pub items: Vec<ProjectCreateInput>,
}

impl ProjectCreateInputs {
    /// Check every item and reject duplicate names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when there are no items, an item is
    /// invalid, or two items share a name.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        non_empty(Project::NAME, &self.items)?;
        let mut seen = BTreeSet::new();
        for item in &mut self.items {
            item.validate_with(client, cache).await?;
            if !seen.insert(item.name.clone()) {
                return Err(Error::validation(format!("Project: duplicate name {:?}", item.name)));
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

    /// The projects to create, in item order.
    ///
    /// # Errors
    ///
    /// As [`ProjectCreateInput::model`].
    pub fn model(&self) -> Result<Vec<Project>> {
        self.items.iter().map(ProjectCreateInput::model).collect()
    }
}

/// Input naming one project by id or name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectQueryInput {
    /// Project id; takes precedence over `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Project name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip)]
    target: Option<Project>,
}

impl ProjectQueryInput {
    /// Resolve the project.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when neither id nor name is given, or
    /// [`Error::NotFound`] when no project matches.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let identity = identity(Project::NAME, self.id, &[self.name.as_str()])?;
        let project = view::resolve_identity(client, cache, &identity, &["name"], Vec::new()).await?;
        self.target = Some(project);
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

    /// The resolved project.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Project> {
        validated(Project::NAME, self.target.as_ref()).cloned()
    }
}

/// Input for deleting one project.
pub type ProjectDeleteInput = ProjectQueryInput;

/// Input for deleting several projects at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDeleteInputs {
    /// Projects to delete.
    pub items: Vec<ProjectQueryInput>,
    #[serde(skip)]
    targets: Option<Vec<Project>>,
}

impl ProjectDeleteInputs {
    /// Resolve every item in one query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when there are no items, an item names
    /// nothing, or any item matches no project.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        non_empty(Project::NAME, &self.items)?;
        let identities = self
            .items
            .iter()
            .map(|item| identity(Project::NAME, item.id, &[item.name.as_str()]))
            .collect::<Result<Vec<_>>>()?;
        let projects = view::resolve_all(
            client,
            cache,
            &identities,
            &["name"],
            |project: &Project| vec![project.name.clone()],
            Vec::new(),
        )
        .await?;
        self.targets = Some(projects);
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

    /// The resolved projects, in item order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Vec<Project>> {
        validated(Project::NAME, self.targets.as_ref()).cloned()
    }

    /// Ids of the resolved projects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn ids(&self) -> Result<Vec<ObjectId>> {
        Ok(self.model()?.iter().map(|project| project.id).collect())
    }
}

/// Input replacing the mutable fields of one project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdateInput {
    /// Project id; takes precedence over `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Project name. Names are immutable, so this only identifies the row.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Replacement description.
    #[serde(default)]
    pub description: String,
    /// Replacement labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(skip)]
    target: Option<Project>,
}

impl ProjectUpdateInput {
    /// Resolve the project to update.
    ///
    /// # Errors
    ///
    /// As [`ProjectQueryInput::validate_with`].
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let identity = identity(Project::NAME, self.id, &[self.name.as_str()])?;
        let project = view::resolve_identity(client, cache, &identity, &["name"], Vec::new()).await?;
        self.target = Some(project);
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

    /// The project as it will be after the update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Project> {
        let mut project = validated(Project::NAME, self.target.as_ref())?.clone();
        project.description.clone_from(&self.description);
        project.labels = Json(self.labels.clone());
        Ok(project)
    }

    /// An update writing the mutable fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn update(&self) -> Result<UpdateOne<Project>> {
        self.model().map(|project| update(&project))
    }
}

/// Input updating several projects at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdateInputs {
    /// Projects to update.
    pub items: Vec<ProjectUpdateInput>,
}

impl ProjectUpdateInputs {
    /// Resolve every item in one query.
    ///
    /// # Errors
    ///
    /// As [`ProjectDeleteInputs::validate_with`].
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        non_empty(Project::NAME, &self.items)?;
        let identities = self
            .items
            .iter()
            .map(|item| identity(Project::NAME, item.id, &[item.name.as_str()]))
            .collect::<Result<Vec<_>>>()?;
        let projects = view::resolve_all(
            client,
            cache,
            &identities,
            &["name"],
            |project: &Project| vec![project.name.clone()],
            Vec::new(),
        )
        .await?;
        for (item, project) in self.items.iter_mut().zip(projects) {
            item.target = Some(project);
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

    /// The projects as they will be after the update, in item order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Vec<Project>> {
        self.items.iter().map(ProjectUpdateInput::model).collect()
    }

    /// One update per item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn update(&self) -> Result<Vec<UpdateOne<Project>>> {
        self.items.iter().map(ProjectUpdateInput::update).collect()
    }
}

/// A partial update of one project, applied as a JSON merge patch.
///
/// `refer` (id or name) is bound from the request path; every other member of
/// the body is merged over the current [`ProjectOutput`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectPatchInput {
    /// The project to patch, bound from the request path.
    #[serde(skip)]
    pub refer: Refer,
    /// Members of the merge patch.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip)]
    patched: Option<Project>,
}

impl ProjectPatchInput {
    /// Fetch the current project, merge the patch over it and check that no
    /// immutable field changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when an immutable field changes or the
    /// result is malformed, or the lookup's error.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let current: Project = view::resolve(client, cache, &self.refer, "name", Vec::new()).await?;
        let output = ProjectOutput::from(&current);
        let merged = view::patch(Project::NAME, &output, &Value::Object(self.fields.clone()), IMMUTABLE)?;

        let mut project = current;
        project.description = merged.description;
        project.labels = Json(merged.labels);
        self.patched = Some(project);
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

    /// The project with the patch applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Project> {
        validated(Project::NAME, self.patched.as_ref()).cloned()
    }

    /// An update writing the patched fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn update(&self) -> Result<UpdateOne<Project>> {
        self.model().map(|project| update(&project))
    }
}

fn update(project: &Project) -> UpdateOne<Project> {
    project
        .update_one()
        .set("description", project.description.clone())
        .set("labels", project.labels.clone())
}

/// A project as returned to callers.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectOutput {
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
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<EnvironmentOutput>,
}

impl From<&Project> for ProjectOutput {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id,
            name: project.name.clone(),
            description: project.description.clone(),
            labels: project.labels.0.clone(),
            create_time: project.create_time,
            update_time: project.update_time,
            environments: view::expose_edges(&project.edges.environments, |env| EnvironmentOutput::from(env)),
        }
    }
}

/// Outputs for a page of projects.
#[must_use]
pub fn expose_projects(projects: &[Project]) -> Vec<ProjectOutput> {
    projects.iter().map(ProjectOutput::from).collect()
}

impl From<ObjectId> for ProjectQueryInput {
    fn from(id: ObjectId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }
}
