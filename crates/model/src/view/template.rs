use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strata_orm::view::{self, Identity, Refer};
use strata_orm::{Client, Entity, Error, Filter, Json, ObjectId, Result, Schema, UpdateOne, ValidationCache};

use super::{ProjectOutput, non_empty, validated};
use crate::schema::{Project, TemplateVersion};

const IMMUTABLE: &[&str] = &["id", "name", "version", "project", "createTime"];

/// Input for publishing a template version.
///
/// `project` is bound from the request path; without it the version is
/// global.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVersionCreateInput {
    /// The owning project's id or name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// Template name.
    pub name: String,
    /// Version label, unique per name.
    pub version: String,
    /// Where the template is fetched from.
    pub source: String,
    /// Input schema of the template.
    #[serde(default)]
    pub schema: Value,
    #[serde(skip)]
    scope: Option<Option<ObjectId>>,
}

impl TemplateVersionCreateInput {
    /// Resolve the optional project scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the key is incomplete, or
    /// [`Error::NotFound`] when a given project does not exist.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let project = project_scope(client, cache, self.project.as_ref()).await?;
        self.bind(project.as_ref())
    }

    /// [`Self::validate_with`] over a fresh cache.
    ///
    /// # Errors
    ///
    /// As [`Self::validate_with`].
    pub async fn validate(&mut self, client: &Client) -> Result<()> {
        self.validate_with(client, &mut ValidationCache::new()).await
    }

    fn bind(&mut self, project: Option<&Project>) -> Result<()> {
        if self.name.trim().is_empty() || self.version.trim().is_empty() {
            return Err(Error::validation("TemplateVersion: name and version are required"));
        }
        self.scope = Some(project.map(|project| project.id));
        Ok(())
    }

    /// The template version to create.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<TemplateVersion> {
        Ok(TemplateVersion {
            name: self.name.clone(),
            version: self.version.clone(),
            source: self.source.clone(),
            schema: Json(self.schema.clone()),
            project_id: *validated(TemplateVersion::NAME, self.scope.as_ref())?,
            ..TemplateVersion::default()
        })
    }
}

/// Input for publishing several template versions in one scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVersionCreateInputs {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// Versions to create. Their own `project` is ignored.
    pub items: Vec<TemplateVersionCreateInput>,
}

impl TemplateVersionCreateInputs {
    /// Resolve the scope once and check every item.
    ///
    /// # Errors
    ///
    /// As [`TemplateVersionCreateInput::validate_with`], or
    /// [`Error::Validation`] when there are no items.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        non_empty(TemplateVersion::NAME, &self.items)?;
        let project = project_scope(client, cache, self.project.as_ref()).await?;
        for item in &mut self.items {
            item.bind(project.as_ref())?;
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

    /// The versions to create, in item order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Vec<TemplateVersion>> {
        self.items.iter().map(TemplateVersionCreateInput::model).collect()
    }
}

/// Input naming one template version by id or by (`name`, `version`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVersionQueryInput {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// Version id; takes precedence over the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Template name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Version label.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(skip)]
    target: Option<TemplateVersion>,
}

impl TemplateVersionQueryInput {
    /// Resolve the scope, then the version within it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when neither id nor a full key is given,
    /// or [`Error::NotFound`] when nothing matches.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let project = project_scope(client, cache, self.project.as_ref()).await?;
        let identity = self.identity()?;
        let template = view::resolve_identity(
            client,
            cache,
            &identity,
            TemplateVersion::KEY,
            scope(project.as_ref()),
        )
        .await?;
        self.target = Some(template);
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
        if let Some(id) = self.id.filter(|id| !id.is_nil()) {
            return Ok(Identity::Id(id));
        }
        if self.name.trim().is_empty() || self.version.trim().is_empty() {
            return Err(Error::validation("TemplateVersion: id or name and version are required"));
        }
        Ok(Identity::Key(vec![self.name.clone(), self.version.clone()]))
    }

    /// The resolved template version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<TemplateVersion> {
        validated(TemplateVersion::NAME, self.target.as_ref()).cloned()
    }
}

/// Input for deleting one template version.
pub type TemplateVersionDeleteInput = TemplateVersionQueryInput;

/// Input for deleting several template versions in one scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVersionDeleteInputs {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// Versions to delete.
    pub items: Vec<TemplateVersionQueryInput>,
}

impl TemplateVersionDeleteInputs {
    /// Resolve the scope, then every item in one query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when there are no items, an item names
    /// nothing, or any item matches no version in the scope.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        non_empty(TemplateVersion::NAME, &self.items)?;
        let project = project_scope(client, cache, self.project.as_ref()).await?;
        let identities = self
            .items
            .iter()
            .map(TemplateVersionQueryInput::identity)
            .collect::<Result<Vec<_>>>()?;
        let templates = view::resolve_all(
            client,
            cache,
            &identities,
            TemplateVersion::KEY,
            TemplateVersion::key,
            scope(project.as_ref()),
        )
        .await?;
        for (item, template) in self.items.iter_mut().zip(templates) {
            item.target = Some(template);
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

    /// The resolved versions, in item order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Vec<TemplateVersion>> {
        self.items.iter().map(TemplateVersionQueryInput::model).collect()
    }
}

/// Input replacing the mutable fields of one template version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVersionUpdateInput {
    /// The version to update.
    #[serde(flatten)]
    pub target: TemplateVersionQueryInput,
    /// Replacement source.
    pub source: String,
    /// Replacement schema.
    #[serde(default)]
    pub schema: Value,
}

impl TemplateVersionUpdateInput {
    /// Resolve the version to update.
    ///
    /// # Errors
    ///
    /// As [`TemplateVersionQueryInput::validate_with`].
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        self.target.validate_with(client, cache).await
    }

    /// [`Self::validate_with`] over a fresh cache.
    ///
    /// # Errors
    ///
    /// As [`Self::validate_with`].
    pub async fn validate(&mut self, client: &Client) -> Result<()> {
        self.validate_with(client, &mut ValidationCache::new()).await
    }

    /// The version as it will be after the update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<TemplateVersion> {
        let mut template = self.target.model()?;
        template.source.clone_from(&self.source);
        template.schema = Json(self.schema.clone());
        Ok(template)
    }

    /// An update writing the mutable fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn update(&self) -> Result<UpdateOne<TemplateVersion>> {
        self.model().map(|template| update(&template))
    }
}

/// A partial update of one template version, applied as a JSON merge patch.
///
/// `project` and `refer` (the version's id) are bound from the request path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateVersionPatchInput {
    /// The owning project's id or name.
    #[serde(skip)]
    pub project: Option<Refer>,
    /// The version to patch.
    #[serde(skip)]
    pub refer: Refer,
    /// Members of the merge patch.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip)]
    patched: Option<TemplateVersion>,
}

impl TemplateVersionPatchInput {
    /// Fetch the current version, merge the patch over it and check that no
    /// immutable field changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when an immutable field changes or the
    /// result is malformed, or the lookup's error.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let project = project_scope(client, cache, self.project.as_ref()).await?;
        let Some(id) = self.refer.id::<ObjectId>() else {
            return Err(Error::validation("TemplateVersion: patches address versions by id"));
        };
        let current: TemplateVersion = view::resolve_identity(
            client,
            cache,
            &Identity::Id(id),
            TemplateVersion::KEY,
            scope(project.as_ref()),
        )
        .await?;
        let output = TemplateVersionOutput::from(&current);
        let merged = view::patch(
            TemplateVersion::NAME,
            &output,
            &Value::Object(self.fields.clone()),
            IMMUTABLE,
        )?;
        if merged.source.trim().is_empty() {
            return Err(Error::validation("TemplateVersion: source is required"));
        }

        let mut template = current;
        template.source = merged.source;
        template.schema = Json(merged.schema);
        self.patched = Some(template);
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

    /// The version with the patch applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<TemplateVersion> {
        validated(TemplateVersion::NAME, self.patched.as_ref()).cloned()
    }

    /// An update writing the patched fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn update(&self) -> Result<UpdateOne<TemplateVersion>> {
        self.model().map(|template| update(&template))
    }
}

async fn project_scope(
    client: &Client, cache: &mut ValidationCache, project: Option<&Refer>,
) -> Result<Option<Project>> {
    view::resolve_scope::<Project>(client, cache, project, "name").await
}

fn scope(project: Option<&Project>) -> Vec<Filter> {
    vec![project.map_or_else(|| Filter::is_null("project_id"), |p| Filter::eq("project_id", p.id))]
}

fn update(template: &TemplateVersion) -> UpdateOne<TemplateVersion> {
    template
        .update_one()
        .set("source", template.source.clone())
        .set("schema", template.schema.clone())
}

/// A template version as returned to callers.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVersionOutput {
    pub id: ObjectId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectOutput>,
}

impl From<&TemplateVersion> for TemplateVersionOutput {
    fn from(template: &TemplateVersion) -> Self {
        Self {
            id: template.id,
            name: template.name.clone(),
            version: template.version.clone(),
            source: template.source.clone(),
            schema: template.schema.0.clone(),
            create_time: template.create_time,
            update_time: template.update_time,
            project: view::expose_edge(
                &template.edges.project,
                template.project_id.as_ref(),
                |project| ProjectOutput::from(project),
            ),
        }
    }
}
