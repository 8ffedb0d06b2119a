use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strata_orm::view::{self, Identity, Refer};
use strata_orm::{Client, Entity, Error, Filter, Json, ObjectId, Result, Schema, UpdateOne, ValidationCache};

use super::{ProjectOutput, identity, non_empty, validated};
use crate::schema::{Connector, Project, Status};

const IMMUTABLE: &[&str] = &["id", "name", "project", "category", "type", "createTime"];

/// Input for creating a connector.
///
/// `project` is bound from the request path; without it the connector is
/// global.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorCreateInput {
    /// The owning project's id or name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// DNS-label name, unique within the scope.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Free-form labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// One of [`crate::schema::CATEGORIES`].
    pub category: String,
    /// Provider type within the category, e.g. `Kubernetes` or `AWS`.
    #[serde(rename = "type")]
    pub connector_type: String,
    /// Version of the `config_data` layout.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub config_version: String,
    /// Provider configuration.
    #[serde(default)]
    pub config_data: BTreeMap<String, Value>,
    /// Collect costs through this connector.
    #[serde(default)]
    pub enable_fin_ops: bool,
    #[serde(skip)]
    scope: Option<Option<ObjectId>>,
}

impl ConnectorCreateInput {
    /// Resolve the optional project scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the name or category is blank, or
    /// [`Error::NotFound`] when a given project does not exist.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let project = view::resolve_scope::<Project>(client, cache, self.project.as_ref(), "name").await?;
        if self.name.trim().is_empty() || self.category.trim().is_empty() {
            return Err(Error::validation("Connector: name and category are required"));
        }
        self.scope = Some(project.map(|project| project.id));
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

    /// The connector to create. `config_version` is defaulted on save when
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Connector> {
        Ok(Connector {
            name: self.name.clone(),
            description: self.description.clone(),
            labels: Json(self.labels.clone()),
            project_id: *validated(Connector::NAME, self.scope.as_ref())?,
            category: self.category.clone(),
            connector_type: self.connector_type.clone(),
            config_version: self.config_version.clone(),
            config_data: Json(self.config_data.clone()),
            enable_fin_ops: self.enable_fin_ops,
            ..Connector::default()
        })
    }
}

/// Input naming one connector by id or name, within a project or globally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorQueryInput {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// Connector id; takes precedence over `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Connector name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip)]
    target: Option<Connector>,
}

impl ConnectorQueryInput {
    /// Resolve the scope, then the connector within it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when neither id nor name is given, or
    /// [`Error::NotFound`] when nothing matches.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let project = view::resolve_scope::<Project>(client, cache, self.project.as_ref(), "name").await?;
        let identity = self.identity()?;
        let connector =
            view::resolve_identity(client, cache, &identity, &["name"], scope(project.as_ref()))
                .await?;
        self.target = Some(connector);
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
        identity(Connector::NAME, self.id, &[self.name.as_str()])
    }

    /// The resolved connector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Connector> {
        validated(Connector::NAME, self.target.as_ref()).cloned()
    }
}

/// Input for deleting one connector.
pub type ConnectorDeleteInput = ConnectorQueryInput;

/// Input for deleting several connectors of one scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorDeleteInputs {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// Connectors to delete.
    pub items: Vec<ConnectorQueryInput>,
}

impl ConnectorDeleteInputs {
    /// Resolve the scope, then every item in one query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when there are no items, an item names
    /// nothing, or any item matches no connector of the scope.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        non_empty(Connector::NAME, &self.items)?;
        let project = view::resolve_scope::<Project>(client, cache, self.project.as_ref(), "name").await?;
        let identities =
            self.items.iter().map(ConnectorQueryInput::identity).collect::<Result<Vec<_>>>()?;
        let connectors = view::resolve_all(
            client,
            cache,
            &identities,
            &["name"],
            |connector: &Connector| vec![connector.name.clone()],
            scope(project.as_ref()),
        )
        .await?;
        for (item, connector) in self.items.iter_mut().zip(connectors) {
            item.target = Some(connector);
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

    /// The resolved connectors, in item order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Vec<Connector>> {
        self.items.iter().map(ConnectorQueryInput::model).collect()
    }
}

/// Input replacing the mutable fields of one connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorUpdateInput {
    /// The connector to update.
    #[serde(flatten)]
    pub target: ConnectorQueryInput,
    /// Replacement description.
    #[serde(default)]
    pub description: String,
    /// Replacement labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Replacement configuration layout version.
    #[serde(default)]
    pub config_version: String,
    /// Replacement configuration.
    #[serde(default)]
    pub config_data: BTreeMap<String, Value>,
    /// Collect costs through this connector.
    #[serde(default)]
    pub enable_fin_ops: bool,
}

impl ConnectorUpdateInput {
    /// Resolve the connector to update.
    ///
    /// # Errors
    ///
    /// As [`ConnectorQueryInput::validate_with`].
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

    /// The connector as it will be after the update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Connector> {
        let mut connector = self.target.model()?;
        connector.description.clone_from(&self.description);
        connector.labels = Json(self.labels.clone());
        if !self.config_version.is_empty() {
            connector.config_version.clone_from(&self.config_version);
        }
        connector.config_data = Json(self.config_data.clone());
        connector.enable_fin_ops = self.enable_fin_ops;
        Ok(connector)
    }

    /// An update writing the mutable fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn update(&self) -> Result<UpdateOne<Connector>> {
        self.model().map(|connector| update(&connector))
    }
}

/// A partial update of one connector, applied as a JSON merge patch.
///
/// `project` and `refer` (the connector's id or name) are bound from the
/// request path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectorPatchInput {
    /// The owning project's id or name.
    #[serde(skip)]
    pub project: Option<Refer>,
    /// The connector to patch.
    #[serde(skip)]
    pub refer: Refer,
    /// Members of the merge patch.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip)]
    patched: Option<Connector>,
}

impl ConnectorPatchInput {
    /// Fetch the current connector, merge the patch over it and check that no
    /// immutable field changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when an immutable field changes or the
    /// result is malformed, or the lookup's error.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let project = view::resolve_scope::<Project>(client, cache, self.project.as_ref(), "name").await?;
        let current: Connector =
            view::resolve(client, cache, &self.refer, "name", scope(project.as_ref())).await?;
        let output = ConnectorOutput::from(&current);
        let merged =
            view::patch(Connector::NAME, &output, &Value::Object(self.fields.clone()), IMMUTABLE)?;

        let mut connector = current;
        connector.description = merged.description;
        connector.labels = Json(merged.labels);
        connector.config_version = merged.config_version;
        connector.config_data = Json(merged.config_data);
        connector.enable_fin_ops = merged.enable_fin_ops;
        self.patched = Some(connector);
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

    /// The connector with the patch applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Connector> {
        validated(Connector::NAME, self.patched.as_ref()).cloned()
    }

    /// An update writing the patched fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn update(&self) -> Result<UpdateOne<Connector>> {
        self.model().map(|connector| update(&connector))
    }
}

fn scope(project: Option<&Project>) -> Vec<Filter> {
    vec![project.map_or_else(|| Filter::is_null("project_id"), |p| Filter::eq("project_id", p.id))]
}

fn update(connector: &Connector) -> UpdateOne<Connector> {
    connector
        .update_one()
        .set("description", connector.description.clone())
        .set("labels", connector.labels.clone())
        .set("config_version", connector.config_version.clone())
        .set("config_data", connector.config_data.clone())
        .set("enable_fin_ops", connector.enable_fin_ops)
}

/// A connector as returned to callers.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorOutput {
    pub id: ObjectId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub connector_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub config_version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config_data: BTreeMap<String, Value>,
    #[serde(default)]
    pub enable_fin_ops: bool,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectOutput>,
}

impl From<&Connector> for ConnectorOutput {
    fn from(connector: &Connector) -> Self {
        Self {
            id: connector.id,
            name: connector.name.clone(),
            description: connector.description.clone(),
            labels: connector.labels.0.clone(),
            category: connector.category.clone(),
            connector_type: connector.connector_type.clone(),
            config_version: connector.config_version.clone(),
            config_data: connector.config_data.0.clone(),
            enable_fin_ops: connector.enable_fin_ops,
            status: connector.status.0.clone(),
            create_time: connector.create_time,
            update_time: connector.update_time,
            project: view::expose_edge(
                &connector.edges.project,
                connector.project_id.as_ref(),
                |project| ProjectOutput::from(project),
            ),
        }
    }
}
