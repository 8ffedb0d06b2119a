use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strata_orm::view::{self, Identity, Refer};
use strata_orm::{
    Client, Entity, Error, Filter, Json, ObjectId, Result, Schema, UpdateOne, ValidationCache,
};

use super::{
    EnvironmentOutput, ProjectOutput, TemplateVersionOutput, environment_route, identity,
    non_empty, project_route, validated,
};
use crate::schema::{Environment, Project, Service, Status, TemplateVersion};

const IMMUTABLE: &[&str] = &["id", "name", "project", "environment", "template", "createTime"];

/// The template version a service instantiates, by id or by
/// (`name`, `version`). Versions of the service's project and global
/// versions are both visible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRef {
    /// Version id; takes precedence over the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Template name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Version label.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl TemplateRef {
    fn identity(&self) -> Result<Identity<ObjectId>> {
        if let Some(id) = self.id.filter(|id| !id.is_nil()) {
            return Ok(Identity::Id(id));
        }
        if self.name.trim().is_empty() || self.version.trim().is_empty() {
            return Err(Error::validation("Service: template needs an id or name and version"));
        }
        Ok(Identity::Key(vec![self.name.clone(), self.version.clone()]))
    }
}

/// Input for creating a service.
///
/// `project` and `environment` are bound from the request path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCreateInput {
    /// The owning project's id or name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// The target environment's id or name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Refer>,
    /// DNS-label name, unique within the environment.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Free-form labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// The template version to instantiate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateRef>,
    /// Template inputs.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(skip)]
    resolved: Option<Scope>,
}

#[derive(Debug, Clone, Default)]
struct Scope {
    project_id: ObjectId,
    environment_id: ObjectId,
    template_id: Option<ObjectId>,
}

impl ServiceCreateInput {
    /// Resolve the routes, then the template version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when a route is missing or the name is
    /// blank, or [`Error::NotFound`] when a route or template does not exist.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let (project, env) =
            routes(client, cache, self.project.as_ref(), self.environment.as_ref()).await?;
        let template = match &self.template {
            Some(template) => Some(
                view::resolve_identity::<TemplateVersion>(
                    client,
                    cache,
                    &template.identity()?,
                    TemplateVersion::KEY,
                    template_scope(&project),
                )
                .await?
                .id,
            ),
            None => None,
        };
        self.bind(&project, &env, template)
    }

    /// [`Self::validate_with`] over a fresh cache.
    ///
    /// # Errors
    ///
    /// As [`Self::validate_with`].
    pub async fn validate(&mut self, client: &Client) -> Result<()> {
        self.validate_with(client, &mut ValidationCache::new()).await
    }

    fn bind(&mut self, project: &Project, env: &Environment, template: Option<ObjectId>) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("Service: name is required"));
        }
        self.resolved = Some(Scope {
            project_id: project.id,
            environment_id: env.id,
            template_id: template,
        });
        Ok(())
    }

    /// The service to create.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Service> {
        let scope = validated(Service::NAME, self.resolved.as_ref())?;
        Ok(Service {
            name: self.name.clone(),
            description: self.description.clone(),
            labels: Json(self.labels.clone()),
            project_id: scope.project_id,
            environment_id: scope.environment_id,
            template_id: scope.template_id,
            attributes: Json(self.attributes.clone()),
            ..Service::default()
        })
    }
}

/// Input for creating several services in one environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCreateInputs {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// The target environment's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Refer>,
    /// Services to create. Their own routes are ignored.
    pub items: Vec<ServiceCreateInput>,
}

impl ServiceCreateInputs {
    /// Resolve the routes once and every referenced template version in one
    /// query.
    ///
    /// # Errors
    ///
    /// As [`ServiceCreateInput::validate_with`], or [`Error::Validation`]
    /// when there are no items, two share a name, or a template cannot be
    /// resolved.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        non_empty(Service::NAME, &self.items)?;
        let (project, env) =
            routes(client, cache, self.project.as_ref(), self.environment.as_ref()).await?;

        let identities = self
            .items
            .iter()
            .filter_map(|item| item.template.as_ref().map(TemplateRef::identity))
            .collect::<Result<Vec<_>>>()?;
        let mut templates = view::resolve_all(
            client,
            cache,
            &identities,
            TemplateVersion::KEY,
            TemplateVersion::key,
            template_scope(&project),
        )
        .await?
        .into_iter();

        let mut seen = BTreeSet::new();
        for item in &mut self.items {
            let template = item.template.as_ref().and_then(|_| templates.next()).map(|t| t.id);
            item.bind(&project, &env, template)?;
            if !seen.insert(item.name.clone()) {
                return Err(Error::validation(format!("Service: duplicate name {:?}", item.name)));
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

    /// The services to create, in item order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Vec<Service>> {
        self.items.iter().map(ServiceCreateInput::model).collect()
    }
}

/// Input naming one service of an environment by id or name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceQueryInput {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// The environment's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Refer>,
    /// Service id; takes precedence over `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Service name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip)]
    target: Option<Service>,
}

impl ServiceQueryInput {
    /// Resolve the routes, then the service within them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when a route is missing or neither id nor
    /// name is given, or [`Error::NotFound`] when nothing matches.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let (project, env) =
            routes(client, cache, self.project.as_ref(), self.environment.as_ref()).await?;
        let identity = self.identity()?;
        let service =
            view::resolve_identity(client, cache, &identity, &["name"], scope(&project, &env)).await?;
        self.target = Some(service);
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
        identity(Service::NAME, self.id, &[self.name.as_str()])
    }

    /// The resolved service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Service> {
        validated(Service::NAME, self.target.as_ref()).cloned()
    }
}

/// Input for deleting one service.
pub type ServiceDeleteInput = ServiceQueryInput;

/// Input for deleting several services of one environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDeleteInputs {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// The environment's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Refer>,
    /// Services to delete.
    pub items: Vec<ServiceQueryInput>,
}

impl ServiceDeleteInputs {
    /// Resolve the routes, then every item in one query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when there are no items, an item names
    /// nothing, or any item matches no service of the environment.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        non_empty(Service::NAME, &self.items)?;
        let (project, env) =
            routes(client, cache, self.project.as_ref(), self.environment.as_ref()).await?;
        let identities =
            self.items.iter().map(ServiceQueryInput::identity).collect::<Result<Vec<_>>>()?;
        let services = view::resolve_all(
            client,
            cache,
            &identities,
            &["name"],
            |service: &Service| vec![service.name.clone()],
            scope(&project, &env),
        )
        .await?;
        for (item, service) in self.items.iter_mut().zip(services) {
            item.target = Some(service);
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

    /// The resolved services, in item order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Vec<Service>> {
        self.items.iter().map(ServiceQueryInput::model).collect()
    }
}

/// Input replacing the mutable fields of one service, including an upgrade
/// to another template version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUpdateInput {
    /// The service to update.
    #[serde(flatten)]
    pub target: ServiceQueryInput,
    /// Replacement description.
    #[serde(default)]
    pub description: String,
    /// Replacement labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Template version to move to; unchanged when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateRef>,
    /// Replacement template inputs.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(skip)]
    template_id: Option<ObjectId>,
}

impl ServiceUpdateInput {
    /// Resolve the service to update and any new template version.
    ///
    /// # Errors
    ///
    /// As [`ServiceQueryInput::validate_with`], or [`Error::NotFound`] when
    /// the template version does not exist.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        self.target.validate_with(client, cache).await?;
        if let Some(template) = &self.template {
            let project = Project::from_id(self.target.model()?.project_id);
            let resolved = view::resolve_identity::<TemplateVersion>(
                client,
                cache,
                &template.identity()?,
                TemplateVersion::KEY,
                template_scope(&project),
            )
            .await?;
            self.template_id = Some(resolved.id);
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

    /// The service as it will be after the update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Service> {
        let mut service = self.target.model()?;
        service.description.clone_from(&self.description);
        service.labels = Json(self.labels.clone());
        service.attributes = Json(self.attributes.clone());
        if self.template_id.is_some() {
            service.template_id = self.template_id;
        }
        Ok(service)
    }

    /// An update writing the mutable fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn update(&self) -> Result<UpdateOne<Service>> {
        let service = self.model()?;
        Ok(update(&service).set_opt("template_id", service.template_id))
    }
}

/// A partial update of one service, applied as a JSON merge patch.
///
/// `project`, `environment` and `refer` (the service's id or name) are bound
/// from the request path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicePatchInput {
    /// The owning project's id or name.
    #[serde(skip)]
    pub project: Option<Refer>,
    /// The environment's id or name.
    #[serde(skip)]
    pub environment: Option<Refer>,
    /// The service to patch.
    #[serde(skip)]
    pub refer: Refer,
    /// Members of the merge patch.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip)]
    patched: Option<Service>,
}

impl ServicePatchInput {
    /// Fetch the current service, merge the patch over it and check that no
    /// immutable field changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when a route is missing, an immutable
    /// field changes or the result is malformed, or the lookup's error.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let (project, env) =
            routes(client, cache, self.project.as_ref(), self.environment.as_ref()).await?;
        let current: Service =
            view::resolve(client, cache, &self.refer, "name", scope(&project, &env)).await?;
        let output = ServiceOutput::from(&current);
        let merged =
            view::patch(Service::NAME, &output, &Value::Object(self.fields.clone()), IMMUTABLE)?;

        let mut service = current;
        service.description = merged.description;
        service.labels = Json(merged.labels);
        service.attributes = Json(merged.attributes);
        self.patched = Some(service);
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

    /// The service with the patch applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Service> {
        validated(Service::NAME, self.patched.as_ref()).cloned()
    }

    /// An update writing the patched fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn update(&self) -> Result<UpdateOne<Service>> {
        self.model().map(|service| update(&service))
    }
}

async fn routes(
    client: &Client, cache: &mut ValidationCache, project: Option<&Refer>,
    environment: Option<&Refer>,
) -> Result<(Project, Environment)> {
    let project = project_route(client, cache, project).await?;
    let env = environment_route(client, cache, &project, environment).await?;
    Ok((project, env))
}

fn scope(project: &Project, env: &Environment) -> Vec<Filter> {
    vec![Filter::eq("project_id", project.id), Filter::eq("environment_id", env.id)]
}

fn template_scope(project: &Project) -> Vec<Filter> {
    vec![Filter::or(vec![Filter::eq("project_id", project.id), Filter::is_null("project_id")])]
}

fn update(service: &Service) -> UpdateOne<Service> {
    service
        .update_one()
        .set("description", service.description.clone())
        .set("labels", service.labels.clone())
        .set("attributes", service.attributes.clone())
}

/// A service as returned to callers.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOutput {
    pub id: ObjectId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateVersionOutput>,
}

impl From<&Service> for ServiceOutput {
    fn from(service: &Service) -> Self {
        Self {
            id: service.id,
            name: service.name.clone(),
            description: service.description.clone(),
            labels: service.labels.0.clone(),
            attributes: service.attributes.0.clone(),
            status: service.status.0.clone(),
            create_time: service.create_time,
            update_time: service.update_time,
            project: view::expose_edge(&service.edges.project, Some(&service.project_id), |p| {
                ProjectOutput::from(p)
            }),
            environment: view::expose_edge(
                &service.edges.environment,
                Some(&service.environment_id),
                |env| EnvironmentOutput::from(env),
            ),
            template: view::expose_edge(
                &service.edges.template,
                service.template_id.as_ref(),
                |template| TemplateVersionOutput::from(template),
            ),
        }
    }
}
