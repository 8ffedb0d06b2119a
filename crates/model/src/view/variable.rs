use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strata_orm::view::{self, Identity, Refer};
use strata_orm::{Client, Entity, Error, ObjectId, Result, Schema, UpdateOne, ValidationCache};

use super::{
    EnvironmentOutput, ProjectOutput, identity, non_empty, optional_scope, scope_filters, validated,
};
use crate::schema::Variable;

const IMMUTABLE: &[&str] = &["id", "name", "project", "environment", "createTime"];

/// Input for creating a variable.
///
/// `project` and `environment` are bound from the request path. Without
/// them the variable is global; an environment requires its project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableCreateInput {
    /// The owning project's id or name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// The owning environment's id or name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Refer>,
    /// Identifier-like name, unique within the scope.
    pub name: String,
    /// Plain value.
    pub value: String,
    /// Hide the value from outputs.
    #[serde(default)]
    pub sensitive: bool,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    #[serde(skip)]
    scope: Option<(Option<ObjectId>, Option<ObjectId>)>,
}

impl VariableCreateInput {
    /// Resolve the optional scopes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the name is blank or an environment
    /// is given without its project, or [`Error::NotFound`] when a scope does
    /// not exist.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let (project, environment) =
            optional_scope(client, cache, self.project.as_ref(), self.environment.as_ref()).await?;
        self.bind(project.map(|p| p.id), environment.map(|e| e.id))
    }

    /// [`Self::validate_with`] over a fresh cache.
    ///
    /// # Errors
    ///
    /// As [`Self::validate_with`].
    pub async fn validate(&mut self, client: &Client) -> Result<()> {
        self.validate_with(client, &mut ValidationCache::new()).await
    }

    fn bind(&mut self, project_id: Option<ObjectId>, environment_id: Option<ObjectId>) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("Variable: name is required"));
        }
        self.scope = Some((project_id, environment_id));
        Ok(())
    }

    /// The variable to create.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Variable> {
        let (project_id, environment_id) = *validated(Variable::NAME, self.scope.as_ref())?;
        Ok(Variable {
            name: self.name.clone(),
            value: self.value.clone(),
            sensitive: self.sensitive,
            description: self.description.clone(),
            project_id,
            environment_id,
            ..Variable::default()
        })
    }
}

/// Input for creating several variables of one scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableCreateInputs {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// The owning environment's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Refer>,
    /// Variables to create. Their own scopes are ignored.
    pub items: Vec<VariableCreateInput>,
}

impl VariableCreateInputs {
    /// Resolve the scopes once and check every item.
    ///
    /// # Errors
    ///
    /// As [`VariableCreateInput::validate_with`], or [`Error::Validation`]
    /// when there are no items or two share a name.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        non_empty(Variable::NAME, &self.items)?;
        let (project, environment) =
            optional_scope(client, cache, self.project.as_ref(), self.environment.as_ref()).await?;
        let project_id = project.map(|p| p.id);
        let environment_id = environment.map(|e| e.id);
        let mut seen = BTreeSet::new();
        for item in &mut self.items {
            item.bind(project_id, environment_id)?;
            if !seen.insert(item.name.clone()) {
                return Err(Error::validation(format!("Variable: duplicate name {:?}", item.name)));
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

    /// The variables to create, in item order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Vec<Variable>> {
        self.items.iter().map(VariableCreateInput::model).collect()
    }
}

/// Input naming one variable of a scope by id or name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableQueryInput {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// The owning environment's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Refer>,
    /// Variable id; takes precedence over `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Variable name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip)]
    target: Option<Variable>,
}

impl VariableQueryInput {
    /// Resolve the scopes, then the variable within them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when neither id nor name is given, or
    /// [`Error::NotFound`] when nothing matches.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let (project, environment) =
            optional_scope(client, cache, self.project.as_ref(), self.environment.as_ref()).await?;
        let identity = self.identity()?;
        let variable = view::resolve_identity(
            client,
            cache,
            &identity,
            &["name"],
            scope_filters(project.as_ref(), environment.as_ref()),
        )
        .await?;
        self.target = Some(variable);
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
        identity(Variable::NAME, self.id, &[self.name.as_str()])
    }

    /// The resolved variable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Variable> {
        validated(Variable::NAME, self.target.as_ref()).cloned()
    }
}

/// Input for deleting one variable.
pub type VariableDeleteInput = VariableQueryInput;

/// Input for deleting several variables of one scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDeleteInputs {
    /// The owning project's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Refer>,
    /// The owning environment's id or name, bound from the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Refer>,
    /// Variables to delete.
    pub items: Vec<VariableQueryInput>,
}

impl VariableDeleteInputs {
    /// Resolve the scopes, then every item in one query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when there are no items, an item names
    /// nothing, or any item matches no variable of the scope.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        non_empty(Variable::NAME, &self.items)?;
        let (project, environment) =
            optional_scope(client, cache, self.project.as_ref(), self.environment.as_ref()).await?;
        let identities =
            self.items.iter().map(VariableQueryInput::identity).collect::<Result<Vec<_>>>()?;
        let variables = view::resolve_all(
            client,
            cache,
            &identities,
            &["name"],
            |variable: &Variable| vec![variable.name.clone()],
            scope_filters(project.as_ref(), environment.as_ref()),
        )
        .await?;
        for (item, variable) in self.items.iter_mut().zip(variables) {
            item.target = Some(variable);
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

    /// The resolved variables, in item order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Vec<Variable>> {
        self.items.iter().map(VariableQueryInput::model).collect()
    }
}

/// Input replacing the mutable fields of one variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableUpdateInput {
    /// The variable to update.
    #[serde(flatten)]
    pub target: VariableQueryInput,
    /// Replacement value.
    pub value: String,
    /// Replacement sensitivity.
    #[serde(default)]
    pub sensitive: bool,
    /// Replacement description.
    #[serde(default)]
    pub description: String,
}

impl VariableUpdateInput {
    /// Resolve the variable to update.
    ///
    /// # Errors
    ///
    /// As [`VariableQueryInput::validate_with`].
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

    /// The variable as it will be after the update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Variable> {
        let mut variable = self.target.model()?;
        variable.value.clone_from(&self.value);
        variable.sensitive = self.sensitive;
        variable.description.clone_from(&self.description);
        Ok(variable)
    }

    /// An update writing the mutable fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn update(&self) -> Result<UpdateOne<Variable>> {
        self.model().map(|variable| update(&variable))
    }
}

/// A partial update of one variable, applied as a JSON merge patch.
///
/// The patch is merged over the unredacted variable, so a sensitive value
/// survives a patch that does not mention it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariablePatchInput {
    /// The owning project's id or name.
    #[serde(skip)]
    pub project: Option<Refer>,
    /// The owning environment's id or name.
    #[serde(skip)]
    pub environment: Option<Refer>,
    /// The variable to patch.
    #[serde(skip)]
    pub refer: Refer,
    /// Members of the merge patch.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip)]
    patched: Option<Variable>,
}

impl VariablePatchInput {
    /// Fetch the current variable, merge the patch over it and check that no
    /// immutable field changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when an immutable field changes or the
    /// result is malformed, or the lookup's error.
    pub async fn validate_with(&mut self, client: &Client, cache: &mut ValidationCache) -> Result<()> {
        let (project, environment) =
            optional_scope(client, cache, self.project.as_ref(), self.environment.as_ref()).await?;
        let current: Variable = view::resolve(
            client,
            cache,
            &self.refer,
            "name",
            scope_filters(project.as_ref(), environment.as_ref()),
        )
        .await?;
        let output = VariableOutput::from(&current);
        let merged =
            view::patch(Variable::NAME, &output, &Value::Object(self.fields.clone()), IMMUTABLE)?;

        let mut variable = current;
        variable.value = merged.value;
        variable.sensitive = merged.sensitive;
        variable.description = merged.description;
        self.patched = Some(variable);
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

    /// The variable with the patch applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn model(&self) -> Result<Variable> {
        validated(Variable::NAME, self.patched.as_ref()).cloned()
    }

    /// An update writing the patched fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before validation.
    pub fn update(&self) -> Result<UpdateOne<Variable>> {
        self.model().map(|variable| update(&variable))
    }
}

fn update(variable: &Variable) -> UpdateOne<Variable> {
    variable
        .update_one()
        .set("value", variable.value.clone())
        .set("sensitive", variable.sensitive)
        .set("description", variable.description.clone())
}

/// A variable as returned to callers.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableOutput {
    pub id: ObjectId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentOutput>,
}

impl VariableOutput {
    /// Blank the value of a sensitive variable.
    #[must_use]
    pub fn redacted(mut self) -> Self {
        if self.sensitive {
            self.value.clear();
        }
        self
    }
}

impl From<&Variable> for VariableOutput {
    fn from(variable: &Variable) -> Self {
        Self {
            id: variable.id,
            name: variable.name.clone(),
            value: variable.value.clone(),
            sensitive: variable.sensitive,
            description: variable.description.clone(),
            create_time: variable.create_time,
            update_time: variable.update_time,
            project: view::expose_edge(
                &variable.edges.project,
                variable.project_id.as_ref(),
                |project| ProjectOutput::from(project),
            ),
            environment: view::expose_edge(
                &variable.edges.environment,
                variable.environment_id.as_ref(),
                |env| EnvironmentOutput::from(env),
            ),
        }
    }
}

/// Outputs for a listing, with sensitive values blanked.
#[must_use]
pub fn expose_variables(variables: &[Variable]) -> Vec<VariableOutput> {
    variables.iter().map(|variable| VariableOutput::from(variable).redacted()).collect()
}
