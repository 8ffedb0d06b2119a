use chrono::{DateTime, Utc};
use strata_orm::{
    Error, ForeignKey, Mutation, ObjectId, Op, Relation, RelationKind, Result, Schema, TimeMixin,
    ToOne, entity,
};

use super::{Environment, Project};

/// Edges of [`Variable`].
#[derive(Debug, Clone, Default)]
pub struct VariableEdges {
    /// The owning project; absent for global variables.
    pub project: ToOne<Project>,
    /// The owning environment; absent for project or global variables.
    pub environment: ToOne<Environment>,
}

entity! {
    table = "variables",
    name = "Variable",
    id = ObjectId,
    edges = VariableEdges,
    /// A named value made available to deployments.
    ///
    /// Variables are global when neither project nor environment is set,
    /// project-wide when only the project is set, and environment-specific
    /// otherwise.
    pub struct Variable {
        pub name: String,
        pub value: String,
        pub sensitive: bool,
        pub description: String,
        pub project_id: Option<ObjectId>,
        pub environment_id: Option<ObjectId>,
        pub create_time: Option<DateTime<Utc>>,
        pub update_time: Option<DateTime<Utc>>,
    }
}

impl Variable {
    /// The project named by `project_id`.
    pub const PROJECT: Relation<Self, Project> = Relation {
        name: "project",
        kind: RelationKind::BelongsTo {
            column: "project_id",
            key: |variable| variable.project_id,
            edge: |variable| &mut variable.edges.project,
        },
    };

    /// The environment named by `environment_id`.
    pub const ENVIRONMENT: Relation<Self, Environment> = Relation {
        name: "environment",
        kind: RelationKind::BelongsTo {
            column: "environment_id",
            key: |variable| variable.environment_id,
            edge: |variable| &mut variable.edges.environment,
        },
    };
}

impl Schema for Variable {
    fn required() -> &'static [&'static str] {
        &["name", "value"]
    }

    fn immutable() -> &'static [&'static str] {
        &["name", "project_id", "environment_id", "create_time"]
    }

    fn foreign_keys() -> &'static [ForeignKey] {
        const KEYS: &[ForeignKey] = &[
            ForeignKey::optional("project", "project_id"),
            ForeignKey::optional("environment", "environment_id"),
        ];
        KEYS
    }

    fn create_defaults(mutation: &mut Mutation) -> Result<()> {
        TimeMixin::create(mutation);
        Ok(())
    }

    fn update_defaults(mutation: &mut Mutation) -> Result<()> {
        TimeMixin::update(mutation);
        Ok(())
    }

    fn validate(mutation: &Mutation) -> Result<()> {
        if let Some(name) = mutation.text("name")
            && !is_variable_name(name)
        {
            return Err(Error::validation(format!(
                "Variable.name {name:?} must consist of letters, digits and underscores"
            )));
        }
        if mutation.op() == Op::Create
            && mutation.text("environment_id").is_some()
            && mutation.text("project_id").is_none()
        {
            return Err(Error::validation("an environment Variable must belong to a project"));
        }
        Ok(())
    }
}

fn is_variable_name(name: &str) -> bool {
    name.bytes().next().is_some_and(|b| b.is_ascii_alphabetic() || b == b'_')
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
