use chrono::{DateTime, Utc};
use strata_orm::{Mutation, ObjectId, Relation, RelationKind, Result, Schema, TimeMixin, ToMany, entity};

use super::{Connector, Environment, Labels, Service, TemplateVersion, Variable, dns_label};

/// Edges of [`Project`].
#[derive(Debug, Clone, Default)]
pub struct ProjectEdges {
    /// Environments of the project.
    pub environments: ToMany<Environment>,
    /// Connectors owned by the project.
    pub connectors: ToMany<Connector>,
    /// Services deployed in the project.
    pub services: ToMany<Service>,
    /// Variables scoped to the project.
    pub variables: ToMany<Variable>,
    /// Templates owned by the project.
    pub templates: ToMany<TemplateVersion>,
}

entity! {
    table = "projects",
    name = "Project",
    id = ObjectId,
    edges = ProjectEdges,
    /// The top-level tenant grouping environments, connectors and services.
    pub struct Project {
        pub name: String,
        pub description: String,
        pub labels: Labels,
        pub create_time: Option<DateTime<Utc>>,
        pub update_time: Option<DateTime<Utc>>,
    }
}

impl Project {
    /// Environments holding `project_id`.
    pub const ENVIRONMENTS: Relation<Self, Environment> = Relation {
        name: "environments",
        kind: RelationKind::HasMany {
            column: "project_id",
            key: |env| Some(env.project_id),
            edge: |project| &mut project.edges.environments,
        },
    };

    /// Connectors holding `project_id`.
    pub const CONNECTORS: Relation<Self, Connector> = Relation {
        name: "connectors",
        kind: RelationKind::HasMany {
            column: "project_id",
            key: |connector| connector.project_id,
            edge: |project| &mut project.edges.connectors,
        },
    };

    /// Services holding `project_id`.
    pub const SERVICES: Relation<Self, Service> = Relation {
        name: "services",
        kind: RelationKind::HasMany {
            column: "project_id",
            key: |service| Some(service.project_id),
            edge: |project| &mut project.edges.services,
        },
    };

    /// Variables holding `project_id`.
    pub const VARIABLES: Relation<Self, Variable> = Relation {
        name: "variables",
        kind: RelationKind::HasMany {
            column: "project_id",
            key: |variable| variable.project_id,
            edge: |project| &mut project.edges.variables,
        },
    };

    /// Template versions holding `project_id`.
    pub const TEMPLATES: Relation<Self, TemplateVersion> = Relation {
        name: "templates",
        kind: RelationKind::HasMany {
            column: "project_id",
            key: |template| template.project_id,
            edge: |project| &mut project.edges.templates,
        },
    };
}

impl Schema for Project {
    fn required() -> &'static [&'static str] {
        &["name"]
    }

    fn immutable() -> &'static [&'static str] {
        &["name", "create_time"]
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
        dns_label(mutation, "name")
    }
}
