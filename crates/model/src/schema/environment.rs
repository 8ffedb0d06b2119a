use chrono::{DateTime, Utc};
use strata_orm::{
    ForeignKey, Mutation, ObjectId, Relation, RelationKind, Result, Schema, TimeMixin, ToMany,
    ToOne, entity,
};

use super::{EnvironmentConnectorRelationship, Labels, Project, Service, dns_label};

/// Edges of [`Environment`].
#[derive(Debug, Clone, Default)]
pub struct EnvironmentEdges {
    /// The owning project.
    pub project: ToOne<Project>,
    /// Connector bindings.
    pub connectors: ToMany<EnvironmentConnectorRelationship>,
    /// Services deployed to the environment.
    pub services: ToMany<Service>,
}

entity! {
    table = "environments",
    name = "Environment",
    id = ObjectId,
    edges = EnvironmentEdges,
    /// A deployment target within a project.
    pub struct Environment {
        pub name: String,
        pub description: String,
        pub labels: Labels,
        pub project_id: ObjectId,
        pub create_time: Option<DateTime<Utc>>,
        pub update_time: Option<DateTime<Utc>>,
    }
}

impl Environment {
    /// The project named by `project_id`.
    pub const PROJECT: Relation<Self, Project> = Relation {
        name: "project",
        kind: RelationKind::BelongsTo {
            column: "project_id",
            key: |env| Some(env.project_id),
            edge: |env| &mut env.edges.project,
        },
    };

    /// Connector bindings holding `environment_id`.
    pub const CONNECTORS: Relation<Self, EnvironmentConnectorRelationship> = Relation {
        name: "connectors",
        kind: RelationKind::HasMany {
            column: "environment_id",
            key: |rel| Some(rel.environment_id),
            edge: |env| &mut env.edges.connectors,
        },
    };

    /// Services holding `environment_id`.
    pub const SERVICES: Relation<Self, Service> = Relation {
        name: "services",
        kind: RelationKind::HasMany {
            column: "environment_id",
            key: |service| Some(service.environment_id),
            edge: |env| &mut env.edges.services,
        },
    };
}

impl Schema for Environment {
    fn required() -> &'static [&'static str] {
        &["name"]
    }

    fn immutable() -> &'static [&'static str] {
        &["name", "project_id", "create_time"]
    }

    fn foreign_keys() -> &'static [ForeignKey] {
        const KEYS: &[ForeignKey] = &[ForeignKey::required("project", "project_id")];
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
        dns_label(mutation, "name")
    }
}
