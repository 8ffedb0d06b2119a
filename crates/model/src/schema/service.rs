use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use strata_orm::{
    ForeignKey, Json, Mutation, ObjectId, Relation, RelationKind, Result, Schema, TimeMixin,
    ToMany, ToOne, entity,
};

use super::{Environment, Labels, Project, ServiceResource, Status, TemplateVersion, dns_label};

/// Edges of [`Service`].
#[derive(Debug, Clone, Default)]
pub struct ServiceEdges {
    /// The owning project.
    pub project: ToOne<Project>,
    /// The environment deployed to.
    pub environment: ToOne<Environment>,
    /// The template version instantiated.
    pub template: ToOne<TemplateVersion>,
    /// Resources provisioned for the service.
    pub resources: ToMany<ServiceResource>,
}

entity! {
    table = "services",
    name = "Service",
    id = ObjectId,
    edges = ServiceEdges,
    /// A template instantiated in one environment of a project.
    pub struct Service {
        pub name: String,
        pub description: String,
        pub labels: Labels,
        pub project_id: ObjectId,
        pub environment_id: ObjectId,
        pub template_id: Option<ObjectId>,
        pub attributes: Json<BTreeMap<String, serde_json::Value>>,
        pub status: Json<Status>,
        pub create_time: Option<DateTime<Utc>>,
        pub update_time: Option<DateTime<Utc>>,
    }
}

impl Service {
    /// The project named by `project_id`.
    pub const PROJECT: Relation<Self, Project> = Relation {
        name: "project",
        kind: RelationKind::BelongsTo {
            column: "project_id",
            key: |service| Some(service.project_id),
            edge: |service| &mut service.edges.project,
        },
    };

    /// The environment named by `environment_id`.
    pub const ENVIRONMENT: Relation<Self, Environment> = Relation {
        name: "environment",
        kind: RelationKind::BelongsTo {
            column: "environment_id",
            key: |service| Some(service.environment_id),
            edge: |service| &mut service.edges.environment,
        },
    };

    /// The template version named by `template_id`.
    pub const TEMPLATE: Relation<Self, TemplateVersion> = Relation {
        name: "template",
        kind: RelationKind::BelongsTo {
            column: "template_id",
            key: |service| service.template_id,
            edge: |service| &mut service.edges.template,
        },
    };

    /// Resources holding `service_id`.
    pub const RESOURCES: Relation<Self, ServiceResource> = Relation {
        name: "resources",
        kind: RelationKind::HasMany {
            column: "service_id",
            key: |resource| Some(resource.service_id),
            edge: |service| &mut service.edges.resources,
        },
    };
}

impl Schema for Service {
    fn required() -> &'static [&'static str] {
        &["name"]
    }

    fn immutable() -> &'static [&'static str] {
        &["name", "project_id", "environment_id", "create_time"]
    }

    fn foreign_keys() -> &'static [ForeignKey] {
        const KEYS: &[ForeignKey] = &[
            ForeignKey::required("project", "project_id"),
            ForeignKey::required("environment", "environment_id"),
            ForeignKey::optional("template", "template_id"),
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
        dns_label(mutation, "name")
    }
}
