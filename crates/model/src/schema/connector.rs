use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use strata_orm::{
    Error, ForeignKey, Json, Mutation, ObjectId, Relation, RelationKind, Result, Schema, TimeMixin,
    ToMany, ToOne, entity,
};

use super::{ClusterCost, Environment, Labels, Project, Status, create_time, dns_label};

/// Connector categories.
pub const CATEGORIES: &[&str] = &["Kubernetes", "CloudProvider", "VersionControl", "Custom"];

/// Edges of [`Connector`].
#[derive(Debug, Clone, Default)]
pub struct ConnectorEdges {
    /// The owning project; absent for global connectors.
    pub project: ToOne<Project>,
    /// Environment bindings.
    pub environments: ToMany<EnvironmentConnectorRelationship>,
    /// Collected cost records.
    pub costs: ToMany<ClusterCost>,
}

entity! {
    table = "connectors",
    name = "Connector",
    id = ObjectId,
    edges = ConnectorEdges,
    /// Credentials and settings for an external system.
    pub struct Connector {
        pub name: String,
        pub description: String,
        pub labels: Labels,
        pub project_id: Option<ObjectId>,
        pub category: String,
        pub connector_type: String,
        pub config_version: String,
        pub config_data: Json<BTreeMap<String, serde_json::Value>>,
        pub enable_fin_ops: bool,
        pub status: Json<Status>,
        pub create_time: Option<DateTime<Utc>>,
        pub update_time: Option<DateTime<Utc>>,
    }
}

impl Connector {
    /// The project named by `project_id`.
    pub const PROJECT: Relation<Self, Project> = Relation {
        name: "project",
        kind: RelationKind::BelongsTo {
            column: "project_id",
            key: |connector| connector.project_id,
            edge: |connector| &mut connector.edges.project,
        },
    };

    /// Environment bindings holding `connector_id`.
    pub const ENVIRONMENTS: Relation<Self, EnvironmentConnectorRelationship> = Relation {
        name: "environments",
        kind: RelationKind::HasMany {
            column: "connector_id",
            key: |rel| Some(rel.connector_id),
            edge: |connector| &mut connector.edges.environments,
        },
    };

    /// Cost records holding `connector_id`.
    pub const COSTS: Relation<Self, ClusterCost> = Relation {
        name: "costs",
        kind: RelationKind::HasMany {
            column: "connector_id",
            key: |cost| Some(cost.connector_id),
            edge: |connector| &mut connector.edges.costs,
        },
    };

    /// Whether the connector is shared by every project.
    #[must_use]
    pub const fn is_global(&self) -> bool {
        self.project_id.is_none()
    }
}

impl Schema for Connector {
    fn required() -> &'static [&'static str] {
        &["name", "category", "connector_type"]
    }

    fn immutable() -> &'static [&'static str] {
        &["name", "project_id", "category", "connector_type", "create_time"]
    }

    fn foreign_keys() -> &'static [ForeignKey] {
        const KEYS: &[ForeignKey] = &[ForeignKey::optional("project", "project_id")];
        KEYS
    }

    fn create_defaults(mutation: &mut Mutation) -> Result<()> {
        TimeMixin::create(mutation);
        if mutation.text("config_version").is_none_or(str::is_empty) {
            mutation.set_field("config_version", "v1");
        }
        Ok(())
    }

    fn update_defaults(mutation: &mut Mutation) -> Result<()> {
        TimeMixin::update(mutation);
        Ok(())
    }

    fn validate(mutation: &Mutation) -> Result<()> {
        dns_label(mutation, "name")?;
        if let Some(category) = mutation.text("category")
            && !CATEGORIES.contains(&category)
        {
            return Err(Error::validation(format!("unknown connector category {category:?}")));
        }
        Ok(())
    }
}

/// Edges of [`EnvironmentConnectorRelationship`].
#[derive(Debug, Clone, Default)]
pub struct EnvironmentConnectorRelationshipEdges {
    /// The bound environment.
    pub environment: ToOne<Environment>,
    /// The bound connector.
    pub connector: ToOne<Connector>,
}

entity! {
    table = "environment_connector_relationships",
    name = "EnvironmentConnectorRelationship",
    id = ObjectId,
    edges = EnvironmentConnectorRelationshipEdges,
    /// Binds a connector to an environment.
    pub struct EnvironmentConnectorRelationship {
        pub environment_id: ObjectId,
        pub connector_id: ObjectId,
        pub create_time: Option<DateTime<Utc>>,
    }
}

impl EnvironmentConnectorRelationship {
    /// The environment named by `environment_id`.
    pub const ENVIRONMENT: Relation<Self, Environment> = Relation {
        name: "environment",
        kind: RelationKind::BelongsTo {
            column: "environment_id",
            key: |rel| Some(rel.environment_id),
            edge: |rel| &mut rel.edges.environment,
        },
    };

    /// The connector named by `connector_id`.
    pub const CONNECTOR: Relation<Self, Connector> = Relation {
        name: "connector",
        kind: RelationKind::BelongsTo {
            column: "connector_id",
            key: |rel| Some(rel.connector_id),
            edge: |rel| &mut rel.edges.connector,
        },
    };
}

impl Schema for EnvironmentConnectorRelationship {
    fn foreign_keys() -> &'static [ForeignKey] {
        const KEYS: &[ForeignKey] = &[
            ForeignKey::required("environment", "environment_id"),
            ForeignKey::required("connector", "connector_id"),
        ];
        KEYS
    }

    fn create_defaults(mutation: &mut Mutation) -> Result<()> {
        create_time(mutation);
        Ok(())
    }
}
