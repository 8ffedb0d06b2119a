use chrono::{DateTime, Utc};
use strata_orm::{
    Error, ForeignKey, Json, Mutation, ObjectId, Relation, RelationKind, Result, Schema, TimeMixin,
    ToMany, ToOne, entity,
};

use super::{Project, Service, Status, create_time};

/// Shape of a resource that groups instances.
pub const SHAPE_CLASS: &str = "class";

/// Shape of a concrete resource.
pub const SHAPE_INSTANCE: &str = "instance";

/// Edges of [`ServiceResource`].
#[derive(Debug, Clone, Default)]
pub struct ServiceResourceEdges {
    /// The owning project.
    pub project: ToOne<Project>,
    /// The owning service.
    pub service: ToOne<Service>,
    /// The resource this one is a component of.
    pub composition: ToOne<ServiceResource>,
    /// Resources composing this one.
    pub components: ToMany<ServiceResource>,
    /// The class this instance belongs to.
    pub class: ToOne<ServiceResource>,
    /// Instances of this class.
    pub instances: ToMany<ServiceResource>,
    /// Resources this one depends on.
    pub dependencies: ToMany<ServiceResourceRelationship>,
}

entity! {
    table = "service_resources",
    name = "ServiceResource",
    id = ObjectId,
    edges = ServiceResourceEdges,
    /// An infrastructure object provisioned for a service.
    ///
    /// Resources form a tree through `composition` and group into classes
    /// through `class`.
    pub struct ServiceResource {
        pub project_id: ObjectId,
        pub service_id: ObjectId,
        pub composition_id: Option<ObjectId>,
        pub class_id: Option<ObjectId>,
        pub name: String,
        pub mode: String,
        pub resource_type: String,
        pub deployer_type: String,
        pub shape: String,
        pub status: Json<Status>,
        pub create_time: Option<DateTime<Utc>>,
        pub update_time: Option<DateTime<Utc>>,
    }
}

impl ServiceResource {
    /// The project named by `project_id`.
    pub const PROJECT: Relation<Self, Project> = Relation {
        name: "project",
        kind: RelationKind::BelongsTo {
            column: "project_id",
            key: |resource| Some(resource.project_id),
            edge: |resource| &mut resource.edges.project,
        },
    };

    /// The service named by `service_id`.
    pub const SERVICE: Relation<Self, Service> = Relation {
        name: "service",
        kind: RelationKind::BelongsTo {
            column: "service_id",
            key: |resource| Some(resource.service_id),
            edge: |resource| &mut resource.edges.service,
        },
    };

    /// The parent in the composition tree.
    pub const COMPOSITION: Relation<Self, Self> = Relation {
        name: "composition",
        kind: RelationKind::BelongsTo {
            column: "composition_id",
            key: |resource| resource.composition_id,
            edge: |resource| &mut resource.edges.composition,
        },
    };

    /// Children in the composition tree.
    pub const COMPONENTS: Relation<Self, Self> = Relation {
        name: "components",
        kind: RelationKind::HasMany {
            column: "composition_id",
            key: |component| component.composition_id,
            edge: |resource| &mut resource.edges.components,
        },
    };

    /// The class of an instance.
    pub const CLASS: Relation<Self, Self> = Relation {
        name: "class",
        kind: RelationKind::BelongsTo {
            column: "class_id",
            key: |resource| resource.class_id,
            edge: |resource| &mut resource.edges.class,
        },
    };

    /// Instances of a class.
    pub const INSTANCES: Relation<Self, Self> = Relation {
        name: "instances",
        kind: RelationKind::HasMany {
            column: "class_id",
            key: |instance| instance.class_id,
            edge: |resource| &mut resource.edges.instances,
        },
    };

    /// Dependency links held by this resource.
    pub const DEPENDENCIES: Relation<Self, ServiceResourceRelationship> = Relation {
        name: "dependencies",
        kind: RelationKind::HasMany {
            column: "service_resource_id",
            key: |rel| Some(rel.service_resource_id),
            edge: |resource| &mut resource.edges.dependencies,
        },
    };
}

impl Schema for ServiceResource {
    fn required() -> &'static [&'static str] {
        &["name", "mode", "resource_type", "deployer_type", "shape"]
    }

    fn immutable() -> &'static [&'static str] {
        &[
            "project_id",
            "service_id",
            "composition_id",
            "class_id",
            "name",
            "mode",
            "resource_type",
            "deployer_type",
            "shape",
            "create_time",
        ]
    }

    fn foreign_keys() -> &'static [ForeignKey] {
        const KEYS: &[ForeignKey] = &[
            ForeignKey::required("project", "project_id"),
            ForeignKey::required("service", "service_id"),
            ForeignKey::optional("composition", "composition_id"),
            ForeignKey::optional("class", "class_id"),
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
        match mutation.text("shape") {
            None | Some(SHAPE_INSTANCE) => Ok(()),
            Some(SHAPE_CLASS) if mutation.text("class_id").is_some() => Err(Error::validation(
                "a ServiceResource class cannot belong to another class",
            )),
            Some(SHAPE_CLASS) => Ok(()),
            Some(shape) => Err(Error::validation(format!(
                "unknown ServiceResource shape {shape:?}"
            ))),
        }
    }
}

/// Edges of [`ServiceResourceRelationship`].
#[derive(Debug, Clone, Default)]
pub struct ServiceResourceRelationshipEdges {
    /// The dependent resource.
    pub service_resource: ToOne<ServiceResource>,
    /// The resource depended on.
    pub dependency: ToOne<ServiceResource>,
}

entity! {
    table = "service_resource_relationships",
    name = "ServiceResourceRelationship",
    id = ObjectId,
    edges = ServiceResourceRelationshipEdges,
    /// A dependency between two resources.
    pub struct ServiceResourceRelationship {
        pub service_resource_id: ObjectId,
        pub dependency_id: ObjectId,
        pub dependency_type: String,
        pub create_time: Option<DateTime<Utc>>,
    }
}

impl ServiceResourceRelationship {
    /// The resource named by `service_resource_id`.
    pub const SERVICE_RESOURCE: Relation<Self, ServiceResource> = Relation {
        name: "service_resource",
        kind: RelationKind::BelongsTo {
            column: "service_resource_id",
            key: |rel| Some(rel.service_resource_id),
            edge: |rel| &mut rel.edges.service_resource,
        },
    };

    /// The resource named by `dependency_id`.
    pub const DEPENDENCY: Relation<Self, ServiceResource> = Relation {
        name: "dependency",
        kind: RelationKind::BelongsTo {
            column: "dependency_id",
            key: |rel| Some(rel.dependency_id),
            edge: |rel| &mut rel.edges.dependency,
        },
    };
}

impl Schema for ServiceResourceRelationship {
    fn required() -> &'static [&'static str] {
        &["dependency_type"]
    }

    fn immutable() -> &'static [&'static str] {
        &["dependency_type", "create_time"]
    }

    fn foreign_keys() -> &'static [ForeignKey] {
        const KEYS: &[ForeignKey] = &[
            ForeignKey::required("service_resource", "service_resource_id"),
            ForeignKey::required("dependency", "dependency_id"),
        ];
        KEYS
    }

    fn create_defaults(mutation: &mut Mutation) -> Result<()> {
        create_time(mutation);
        Ok(())
    }
}
