use chrono::{DateTime, Utc};
use strata_orm::{
    Error, ForeignKey, Json, Mutation, ObjectId, Relation, RelationKind, Result, Schema, TimeMixin,
    ToMany, ToOne, entity,
};

use super::{Project, Service};

/// Edges of [`TemplateVersion`].
#[derive(Debug, Clone, Default)]
pub struct TemplateVersionEdges {
    /// The owning project; absent for global templates.
    pub project: ToOne<Project>,
    /// Services instantiated from this version.
    pub services: ToMany<Service>,
}

entity! {
    table = "template_versions",
    name = "TemplateVersion",
    id = ObjectId,
    edges = TemplateVersionEdges,
    /// One published version of a deployment template.
    ///
    /// Versions are addressed by the composite key (`name`, `version`).
    pub struct TemplateVersion {
        pub name: String,
        pub version: String,
        pub source: String,
        pub schema: Json<serde_json::Value>,
        pub project_id: Option<ObjectId>,
        pub create_time: Option<DateTime<Utc>>,
        pub update_time: Option<DateTime<Utc>>,
    }
}

impl TemplateVersion {
    /// Columns of the human-readable key.
    pub const KEY: &'static [&'static str] = &["name", "version"];

    /// The project named by `project_id`.
    pub const PROJECT: Relation<Self, Project> = Relation {
        name: "project",
        kind: RelationKind::BelongsTo {
            column: "project_id",
            key: |template| template.project_id,
            edge: |template| &mut template.edges.project,
        },
    };

    /// Services holding `template_id`.
    pub const SERVICES: Relation<Self, Service> = Relation {
        name: "services",
        kind: RelationKind::HasMany {
            column: "template_id",
            key: |service| service.template_id,
            edge: |template| &mut template.edges.services,
        },
    };

    /// Values of [`Self::KEY`].
    #[must_use]
    pub fn key(&self) -> Vec<String> {
        vec![self.name.clone(), self.version.clone()]
    }
}

impl Schema for TemplateVersion {
    fn required() -> &'static [&'static str] {
        &["name", "version", "source"]
    }

    fn immutable() -> &'static [&'static str] {
        &["name", "version", "project_id", "create_time"]
    }

    fn foreign_keys() -> &'static [ForeignKey] {
        const KEYS: &[ForeignKey] = &[ForeignKey::optional("project", "project_id")];
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
        if let Some(version) = mutation.text("version")
            && version.trim().is_empty()
        {
            return Err(Error::validation("TemplateVersion.version must not be blank"));
        }
        Ok(())
    }
}
