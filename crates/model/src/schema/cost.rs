use chrono::{DateTime, Utc};
use strata_orm::{Error, ForeignKey, Mutation, ObjectId, Relation, RelationKind, Result, Schema, ToOne, entity};

use super::Connector;

/// Edges of [`ClusterCost`].
#[derive(Debug, Clone, Default)]
pub struct ClusterCostEdges {
    /// The connector the cost was collected through.
    pub connector: ToOne<Connector>,
}

entity! {
    table = "cluster_costs",
    name = "ClusterCost",
    id = i64,
    edges = ClusterCostEdges,
    /// Cost of one cluster over a collection window.
    pub struct ClusterCost {
        pub start_time: DateTime<Utc>,
        pub end_time: DateTime<Utc>,
        pub minutes: f64,
        pub connector_id: ObjectId,
        pub cluster_name: String,
        pub total_cost: f64,
        pub currency: i32,
        pub allocation_cost: f64,
        pub idle_cost: f64,
        pub management_cost: f64,
    }
}

impl ClusterCost {
    /// The connector named by `connector_id`.
    pub const CONNECTOR: Relation<Self, Connector> = Relation {
        name: "connector",
        kind: RelationKind::BelongsTo {
            column: "connector_id",
            key: |cost| Some(cost.connector_id),
            edge: |cost| &mut cost.edges.connector,
        },
    };
}

impl Schema for ClusterCost {
    fn required() -> &'static [&'static str] {
        &["start_time", "end_time", "cluster_name"]
    }

    fn immutable() -> &'static [&'static str] {
        &["start_time", "end_time", "connector_id", "cluster_name"]
    }

    fn foreign_keys() -> &'static [ForeignKey] {
        const KEYS: &[ForeignKey] = &[ForeignKey::required("connector", "connector_id")];
        KEYS
    }

    fn validate(mutation: &Mutation) -> Result<()> {
        if let (Some(start), Some(end)) = (mutation.time("start_time"), mutation.time("end_time"))
            && end < start
        {
            return Err(Error::validation("ClusterCost window ends before it starts"));
        }
        Ok(())
    }
}
