//! Integration tests for the entity constraints and relations of the model.

#![allow(missing_docs)]

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{assert_sql_contains, connector, environment, project, service, setup, template};
use strata_model::{
    ClusterCost, Connector, Environment, EnvironmentConnectorRelationship, Project, SHAPE_CLASS,
    SHAPE_INSTANCE, Service, ServiceResource, Variable,
};
use strata_orm::{Dialect, Filter, Schema, SchemaConfig};

#[tokio::test]
async fn project_names_are_dns_labels() {
    let (client, _) = setup().await;

    let err = Project::create().set("name", "Not_A_Label").save(&client).await.unwrap_err();
    assert!(err.is_validation(), "{err}");

    let err = Project::create().save(&client).await.unwrap_err();
    assert_eq!(err.to_string(), "validation failed: missing required field \"Project.name\"");

    let billing = project(&client, "billing").await;
    assert!(billing.create_time.is_some());

    let err = billing.update_one().set("name", "payments").save(&client).await.unwrap_err();
    assert!(err.to_string().contains("immutable field \"Project.name\" cannot be changed"), "{err}");
}

#[tokio::test]
async fn required_edges_cannot_be_cleared() {
    let (client, _) = setup().await;
    let billing = project(&client, "billing").await;
    let dev = environment(&client, &billing, "dev").await;
    let api = service(&client, &dev, None, "api").await;
    let k8s = connector(&client, Some(&billing), "k8s").await;

    let err = dev.update_one().clear_edge("project").save(&client).await.unwrap_err();
    assert!(err.to_string().contains("clearing a required unique edge \"Environment.project\""));

    for edge in ["project", "environment"] {
        let err = api.update_one().clear_edge(edge).save(&client).await.unwrap_err();
        assert!(
            err.to_string().contains(&format!("clearing a required unique edge \"Service.{edge}\"")),
            "{err}"
        );
    }

    let binding = EnvironmentConnectorRelationship::create()
        .set("environment_id", dev.id)
        .set("connector_id", k8s.id)
        .save(&client)
        .await
        .unwrap();
    for edge in ["environment", "connector"] {
        let err = binding.update_one().clear_edge(edge).exec(&client).await.unwrap_err();
        assert!(err.is_validation(), "{err}");
    }

    let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    let cost = ClusterCost::create()
        .set("start_time", start)
        .set("end_time", start + Duration::hours(1))
        .set("minutes", 60.0)
        .set("connector_id", k8s.id)
        .set("cluster_name", "primary")
        .save(&client)
        .await
        .unwrap();
    let err = cost.update_one().clear_edge("connector").exec(&client).await.unwrap_err();
    assert!(err.to_string().contains("clearing a required unique edge \"ClusterCost.connector\""));
}

#[tokio::test]
async fn optional_edges_clear_their_foreign_key() {
    let (client, _) = setup().await;
    let billing = project(&client, "billing").await;
    let dev = environment(&client, &billing, "dev").await;
    let webapp = template(&client, None, "webapp", "v1").await;
    let api = service(&client, &dev, Some(&webapp), "api").await;
    assert_eq!(api.template_id, Some(webapp.id));

    let api = api.update_one().clear_edge("template").save(&client).await.unwrap();
    assert_eq!(api.template_id, None);

    let stored = Service::query().r#where(Filter::eq("id", api.id)).only(&client).await.unwrap();
    assert_eq!(stored.template_id, None);
}

#[tokio::test]
async fn create_requires_edges() {
    let (client, _) = setup().await;

    let err = Environment::create().set("name", "dev").save(&client).await.unwrap_err();
    assert!(err.to_string().contains("missing required edge \"Environment.project\""));

    let err = ClusterCost::create()
        .set("start_time", Utc::now())
        .set("end_time", Utc::now())
        .set("cluster_name", "primary")
        .save(&client)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("missing required edge \"ClusterCost.connector\""));
}

#[tokio::test]
async fn connectors_check_category_and_default_version() {
    let (client, _) = setup().await;
    let billing = project(&client, "billing").await;

    let global = connector(&client, None, "shared").await;
    assert!(global.is_global());
    assert_eq!(global.config_version, "v1");

    let scoped = connector(&client, Some(&billing), "k8s").await;
    assert!(!scoped.is_global());

    let err = Connector::create()
        .set("name", "misc")
        .set("category", "Spreadsheet")
        .set("connector_type", "Excel")
        .save(&client)
        .await
        .unwrap_err();
    assert!(err.is_validation(), "{err}");

    let err = scoped.update_one().set("category", "Custom").save(&client).await.unwrap_err();
    assert!(err.to_string().contains("immutable field \"Connector.category\""), "{err}");
}

#[tokio::test]
async fn cluster_costs_use_generated_ids() {
    let (client, _) = setup().await;
    let k8s = connector(&client, None, "k8s").await;
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();

    let mut ids = Vec::new();
    for hour in 0..2 {
        let cost = ClusterCost::create()
            .set("start_time", start + Duration::hours(hour))
            .set("end_time", start + Duration::hours(hour + 1))
            .set("minutes", 60.0)
            .set("connector_id", k8s.id)
            .set("cluster_name", "primary")
            .set("total_cost", 1.5)
            .save(&client)
            .await
            .unwrap();
        ids.push(cost.id);
    }
    assert!(ids[0] > 0);
    assert!(ids[1] > ids[0]);

    let err = ClusterCost::create()
        .set("start_time", start)
        .set("end_time", start - Duration::minutes(1))
        .set("connector_id", k8s.id)
        .set("cluster_name", "primary")
        .save(&client)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "validation failed: ClusterCost window ends before it starts");

    let connectors = Connector::query().with(Connector::COSTS, |q| q).all(&client).await.unwrap();
    assert_eq!(connectors[0].edges.costs.get("costs").unwrap().len(), 2);
}

#[tokio::test]
async fn variables_are_scoped() {
    let (client, _) = setup().await;
    let billing = project(&client, "billing").await;
    let dev = environment(&client, &billing, "dev").await;

    let err = Variable::create()
        .set("name", "has-dash")
        .set("value", "x")
        .save(&client)
        .await
        .unwrap_err();
    assert!(err.is_validation(), "{err}");

    let err = Variable::create()
        .set("name", "REGION")
        .set("value", "eu")
        .set("environment_id", dev.id)
        .save(&client)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "validation failed: an environment Variable must belong to a project"
    );

    let scoped = Variable::create()
        .set("name", "REGION")
        .set("value", "eu")
        .set("project_id", billing.id)
        .set("environment_id", dev.id)
        .save(&client)
        .await
        .unwrap();
    assert_eq!(scoped.environment_id, Some(dev.id));

    let loaded = Variable::query()
        .with(Variable::PROJECT, |q| q)
        .with(Variable::ENVIRONMENT, |q| q)
        .only(&client)
        .await
        .unwrap();
    assert_eq!(loaded.edges.project.get("project").unwrap().name, "billing");
    assert_eq!(loaded.edges.environment.get("environment").unwrap().name, "dev");
}

#[tokio::test]
async fn resource_tree_loads_through_self_references() {
    let (client, recorder) = setup().await;
    let billing = project(&client, "billing").await;
    let dev = environment(&client, &billing, "dev").await;
    let api = service(&client, &dev, None, "api").await;

    let resource = |name: &str, shape: &str| {
        ServiceResource::create()
            .set("project_id", billing.id)
            .set("service_id", api.id)
            .set("name", name.to_string())
            .set("mode", "managed")
            .set("resource_type", "kubernetes_deployment")
            .set("deployer_type", "Terraform")
            .set("shape", shape.to_string())
    };

    let class = resource("web", SHAPE_CLASS).save(&client).await.unwrap();
    let first = resource("web-0", SHAPE_INSTANCE)
        .set("class_id", class.id)
        .save(&client)
        .await
        .unwrap();
    let second = resource("web-1", SHAPE_INSTANCE)
        .set("class_id", class.id)
        .set("composition_id", first.id)
        .save(&client)
        .await
        .unwrap();

    let err = resource("nested", SHAPE_CLASS).set("class_id", class.id).save(&client).await;
    assert!(err.unwrap_err().is_validation());

    recorder.reset();
    let classes = ServiceResource::query()
        .r#where(Filter::eq("shape", SHAPE_CLASS))
        .with(ServiceResource::INSTANCES, |q| q.order_by(None, "name"))
        .all(&client)
        .await
        .unwrap();
    assert_eq!(recorder.count(), 2);
    let instances = classes[0].edges.instances.get("instances").unwrap();
    assert_eq!(instances.iter().map(|r| r.id).collect::<Vec<_>>(), [first.id, second.id]);

    let parents = ServiceResource::query()
        .r#where(Filter::eq("id", second.id))
        .with(ServiceResource::COMPOSITION, |q| q)
        .only(&client)
        .await
        .unwrap();
    assert_eq!(parents.edges.composition.get("composition").unwrap().id, first.id);
}

#[tokio::test]
async fn eager_fan_out_shares_children() {
    let (client, recorder) = setup().await;
    let billing = project(&client, "billing").await;
    let search = project(&client, "search").await;
    let dev = environment(&client, &billing, "dev").await;
    let prod = environment(&client, &billing, "prod").await;
    let staging = environment(&client, &search, "staging").await;
    recorder.reset();

    let envs = Environment::query()
        .r#where(Filter::r#in("id", [dev.id, prod.id, staging.id]))
        .order_by(None, "name")
        .with(Environment::PROJECT, |q| q)
        .all(&client)
        .await
        .unwrap();
    assert_eq!(recorder.count(), 2);

    let owners = envs
        .iter()
        .map(|env| env.edges.project.get("project").unwrap().name.clone())
        .collect::<Vec<_>>();
    assert_eq!(owners, ["billing", "billing", "search"]);

    let in_clause = &recorder.statements()[1];
    assert_eq!(in_clause.matches('?').count(), 2, "{in_clause}");
}

#[test]
fn schema_override_applies_to_every_table() {
    let config = SchemaConfig::new("tenant").with_table("projects", "shared");
    let query = Service::query().has(Service::PROJECT).has(Service::ENVIRONMENT);
    let stmt = query.spec().statement(Dialect::Postgres, &config).unwrap();
    assert_sql_contains(
        &stmt.sql,
        &[
            "FROM tenant.services",
            "IN (SELECT projects.id FROM shared.projects)",
            "IN (SELECT environments.id FROM tenant.environments)",
        ],
    );
}
