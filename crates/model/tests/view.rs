//! Integration tests for the wire-facing inputs and outputs.

#![allow(missing_docs)]

mod common;

use chrono::Duration;
use common::{connector, environment, project, service, setup, template};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use strata_model::view::*;
use strata_model::{Environment, Project, Service, TemplateVersion, Variable};
use strata_orm::{Create, CreateBulk, Filter, Refer, Schema, ValidationCache};

fn input<T: DeserializeOwned>(value: Value) -> T {
    serde_json::from_value(value).expect("should deserialize input")
}

fn members(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

#[tokio::test]
async fn project_lifecycle() {
    let (client, _) = setup().await;

    let mut create: ProjectCreateInput =
        input(json!({"name": "billing", "description": "invoices", "labels": {"team": "pay"}}));
    create.validate(&client).await.unwrap();
    let created = Create::from_entity(&create.model().unwrap()).save(&client).await.unwrap();
    assert_eq!(created.description, "invoices");

    let mut update: ProjectUpdateInput =
        input(json!({"name": "billing", "description": "all invoices"}));
    update.validate(&client).await.unwrap();
    let updated = update.update().unwrap().save(&client).await.unwrap();
    assert_eq!(updated.description, "all invoices");
    assert!(updated.labels.is_empty());
    assert_eq!(updated.create_time, created.create_time);

    let output = ProjectOutput::from(&updated);
    let wire = serde_json::to_value(&output).unwrap();
    assert_eq!(wire["name"], "billing");
    assert!(wire.get("labels").is_none());
    assert!(wire.get("environments").is_none());

    let mut delete: ProjectDeleteInput = input(json!({"name": "billing"}));
    delete.validate(&client).await.unwrap();
    Project::delete_one_id(delete.model().unwrap().id).exec(&client).await.unwrap();
    assert_eq!(Project::query().count(&client).await.unwrap(), 0);
}

#[tokio::test]
async fn unvalidated_inputs_have_no_model() {
    let update: ProjectUpdateInput = input(json!({"name": "billing"}));
    let err = update.model().unwrap_err();
    assert_eq!(err.to_string(), "invalid mutation state: Project input has not been validated");

    let mut create: ProjectCreateInputs = input(json!({"items": []}));
    let (client, _) = setup().await;
    let err = create.validate(&client).await.unwrap_err();
    assert_eq!(err.to_string(), "validation failed: Project: items are required");

    let mut create: ProjectCreateInputs =
        input(json!({"items": [{"name": "billing"}, {"name": "billing"}]}));
    let err = create.validate(&client).await.unwrap_err();
    assert!(err.to_string().contains("duplicate name"), "{err}");
}

#[tokio::test]
async fn patch_rejects_immutable_changes() {
    let (client, _) = setup().await;
    let billing = project(&client, "billing").await;
    let current = serde_json::to_value(ProjectOutput::from(&billing)).unwrap();

    let mut rename = ProjectPatchInput::default();
    rename.refer = Refer::new("billing");
    rename.fields = members(json!({"name": "payments"}));
    let err = rename.validate(&client).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "validation failed: immutable field \"Project.name\" cannot be changed"
    );

    let shifted = billing.create_time.unwrap() + Duration::milliseconds(1);
    let mut backdate = ProjectPatchInput::default();
    backdate.refer = Refer::new(billing.id.to_string());
    backdate.fields = members(json!({"createTime": shifted}));
    let err = backdate.validate(&client).await.unwrap_err();
    assert!(err.to_string().contains("\"Project.createTime\""), "{err}");

    let mut patch = ProjectPatchInput::default();
    patch.refer = Refer::new("billing");
    patch.fields = members(json!({
        "name": current["name"],
        "createTime": current["createTime"],
        "description": "patched",
        "labels": {"tier": "gold"},
    }));
    patch.validate(&client).await.unwrap();
    let patched = patch.update().unwrap().save(&client).await.unwrap();
    assert_eq!(patched.description, "patched");
    assert_eq!(patched.labels.get("tier").map(String::as_str), Some("gold"));

    let mut clear = ProjectPatchInput::default();
    clear.refer = Refer::new("billing");
    clear.fields = members(json!({"labels": null}));
    clear.validate(&client).await.unwrap();
    let cleared = clear.update().unwrap().save(&client).await.unwrap();
    assert!(cleared.labels.is_empty());
    assert_eq!(cleared.description, "patched");
}

#[tokio::test]
async fn bulk_delete_resolves_in_one_query() {
    let (client, recorder) = setup().await;
    let billing = project(&client, "billing").await;
    let search = project(&client, "search").await;
    project(&client, "audit").await;
    recorder.reset();

    let mut delete: ProjectDeleteInputs = input(json!({
        "items": [{"name": "search"}, {"id": billing.id}, {"name": "billing"}],
    }));
    delete.validate(&client).await.unwrap();
    assert_eq!(recorder.count(), 1);
    assert_eq!(delete.ids().unwrap(), [search.id, billing.id, billing.id]);

    let deleted = Project::delete()
        .r#where(Filter::r#in("id", delete.ids().unwrap()))
        .exec(&client)
        .await
        .unwrap();
    assert_eq!(deleted, 2);

    let mut missing: ProjectDeleteInputs =
        input(json!({"items": [{"name": "audit"}, {"name": "nope"}]}));
    let err = missing.validate(&client).await.unwrap_err();
    assert!(err.is_validation(), "{err}");
    assert_eq!(err.to_string(), "validation failed: cannot resolve Project items: nope");
    assert!(missing.model().is_err());
}

#[tokio::test]
async fn environments_require_the_project_route() {
    let (client, recorder) = setup().await;
    let billing = project(&client, "billing").await;

    let mut orphan: EnvironmentCreateInput = input(json!({"name": "dev"}));
    let err = orphan.validate(&client).await.unwrap_err();
    assert_eq!(err.to_string(), "validation failed: must be queried under the Project route");

    let mut cache = ValidationCache::new();
    let mut create: EnvironmentCreateInputs = input(json!({
        "project": "billing",
        "items": [{"name": "dev"}, {"name": "prod"}],
    }));
    recorder.reset();
    create.validate_with(&client, &mut cache).await.unwrap();
    create.validate_with(&client, &mut cache).await.unwrap();
    assert_eq!(recorder.count(), 1);

    let envs = Environment::create_bulk(
        create.model().unwrap().iter().map(Create::from_entity),
    )
    .save(&client)
    .await
    .unwrap();
    assert!(envs.iter().all(|env| env.project_id == billing.id));

    let mut query: EnvironmentQueryInput =
        input(json!({"project": billing.id, "name": "prod"}));
    query.validate_with(&client, &mut cache).await.unwrap();
    let prod = query.model().unwrap();
    assert_eq!(prod.name, "prod");

    let output = EnvironmentOutput::from(&prod);
    assert_eq!(output.project.as_ref().map(|p| p.id), Some(billing.id));
    assert_eq!(output.project.as_ref().map(|p| p.name.as_str()), Some(""));

    let mut patch = EnvironmentPatchInput::default();
    patch.project = Some(Refer::new("billing"));
    patch.refer = Refer::new("prod");
    patch.fields = members(json!({"project": {"id": project(&client, "other").await.id}}));
    let err = patch.validate(&client).await.unwrap_err();
    assert!(err.to_string().contains("\"Environment.project\""), "{err}");
}

#[tokio::test]
async fn services_resolve_templates_in_one_query() {
    let (client, recorder) = setup().await;
    let billing = project(&client, "billing").await;
    let search = project(&client, "search").await;
    environment(&client, &billing, "dev").await;
    let global = template(&client, None, "webapp", "v1").await;
    let scoped = template(&client, Some(&billing), "worker", "v2").await;
    template(&client, Some(&search), "private", "v1").await;
    recorder.reset();

    let mut create: ServiceCreateInputs = input(json!({
        "project": "billing",
        "environment": "dev",
        "items": [
            {"name": "api", "template": {"name": "webapp", "version": "v1"}},
            {"name": "jobs", "template": {"id": scoped.id}},
            {"name": "static"},
            {"name": "web", "template": {"name": "webapp", "version": "v1"}},
        ],
    }));
    create.validate(&client).await.unwrap();
    assert_eq!(recorder.count(), 3);

    let services = create.model().unwrap();
    assert_eq!(
        services.iter().map(|s| s.template_id).collect::<Vec<_>>(),
        [Some(global.id), Some(scoped.id), None, Some(global.id)]
    );
    let saved = Service::create_bulk(services.iter().map(Create::from_entity))
        .save(&client)
        .await
        .unwrap();
    assert_eq!(saved.len(), 4);

    let mut foreign: ServiceCreateInput = input(json!({
        "project": "billing",
        "environment": "dev",
        "name": "leak",
        "template": {"name": "private", "version": "v1"},
    }));
    let err = foreign.validate(&client).await.unwrap_err();
    assert!(err.is_not_found(), "{err}");

    let mut update: ServiceUpdateInput = input(json!({
        "project": "billing",
        "environment": "dev",
        "name": "static",
        "description": "assets",
        "template": {"name": "worker", "version": "v2"},
    }));
    update.validate(&client).await.unwrap();
    let upgraded = update.update().unwrap().save(&client).await.unwrap();
    assert_eq!(upgraded.template_id, Some(scoped.id));
    assert_eq!(upgraded.description, "assets");

    let mut patch = ServicePatchInput::default();
    patch.project = Some(Refer::new("billing"));
    patch.environment = Some(Refer::new("dev"));
    patch.refer = Refer::new("api");
    patch.fields = members(json!({"template": {"id": scoped.id}}));
    let err = patch.validate(&client).await.unwrap_err();
    assert!(err.to_string().contains("\"Service.template\""), "{err}");
}

#[tokio::test]
async fn ambiguous_template_keys_are_rejected_in_bulk() {
    let (client, _) = setup().await;
    let billing = project(&client, "billing").await;
    environment(&client, &billing, "dev").await;
    template(&client, None, "webapp", "v1").await;
    template(&client, Some(&billing), "webapp", "v1").await;

    let mut single: ServiceCreateInput = input(json!({
        "project": "billing",
        "environment": "dev",
        "name": "api",
        "template": {"name": "webapp", "version": "v1"},
    }));
    let err = single.validate(&client).await.unwrap_err();
    assert!(err.is_not_singular(), "{err}");

    let mut bulk: ServiceCreateInputs = input(json!({
        "project": "billing",
        "environment": "dev",
        "items": [{"name": "api", "template": {"name": "webapp", "version": "v1"}}],
    }));
    let err = bulk.validate(&client).await.unwrap_err();
    assert!(err.is_not_singular(), "{err}");
}

#[tokio::test]
async fn service_outputs_expose_loaded_edges() {
    let (client, _) = setup().await;
    let billing = project(&client, "billing").await;
    let dev = environment(&client, &billing, "dev").await;
    let webapp = template(&client, None, "webapp", "v1").await;
    service(&client, &dev, Some(&webapp), "api").await;

    let loaded = Service::query()
        .with(Service::ENVIRONMENT, |q| q.with(Environment::PROJECT, |q| q))
        .with(Service::TEMPLATE, |q| q)
        .only(&client)
        .await
        .unwrap();
    let output = ServiceOutput::from(&loaded);
    let env = output.environment.unwrap();
    assert_eq!(env.name, "dev");
    assert_eq!(env.project.map(|p| p.name), Some("billing".to_string()));
    assert_eq!(output.template.map(|t| t.version), Some("v1".to_string()));
    assert_eq!(output.project.map(|p| p.id), Some(billing.id));
}

#[tokio::test]
async fn template_versions_use_composite_keys() {
    let (client, _) = setup().await;
    let billing = project(&client, "billing").await;
    let v1 = template(&client, Some(&billing), "webapp", "v1").await;
    let v2 = template(&client, Some(&billing), "webapp", "v2").await;

    let mut query: TemplateVersionQueryInput =
        input(json!({"project": "billing", "name": "webapp", "version": "v2"}));
    query.validate(&client).await.unwrap();
    assert_eq!(query.model().unwrap().id, v2.id);

    let mut partial: TemplateVersionQueryInput =
        input(json!({"project": "billing", "name": "webapp"}));
    assert!(partial.validate(&client).await.unwrap_err().is_validation());

    let mut delete: TemplateVersionDeleteInputs = input(json!({
        "project": "billing",
        "items": [{"name": "webapp", "version": "v1"}, {"id": v2.id}],
    }));
    delete.validate(&client).await.unwrap();
    let ids = delete.model().unwrap().iter().map(|t| t.id).collect::<Vec<_>>();
    assert_eq!(ids, [v1.id, v2.id]);

    let mut by_name = TemplateVersionPatchInput::default();
    by_name.project = Some(Refer::new("billing"));
    by_name.refer = Refer::new("webapp");
    by_name.fields = members(json!({"source": "https://example.com/webapp?ref=main"}));
    let err = by_name.validate(&client).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "validation failed: TemplateVersion: patches address versions by id"
    );

    let mut by_id = TemplateVersionPatchInput::default();
    by_id.project = Some(Refer::new("billing"));
    by_id.refer = Refer::new(v1.id.to_string());
    by_id.fields = members(json!({"source": "https://example.com/webapp?ref=main"}));
    by_id.validate(&client).await.unwrap();
    let patched = by_id.update().unwrap().save(&client).await.unwrap();
    assert_eq!(patched.source, "https://example.com/webapp?ref=main");

    for source in [Value::Null, json!("  ")] {
        let mut blank = TemplateVersionPatchInput::default();
        blank.project = Some(Refer::new("billing"));
        blank.refer = Refer::new(v1.id.to_string());
        blank.fields = members(json!({"source": source}));
        let err = blank.validate(&client).await.unwrap_err();
        assert_eq!(err.to_string(), "validation failed: TemplateVersion: source is required");
    }

    assert_eq!(
        TemplateVersion::query().r#where(Filter::eq("name", "webapp")).count(&client).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn connectors_are_global_or_scoped() {
    let (client, _) = setup().await;
    let billing = project(&client, "billing").await;
    let shared = connector(&client, None, "k8s").await;
    let local = connector(&client, Some(&billing), "k8s").await;

    let mut global: ConnectorQueryInput = input(json!({"name": "k8s"}));
    global.validate(&client).await.unwrap();
    assert_eq!(global.model().unwrap().id, shared.id);

    let mut scoped: ConnectorQueryInput = input(json!({"project": "billing", "name": "k8s"}));
    scoped.validate(&client).await.unwrap();
    assert_eq!(scoped.model().unwrap().id, local.id);

    let mut create: ConnectorCreateInput = input(json!({
        "project": "billing",
        "name": "aws",
        "category": "CloudProvider",
        "type": "AWS",
        "configData": {"region": "eu-west-1"},
        "enableFinOps": true,
    }));
    create.validate(&client).await.unwrap();
    let aws = Create::from_entity(&create.model().unwrap()).save(&client).await.unwrap();
    assert_eq!(aws.project_id, Some(billing.id));
    assert_eq!(aws.config_version, "v1");
    assert!(aws.enable_fin_ops);

    let mut patch = ConnectorPatchInput::default();
    patch.project = Some(Refer::new("billing"));
    patch.refer = Refer::new("aws");
    patch.fields = members(json!({"enableFinOps": false, "configData": {"region": null}}));
    patch.validate(&client).await.unwrap();
    let patched = patch.update().unwrap().save(&client).await.unwrap();
    assert!(!patched.enable_fin_ops);
    assert!(patched.config_data.is_empty());

    let mut retype = ConnectorPatchInput::default();
    retype.project = Some(Refer::new("billing"));
    retype.refer = Refer::new("aws");
    retype.fields = members(json!({"type": "GCP"}));
    let err = retype.validate(&client).await.unwrap_err();
    assert!(err.to_string().contains("\"Connector.type\""), "{err}");
}

#[tokio::test]
async fn variables_hide_sensitive_values() {
    let (client, _) = setup().await;
    let billing = project(&client, "billing").await;
    environment(&client, &billing, "dev").await;

    let mut orphan: VariableCreateInput =
        input(json!({"environment": "dev", "name": "TOKEN", "value": "x"}));
    let err = orphan.validate(&client).await.unwrap_err();
    assert_eq!(err.to_string(), "validation failed: must be queried under the Project route");

    let mut create: VariableCreateInputs = input(json!({
        "project": "billing",
        "environment": "dev",
        "items": [
            {"name": "TOKEN", "value": "s3cr3t", "sensitive": true},
            {"name": "REGION", "value": "eu"},
        ],
    }));
    create.validate(&client).await.unwrap();
    let saved = CreateBulk::new(create.model().unwrap().iter().map(Create::from_entity))
        .save(&client)
        .await
        .unwrap();
    let outputs = expose_variables(&saved);
    assert_eq!(outputs[0].value, "");
    assert_eq!(outputs[1].value, "eu");

    let mut patch = VariablePatchInput::default();
    patch.project = Some(Refer::new("billing"));
    patch.environment = Some(Refer::new("dev"));
    patch.refer = Refer::new("TOKEN");
    patch.fields = members(json!({"description": "api token"}));
    patch.validate(&client).await.unwrap();
    let patched = patch.update().unwrap().save(&client).await.unwrap();
    assert_eq!(patched.value, "s3cr3t");
    assert_eq!(patched.description, "api token");

    let mut global: VariableQueryInput = input(json!({"name": "TOKEN"}));
    assert!(global.validate(&client).await.unwrap_err().is_not_found());

    let mut delete: VariableDeleteInputs = input(json!({
        "project": "billing",
        "environment": "dev",
        "items": [{"name": "TOKEN"}, {"name": "REGION"}],
    }));
    delete.validate(&client).await.unwrap();
    for variable in delete.model().unwrap() {
        Variable::delete_one(&variable).exec(&client).await.unwrap();
    }
    assert_eq!(Variable::query().count(&client).await.unwrap(), 0);
}
