//! Integration tests for reference resolution and the validation cache.

#![allow(missing_docs)]

mod common;

use common::{Environment, Project, environment, project, setup};
use strata_orm::view::{self, Identity, Refer, ValidationCache};
use strata_orm::{Filter, ObjectId, Schema};

#[tokio::test]
async fn cache_deduplicates_lookups() {
    let (client, recorder) = setup().await;
    let billing = project(&client, "billing").await;
    recorder.reset();

    let mut cache = ValidationCache::new();
    let by_name = Refer::new("billing");
    let first: Project = view::resolve(&client, &mut cache, &by_name, "name", vec![]).await.unwrap();
    let second: Project = view::resolve(&client, &mut cache, &by_name, "name", vec![]).await.unwrap();
    assert_eq!(first.id, billing.id);
    assert_eq!(second.id, billing.id);
    assert_eq!(recorder.count(), 1);
    assert_eq!(cache.len(), 1);

    let by_id = Refer::new(billing.id.to_string());
    let third: Project = view::resolve(&client, &mut cache, &by_id, "name", vec![]).await.unwrap();
    assert_eq!(third.name, "billing");
    assert_eq!(recorder.count(), 2);

    let ids = cache.ids(&client, Project::query()).await.unwrap();
    let again = cache.ids(&client, Project::query()).await.unwrap();
    assert_eq!(ids, again);
    assert_eq!(recorder.count(), 3);
}

#[tokio::test]
async fn failed_lookups_are_not_cached() {
    let (client, recorder) = setup().await;
    let mut cache = ValidationCache::new();

    let missing = Refer::new("nope");
    for _ in 0..2 {
        let err = view::resolve::<Project>(&client, &mut cache, &missing, "name", vec![])
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }
    assert_eq!(recorder.count(), 2);
    assert!(cache.is_empty());

    let err = view::resolve::<Project>(&client, &mut cache, &Refer::new(" "), "name", vec![])
        .await
        .unwrap_err();
    assert!(err.is_blank_resource_refer());
    assert_eq!(err.to_string(), "Project: blank resource refer");
}

#[tokio::test]
async fn resolution_respects_scope() {
    let (client, _) = setup().await;
    let billing = project(&client, "billing").await;
    let search = project(&client, "search").await;
    environment(&client, &billing, "dev").await;
    let search_dev = environment(&client, &search, "dev").await;

    let mut cache = ValidationCache::new();
    let env: Environment = view::resolve(
        &client,
        &mut cache,
        &Refer::new("dev"),
        "name",
        vec![Filter::eq("project_id", search.id)],
    )
    .await
    .unwrap();
    assert_eq!(env.id, search_dev.id);

    let err = view::resolve::<Environment>(&client, &mut cache, &Refer::new("dev"), "name", vec![])
        .await
        .unwrap_err();
    assert!(err.is_not_singular(), "{err}");

    let scope = view::resolve_scope::<Project>(&client, &mut cache, None, "name").await.unwrap();
    assert!(scope.is_none());
    let scope = view::resolve_scope::<Project>(&client, &mut cache, Some(&Refer::new("")), "name")
        .await
        .unwrap();
    assert!(scope.is_none());
}

#[tokio::test]
async fn bulk_resolution_in_one_query() {
    let (client, recorder) = setup().await;
    let billing = project(&client, "billing").await;
    let search = project(&client, "search").await;
    recorder.reset();

    let mut cache = ValidationCache::new();
    let items = [
        Identity::Key(vec!["search".to_string()]),
        Identity::Id(billing.id),
        Identity::Key(vec!["billing".to_string()]),
    ];
    let resolved = view::resolve_all::<Project>(
        &client,
        &mut cache,
        &items,
        &["name"],
        |project| vec![project.name.clone()],
        vec![],
    )
    .await
    .unwrap();

    assert_eq!(
        resolved.iter().map(|p| p.id).collect::<Vec<_>>(),
        [search.id, billing.id, billing.id]
    );
    assert_eq!(recorder.count(), 1);

    let missing = ObjectId::new();
    let err = view::resolve_all::<Project>(
        &client,
        &mut cache,
        &[Identity::Id(billing.id), Identity::Id(missing)],
        &["name"],
        |project| vec![project.name.clone()],
        vec![],
    )
    .await
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("validation failed: cannot resolve Project items: {missing}")
    );
}

#[tokio::test]
async fn cached_queries_keep_their_eager_loads() {
    let (client, recorder) = setup().await;
    let billing = project(&client, "billing").await;
    environment(&client, &billing, "dev").await;
    recorder.reset();

    let mut cache = ValidationCache::new();
    let bare = cache.all(&client, Project::query()).await.unwrap();
    assert!(bare[0].edges.environments.get("environments").unwrap_err().is_not_loaded());

    let loaded =
        cache.all(&client, Project::query().with(Project::ENVIRONMENTS, |q| q)).await.unwrap();
    assert_eq!(loaded[0].edges.environments.get("environments").unwrap().len(), 1);
    assert_eq!(recorder.count(), 3);
    assert_eq!(cache.len(), 2);

    let again =
        cache.all(&client, Project::query().with(Project::ENVIRONMENTS, |q| q)).await.unwrap();
    assert_eq!(again[0].edges.environments.get("environments").unwrap()[0].name, "dev");
    assert_eq!(recorder.count(), 3);
}
