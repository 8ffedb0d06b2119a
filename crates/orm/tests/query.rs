//! Integration tests for statement rendering.
//!
//! Tests the public API as users would interact with it.

#![allow(missing_docs)]

mod common;

use common::{Environment, Project, assert_sql_contains};
use strata_orm::{
    DataType, Dialect, Entity, Filter, Join, ObjectId, Query, Schema, SchemaConfig, query_edge,
};

#[test]
fn select_basic() {
    let query = Environment::query().build(Dialect::Postgres).unwrap();
    assert_sql_contains(
        &query.sql,
        &[
            "SELECT environments.id, environments.name, environments.project_id, environments.description",
            "FROM environments",
        ],
    );
    assert_eq!(query.params.len(), 0);
}

#[test]
fn select_with_ordering_and_limits() {
    let query = Project::query()
        .r#where(Filter::eq("name", "billing"))
        .r#where(Filter::gt("revision", 3))
        .order_by(Some(Project::TABLE), "name")
        .order_by_desc(None, "create_time")
        .limit(10)
        .offset(5)
        .build(Dialect::Postgres)
        .unwrap();

    assert_sql_contains(
        &query.sql,
        &[
            "WHERE projects.name = $1 AND projects.revision > $2",
            "ORDER BY projects.name ASC, projects.create_time DESC",
            "LIMIT $3",
            "OFFSET $4",
        ],
    );

    assert_eq!(query.params.len(), 4);
    assert!(matches!(&query.params[0], DataType::Str(Some(s)) if s == "billing"));
    assert!(matches!(query.params[1], DataType::Int32(Some(3))));
    assert!(matches!(query.params[2], DataType::Uint64(Some(10))));
    assert!(matches!(query.params[3], DataType::Uint64(Some(5))));
}

#[test]
fn placeholders_follow_dialect() {
    let query = Project::query().r#where(Filter::eq("name", "billing"));

    assert_sql_contains(&query.build(Dialect::Postgres).unwrap().sql, &["projects.name = $1"]);
    assert_sql_contains(&query.build(Dialect::MySql).unwrap().sql, &["projects.name = ?"]);
    assert_sql_contains(&query.build(Dialect::Sqlite).unwrap().sql, &["projects.name = ?"]);
}

#[test]
fn logical_combinators() {
    let query = Project::query()
        .r#where(Filter::or(vec![
            Filter::is_null("description"),
            Filter::and(vec![Filter::like("name", "bill%"), Filter::not(Filter::eq("revision", 0))]),
        ]))
        .build(Dialect::Postgres)
        .unwrap();

    assert_sql_contains(
        &query.sql,
        &["WHERE projects.description IS NULL OR", "projects.name LIKE $1", "NOT", "projects.revision = $2"],
    );
    assert_eq!(query.params.len(), 2);
}

#[test]
fn empty_in_list_matches_nothing() {
    let query = Project::query()
        .r#where(Filter::r#in("id", Vec::<ObjectId>::new()))
        .build(Dialect::Sqlite)
        .unwrap();
    assert_sql_contains(&query.sql, &["WHERE FALSE"]);
    assert!(query.params.is_empty());

    let query = Project::query()
        .r#where(Filter::not_in("id", Vec::<ObjectId>::new()))
        .r#where(Filter::or(vec![]))
        .build(Dialect::Postgres)
        .unwrap();
    assert_sql_contains(&query.sql, &["WHERE TRUE", "FALSE"]);
    assert!(query.params.is_empty());
}

#[test]
fn join_with_qualified_filter() {
    let query = Environment::query()
        .join(Join::inner(
            "projects",
            Filter::col_eq("environments", "project_id", "projects", "id"),
        ))
        .r#where(Filter::table_eq("projects", "name", "billing"))
        .append_select("projects", "name", "project_name")
        .build(Dialect::Postgres)
        .unwrap();

    assert_sql_contains(
        &query.sql,
        &[
            "environments.description, projects.name AS project_name",
            "FROM environments",
            "INNER JOIN projects ON environments.project_id = projects.id",
            "WHERE projects.name = $1",
        ],
    );
}

#[test]
fn schema_config_qualifies_tables() {
    let client_schema = SchemaConfig::new("tenant");
    let query = Environment::query().has(Environment::PROJECT);
    let stmt = query.spec().statement(Dialect::Postgres, &client_schema).unwrap();

    assert_sql_contains(
        &stmt.sql,
        &["FROM tenant.environments", "IN (SELECT projects.id FROM tenant.projects)"],
    );
}

#[test]
fn has_edge_predicate() {
    let query = Project::query()
        .has_with(Project::ENVIRONMENTS, |q| q.r#where(Filter::eq("name", "prod")))
        .build(Dialect::Postgres)
        .unwrap();

    assert_sql_contains(
        &query.sql,
        &[
            "WHERE projects.id IN (SELECT environments.project_id FROM environments",
            "WHERE environments.project_id IS NOT NULL AND environments.name = $1)",
        ],
    );
}

#[test]
fn edge_query_is_distinct() {
    let project = Project {
        id: ObjectId::new(),
        ..Project::default()
    };
    let query = query_edge(&project, Project::ENVIRONMENTS).build(Dialect::Postgres).unwrap();

    assert_sql_contains(&query.sql, &["SELECT DISTINCT", "WHERE environments.project_id = $1"]);
    assert!(matches!(&query.params[0], DataType::Str(Some(id)) if *id == project.id.to_string()));
}

#[test]
fn row_locks_per_dialect() {
    let query: Query<Environment> = Environment::query().for_share();

    assert!(query.build(Dialect::Postgres).unwrap().sql.ends_with("FOR SHARE"));
    assert!(query.build(Dialect::MySql).unwrap().sql.ends_with("FOR SHARE"));
    assert!(!query.build(Dialect::Sqlite).unwrap().sql.contains("SHARE"));
}
