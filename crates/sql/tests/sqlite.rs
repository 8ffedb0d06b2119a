//! Integration tests for the default `SQLite` backend.

#![allow(missing_docs)]

use strata_sql::{
    Backend, ConnectOptions, Connection, ConstraintViolation, DataType, Dialect, Driver,
    SqlDefault,
};

async fn connect() -> SqlDefault {
    SqlDefault::connect_with(ConnectOptions {
        database: ":memory:".to_string(),
    })
    .await
    .expect("connect")
}

#[tokio::test]
async fn sqlite_operations() {
    let conn = connect().await;
    assert_eq!(conn.dialect(), Dialect::Sqlite);

    let result = conn
        .exec(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT UNIQUE, age INTEGER)".to_string(),
            vec![],
        )
        .await
        .expect("create table");
    assert_eq!(result.rows_affected, 0);

    let result = conn
        .exec(
            "INSERT INTO users (name, age) VALUES (?, ?)".to_string(),
            vec![DataType::Str(Some("Alice".to_string())), DataType::Int32(Some(30))],
        )
        .await
        .expect("insert");
    assert_eq!(result.rows_affected, 1);
    assert_eq!(result.last_insert_id, Some(1));

    conn.exec(
        "INSERT INTO users (name, age) VALUES (?, ?)".to_string(),
        vec![DataType::Str(Some("Bob".to_string())), DataType::Int32(None)],
    )
    .await
    .expect("insert");

    let rows = conn
        .query("SELECT id, name, age FROM users ORDER BY name".to_string(), vec![])
        .await
        .expect("query");

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].fields[1].name, "name");
    assert_eq!(rows[0].get("name"), Some(&DataType::Str(Some("Alice".to_string()))));
    assert!(rows[1].get("age").expect("age column").is_null());
}

#[tokio::test]
async fn returning_clause() {
    let conn = connect().await;
    conn.execute_batch("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)").unwrap();

    let rows = conn
        .query(
            "INSERT INTO items (name) VALUES (?) RETURNING id".to_string(),
            vec![DataType::Str(Some("widget".to_string()))],
        )
        .await
        .expect("insert returning");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&DataType::Int64(Some(1))));
}

#[tokio::test]
async fn constraint_violation() {
    let conn = connect().await;
    conn.execute_batch("CREATE TABLE tags (name TEXT PRIMARY KEY)").unwrap();

    let insert = || {
        conn.exec(
            "INSERT INTO tags (name) VALUES (?)".to_string(),
            vec![DataType::Str(Some("dup".to_string()))],
        )
    };
    insert().await.expect("first insert");

    let err = insert().await.expect_err("duplicate key");
    assert!(err.downcast_ref::<ConstraintViolation>().is_some());
}

#[tokio::test]
async fn transaction_rollback() {
    let conn = connect().await;
    conn.execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)").unwrap();

    let tx = conn.begin().await.expect("begin");
    tx.exec(
        "INSERT INTO notes (body) VALUES (?)".to_string(),
        vec![DataType::Str(Some("draft".to_string()))],
    )
    .await
    .expect("insert in transaction");
    tx.rollback().await.expect("rollback");

    let rows = conn.query("SELECT id FROM notes".to_string(), vec![]).await.expect("query");
    assert!(rows.is_empty());

    // finished transactions reject further work
    tx.commit().await.expect_err("already finished");
    tx.query("SELECT 1".to_string(), vec![]).await.expect_err("already finished");
}

#[tokio::test]
async fn transaction_commit() {
    let conn = connect().await;
    conn.execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)").unwrap();

    let tx = conn.begin().await.expect("begin");
    tx.exec(
        "INSERT INTO notes (body) VALUES (?)".to_string(),
        vec![DataType::Str(Some("final".to_string()))],
    )
    .await
    .expect("insert in transaction");
    tx.commit().await.expect("commit");

    let rows = conn.query("SELECT body FROM notes".to_string(), vec![]).await.expect("query");
    assert_eq!(rows.len(), 1);
}
