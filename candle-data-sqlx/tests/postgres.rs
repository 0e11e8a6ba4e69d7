//! Tests against a live PostgreSQL server.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -p candle-data-sqlx -- --ignored`.

use candle_data::{adapt, Joiner, Lookup, SessionConfig, Statement};
use candle_data_sqlx::prelude::*;
use sqlx::Connection as _;
use std::sync::Arc;
use std::time::Duration;

fn database_url() -> String {
    std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a scratch database")
}

fn unique(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

async fn ddl(sql: &str) {
    let mut conn = sqlx::PgConnection::connect(&database_url()).await.unwrap();
    sqlx::raw_sql(sql).execute(&mut conn).await.unwrap();
    conn.close().await.unwrap();
}

fn session() -> Arc<PgSession> {
    let config = SessionConfig::default()
        .with_url(database_url())
        .with_application_name("candle-tests")
        .with_statement_timeout(Duration::from_secs(5));
    Arc::new(PgSession::with_config(config))
}

async fn widgets_table() -> String {
    let table = unique("widgets");
    ddl(&format!(
        "CREATE TABLE {table} (id serial PRIMARY KEY, name text, qty integer, \
         created_at timestamptz NOT NULL DEFAULT now(), tag uuid, meta jsonb, price numeric(10, 2))"
    ))
    .await;
    table
}

#[tokio::test]
#[ignore]
async fn test_widget_lifecycle() {
    let table = widgets_table().await;
    let session = session();
    let widgets = PgModel::named(table.as_str(), session.clone()).unwrap();

    let mut w = widgets.insert(fields! { "name" => "a" }).await.unwrap();
    let id = w.id().cloned().unwrap();
    assert!(matches!(id, Value::Int(_)));
    assert!(matches!(w["created_at"], Value::Timestamp(_)));
    assert_eq!(w["qty"], Value::Null);

    w.set("name", "b").unwrap();
    w.set("qty", 3).unwrap();
    widgets.save(&mut w).await.unwrap();

    let fetched = widgets.get(id.clone()).await.unwrap().unwrap();
    assert_eq!(fetched["name"], Value::from("b"));
    assert_eq!(fetched["qty"], Value::Int(3));

    for criteria in [fields! { "name" => "b" }, fields! { "name" => "zzz" }] {
        for joiner in [Joiner::And, Joiner::Or] {
            assert_eq!(
                widgets.exists(&criteria, joiner).await.unwrap(),
                !widgets.find_where(&criteria, joiner).await.unwrap().is_empty()
            );
        }
    }
    assert!(widgets
        .exists(&fields! { "name" => "b" }, Joiner::And)
        .await
        .unwrap());
    assert!(widgets.delete(&mut w).await.unwrap());
    assert!(widgets.get(id).await.unwrap().is_none());
    assert!(!widgets
        .exists(&fields! { "name" => "b" }, Joiner::And)
        .await
        .unwrap());

    session.close().await.unwrap();
    ddl(&format!("DROP TABLE {table}")).await;
}

#[tokio::test]
#[ignore]
async fn test_uncommitted_insert_is_invisible_elsewhere() {
    let table = widgets_table().await;
    let writer = session();
    let reader = session();
    let writes = PgModel::named(table.as_str(), writer.clone()).unwrap();
    let reads = PgModel::named(table.as_str(), reader.clone()).unwrap();

    let w = writes
        .insert_with(fields! { "name" => "pending" }, WriteOptions::no_commit())
        .await
        .unwrap();
    let id = w.id().cloned().unwrap();
    assert!(reads.get(id.clone()).await.unwrap().is_none());
    reader.rollback().await.unwrap();

    writer.commit().await.unwrap();
    assert!(reads.get(id).await.unwrap().is_some());

    writer.close().await.unwrap();
    reader.close().await.unwrap();
    ddl(&format!("DROP TABLE {table}")).await;
}

#[tokio::test]
#[ignore]
async fn test_value_types_round_trip() {
    let table = widgets_table().await;
    let session = session();
    let widgets = PgModel::named(table.as_str(), session.clone()).unwrap();
    let tag = uuid::Uuid::new_v4();

    let w = widgets
        .insert(fields! {
            "name" => "typed",
            "tag" => tag,
            "meta" => serde_json::json!({ "colour": "red" }),
            "price" => 12.5,
            "created_at" => RawValue::new("TIMESTAMPTZ '2024-03-01 12:00:00+00'"),
        })
        .await
        .unwrap();

    assert_eq!(w["tag"], Value::Uuid(tag));
    assert_eq!(w["meta"], Value::Json(serde_json::json!({ "colour": "red" })));
    assert_eq!(w["price"], Value::Float(12.5));
    assert_eq!(w["created_at"].to_string(), "2024-03-01T12:00:00Z");

    let found = widgets
        .find_where(&fields! { "tag" => tag, "qty" => Value::Null }, Joiner::And)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    session.close().await.unwrap();
    ddl(&format!("DROP TABLE {table}")).await;
}

#[tokio::test]
#[ignore]
async fn test_fields_and_routines() {
    let table = widgets_table().await;
    let routine = unique("top_widgets");
    ddl(&format!(
        "CREATE FUNCTION {routine}(n integer) RETURNS SETOF {table} \
         LANGUAGE sql AS $$ SELECT * FROM {table} ORDER BY id DESC LIMIT n $$"
    ))
    .await;

    let session = session();
    let widgets = PgModel::named(table.as_str(), session.clone()).unwrap();
    assert_eq!(
        widgets.fields().await.unwrap(),
        vec!["id", "name", "qty", "created_at", "tag", "meta", "price"]
    );

    for name in ["a", "b", "c"] {
        widgets.insert(fields! { "name" => name }).await.unwrap();
    }
    let w = widgets.get_all().await.unwrap().remove(0);
    let top = match widgets.lookup(&w, &routine).await.unwrap() {
        Lookup::Routine(r) => r.call(&[Value::Int(2)]).await.unwrap(),
        other => panic!("expected routine, got {other:?}"),
    };
    assert_eq!(top.len(), 2);
    assert_eq!(top[0]["name"], Value::from("c"));

    let qualified = widgets
        .invoke_routine(&format!("public.{routine}"), &[Value::Int(1)])
        .await
        .unwrap();
    assert_eq!(qualified.len(), 1);
    assert!(matches!(
        widgets.invoke_routine(&format!("no_such_schema.{routine}"), &[]).await,
        Err(DataError::UnknownAttribute(_))
    ));

    assert!(matches!(
        widgets.routine("no_such_routine_anywhere").await,
        Err(DataError::UnknownAttribute(_))
    ));

    session.close().await.unwrap();
    ddl(&format!("DROP FUNCTION {routine}; DROP TABLE {table}")).await;
}

#[tokio::test]
#[ignore]
async fn test_adapted_literals_read_back_unchanged() {
    let session = session();
    let mut cursor = session.cursor().await.unwrap();
    for text in ["it's", r"C:\temp\new", r"it\'s", r"\\''\", "plain"] {
        let literal = adapt(&Value::from(text)).unwrap();
        let stmt = Statement::new(format!("SELECT {literal} AS v"), vec![]);
        let row = cursor.fetch_optional(&stmt).await.unwrap().unwrap();
        assert_eq!(row.get("v"), Some(&Value::from(text)), "literal {literal}");

        let stmt = Statement::new("SELECT $1::text AS v", vec![Value::from(text)]);
        let row = cursor.fetch_optional(&stmt).await.unwrap().unwrap();
        assert_eq!(row.get("v"), Some(&Value::from(text)));
    }
    drop(cursor);
    session.close().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_text_values_fill_date_enum_and_inet_columns() {
    let status = unique("status");
    let table = unique("people");
    ddl(&format!(
        "CREATE TYPE {status} AS ENUM ('active', 'retired'); \
         CREATE TABLE {table} (id serial PRIMARY KEY, name text, born date, \
         status {status}, addr inet, tags text[])"
    ))
    .await;

    let session = session();
    let people = PgModel::named(table.as_str(), session.clone()).unwrap();
    let p = people
        .insert(fields! {
            "name" => "ada",
            "born" => "1990-04-01",
            "status" => "active",
            "addr" => "10.0.0.1",
            "tags" => RawValue::new("ARRAY['x']"),
        })
        .await
        .unwrap();
    assert_eq!(p["born"].to_string(), "1990-04-01T00:00:00Z");
    assert_eq!(p["status"], Value::from("active"));
    assert_eq!(p["addr"], Value::from("10.0.0.1"));
    // arrays have no value form and are left out
    assert!(!p.contains_key("tags"));

    let found = people
        .find_where(&fields! { "status" => "active", "born" => "1990-04-01" }, Joiner::And)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    let mut all = people.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    let mut p = all.remove(0);
    assert_eq!(p["status"], Value::from("active"));

    p.set("status", "retired").unwrap();
    people.save(&mut p).await.unwrap();
    assert_eq!(p["status"], Value::from("retired"));
    assert_eq!(p["born"].to_string(), "1990-04-01T00:00:00Z");
    assert!(people
        .exists(&fields! { "tags" => RawValue::new("ARRAY['x']") }, Joiner::And)
        .await
        .unwrap());

    session.close().await.unwrap();
    ddl(&format!("DROP TABLE {table}; DROP TYPE {status}")).await;
}
