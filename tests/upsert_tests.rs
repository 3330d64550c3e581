mod common;

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tablebind::{
    Batch, BindingError, ConflictPolicy, Context, Entity, Error, ExecutionError, Row,
    SchemaError, TableDescriptor, UpdateExpr, Value,
};
use tokio_test::assert_ok;

#[allow(dead_code)]
#[derive(Entity)]
#[entity(table = "people")]
struct NameAsKey {
    #[column(primary_key)]
    id: i64,
    #[column(unique)]
    name: Option<String>,
}

fn created_at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn person(id: i64, email: &str, name: &str, version: i64) -> Row {
    vec![
        Value::Integer(id),
        email.into(),
        name.into(),
        Value::Integer(version),
        "active".into(),
        created_at().into(),
    ]
}

fn batch_of(table: &Arc<TableDescriptor>, rows: Vec<Row>) -> Batch {
    let mut batch = Batch::with_capacity(Arc::clone(table), rows.len());
    for row in rows {
        batch.push(row).unwrap();
    }
    batch
}

#[tokio::test]
async fn test_literal_upsert_is_idempotent() -> anyhow::Result<()> {
    let store = common::people_store().await;
    store.insert("people", person(1, "ann@x", "Annie", 1)).await?;
    let client = common::client(&store).await;
    let ctx = Context::background();
    let people = client.reflect_table(&ctx, "people").await?;

    let policy = ConflictPolicy::do_update(["email"])
        .set_literal("name", "Ann")
        .set_literal("status", "banned");
    let rows = vec![person(1, "ann@x", "ignored", 1)];

    client.upsert(&ctx, batch_of(&people, rows.clone()), &policy).await?;
    let once = store.rows("people").await?;
    client.upsert(&ctx, batch_of(&people, rows), &policy).await?;
    let twice = store.rows("people").await?;

    assert_eq!(once, twice);
    assert_eq!(once[0][2], Value::from("Ann"));
    assert_eq!(once[0][4], Value::from("banned"));
    assert_eq!(once.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_increment_accumulates_over_repeated_keys() -> anyhow::Result<()> {
    let store = common::versions_store(&[1]).await;
    let client = common::client(&store).await;
    let ctx = Context::background();
    let versions = client.reflect_table(&ctx, "versions").await?;

    let policy =
        ConflictPolicy::do_update(["id"]).set_expression("version", UpdateExpr::increment(1));
    let rows = vec![
        vec![Value::Integer(1), Value::Integer(1)],
        vec![Value::Integer(1), Value::Integer(1)],
    ];

    let affected = client.upsert(&ctx, batch_of(&versions, rows), &policy).await?;

    assert_eq!(affected, 2);
    assert_eq!(
        store.rows("versions").await?,
        vec![vec![Value::Integer(1), Value::Integer(3)]]
    );
    Ok(())
}

#[tokio::test]
async fn test_invalid_conflict_target_writes_nothing() -> anyhow::Result<()> {
    let store = common::people_store().await;
    let client = common::client(&store).await;
    let ctx = Context::background();
    let people = client.reflect_table(&ctx, "people").await?;

    let policy = ConflictPolicy::update_incoming(["name"], ["version"]);
    let err = client
        .upsert(&ctx, batch_of(&people, vec![person(1, "a@x", "A", 1)]), &policy)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        Error::Binding(BindingError::InvalidConflictTarget {
            table: "people".into(),
            columns: vec!["name".into()],
        })
    );
    assert_eq!(store.statement_count(), 0);
    assert!(store.rows("people").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unknown_assignment_column() -> anyhow::Result<()> {
    let store = common::people_store().await;
    let client = common::client(&store).await;
    let ctx = Context::background();
    let people = client.reflect_table(&ctx, "people").await?;

    let policy = ConflictPolicy::do_update(["id"]).set_literal("nickname", "x");
    let err = client
        .upsert(&ctx, batch_of(&people, vec![person(1, "a@x", "A", 1)]), &policy)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Binding(BindingError::UnknownColumn { ref column, .. }) if column == "nickname"
    ));
    assert_eq!(store.statement_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_do_nothing_counts_inserts_only() -> anyhow::Result<()> {
    let store = common::versions_store(&[5]).await;
    let client = common::client(&store).await;
    let ctx = Context::background();
    let versions = client.reflect_table(&ctx, "versions").await?;

    let rows = (1..=3)
        .map(|id| vec![Value::Integer(id), Value::Integer(1)])
        .collect();
    let affected = client
        .upsert(&ctx, batch_of(&versions, rows), &ConflictPolicy::do_nothing(["id"]))
        .await?;

    assert_eq!(affected, 2);
    assert_eq!(
        store.rows("versions").await?,
        vec![
            vec![Value::Integer(1), Value::Integer(5)],
            vec![Value::Integer(2), Value::Integer(1)],
            vec![Value::Integer(3), Value::Integer(1)],
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_multi_statement_batch_rolls_back() -> anyhow::Result<()> {
    let store = common::people_store().await;
    store.insert("people", person(10, "taken@x", "Owner", 1)).await?;
    let client = common::client(&store).await.with_max_rows_per_statement(1);
    let ctx = Context::background();
    let people = client.reflect_table(&ctx, "people").await?;

    let policy = ConflictPolicy::update_all_incoming(["id"], &people);
    let rows = vec![
        person(1, "a@x", "A", 1),
        person(2, "b@x", "B", 1),
        person(3, "taken@x", "C", 1),
    ];
    let err = client
        .upsert(&ctx, batch_of(&people, rows), &policy)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Execution(ExecutionError::ConstraintViolation(_))
    ));
    assert_eq!(store.rows("people").await?, vec![person(10, "taken@x", "Owner", 1)]);

    // The connection went back to the pool outside any transaction.
    let stats = client.stats();
    assert_eq!(stats.active_connections, 0);
    Ok(())
}

#[tokio::test]
async fn test_update_all_incoming_overwrites_non_key_columns() -> anyhow::Result<()> {
    let store = common::people_store().await;
    store.insert("people", person(1, "a@x", "Old", 1)).await?;
    let client = common::client(&store).await;
    let ctx = Context::background();
    let people = client.reflect_table(&ctx, "people").await?;

    let policy = ConflictPolicy::update_all_incoming(["email"], &people);
    let affected = assert_ok!(
        client
            .upsert(&ctx, batch_of(&people, vec![person(1, "a@x", "New", 7)]), &policy)
            .await
    );

    assert_eq!(affected, 1);
    assert_eq!(store.rows("people").await?, vec![person(1, "a@x", "New", 7)]);
    Ok(())
}

#[tokio::test]
async fn test_empty_batch_has_no_store_access() -> anyhow::Result<()> {
    let store = common::versions_store(&[]).await;
    let client = common::client(&store).await;
    let ctx = Context::background();
    let versions = client.reflect_table(&ctx, "versions").await?;
    store.set_available(false);

    let affected = client
        .upsert(&ctx, Batch::new(versions), &ConflictPolicy::do_nothing(["id"]))
        .await?;

    assert_eq!(affected, 0);
    assert_eq!(store.statement_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_large_batch_is_chunked() -> anyhow::Result<()> {
    let store = common::versions_store(&[]).await;
    let client = common::client(&store).await.with_max_rows_per_statement(100);
    let ctx = Context::background();
    let versions = client.reflect_table(&ctx, "versions").await?;

    let rows = (1..=250)
        .map(|id| vec![Value::Integer(id), Value::Integer(id % 3)])
        .collect();
    let affected = client
        .upsert(&ctx, batch_of(&versions, rows), &ConflictPolicy::do_nothing(["id"]))
        .await?;

    assert_eq!(affected, 250);
    assert_eq!(store.rows("versions").await?.len(), 250);
    assert_eq!(store.statement_count(), 3);
    Ok(())
}

#[tokio::test]
async fn test_rows_apply_in_batch_order() -> anyhow::Result<()> {
    let store = common::people_store().await;
    let client = common::client(&store).await;
    let ctx = Context::background();
    let people = client.reflect_table(&ctx, "people").await?;

    // Row 1 gives up x@x before row 2 claims it.
    let policy = ConflictPolicy::update_incoming(["id"], ["email"]);
    let rows = vec![
        person(1, "x@x", "A", 1),
        person(1, "y@x", "A", 1),
        person(2, "x@x", "B", 1),
    ];
    let affected = client.upsert(&ctx, batch_of(&people, rows), &policy).await?;

    assert_eq!(affected, 3);
    assert_eq!(
        store.rows("people").await?,
        vec![person(1, "y@x", "A", 1), person(2, "x@x", "B", 1)]
    );
    Ok(())
}

#[tokio::test]
async fn test_entity_cannot_invent_a_conflict_target() -> anyhow::Result<()> {
    let store = common::people_store().await;
    let client = common::client(&store).await;

    let err = client
        .reflect_entity::<NameAsKey>(&Context::background())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        Error::Schema(SchemaError::KeyMismatch {
            table: "people".into(),
            column: "name".into(),
            declared: "unique".into(),
            stored: "non-key".into(),
        })
    );
    assert_eq!(store.statement_count(), 0);
    assert!(store.rows("people").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unknown_target_column_is_invalid_target() -> anyhow::Result<()> {
    let store = common::versions_store(&[1]).await;
    let client = common::client(&store).await;
    let ctx = Context::background();
    let versions = client.reflect_table(&ctx, "versions").await?;

    let rows = vec![vec![Value::Integer(2), Value::Integer(1)]];
    let err = client
        .upsert(&ctx, batch_of(&versions, rows), &ConflictPolicy::do_nothing(["uid"]))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        Error::Binding(BindingError::InvalidConflictTarget {
            table: "versions".into(),
            columns: vec!["uid".into()],
        })
    );
    assert_eq!(store.statement_count(), 0);
    Ok(())
}
