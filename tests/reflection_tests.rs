mod common;

use chrono::NaiveDateTime;
use tablebind::core::FromValue;
use tablebind::storage::{StoredColumn, TableSchema};
use tablebind::{
    Context, Entity, Error, ExecutionError, ReflectSource, SchemaError, SemanticType, Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    Banned,
}

impl From<Status> for Value {
    fn from(status: Status) -> Self {
        match status {
            Status::Active => Value::Text("active".into()),
            Status::Banned => Value::Text("banned".into()),
        }
    }
}

impl FromValue for Status {
    fn from_value(value: &Value) -> Result<Self, ExecutionError> {
        match value.as_str() {
            Some("active") => Ok(Status::Active),
            Some("banned") => Ok(Status::Banned),
            _ => Err(ExecutionError::Decode(format!("unknown status {}", value))),
        }
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, Entity)]
#[entity(table = "people")]
struct Person {
    #[column(primary_key)]
    id: i64,
    #[column(unique)]
    email: String,
    name: Option<String>,
    version: i32,
    #[column(enumeration)]
    status: Status,
    created_at: NaiveDateTime,
}

#[allow(dead_code)]
#[derive(Entity)]
#[entity(table = "people")]
struct EmailAsTimestamp {
    #[column(primary_key)]
    id: i64,
    email: NaiveDateTime,
}

#[allow(dead_code)]
#[derive(Entity)]
#[entity(table = "people")]
struct WithNickname {
    #[column(primary_key)]
    id: i64,
    nickname: String,
}

#[allow(dead_code)]
#[derive(Entity)]
#[entity(table = "people")]
struct EmailWithoutKey {
    #[column(primary_key)]
    id: i64,
    email: String,
}

#[allow(dead_code)]
#[derive(Entity)]
struct Version {
    #[column(primary_key)]
    id: i64,
    #[column(name = "version")]
    number: u8,
}

#[tokio::test]
async fn test_repeated_reflection_is_equal() -> anyhow::Result<()> {
    let store = common::people_store().await;
    let client = common::client(&store).await;
    let ctx = Context::background();

    let first = client.reflect_table(&ctx, "people").await?;
    let second = client.reflect_table(&ctx, "people").await?;

    assert_eq!(first, second);
    let names: Vec<&str> = first.column_names().collect();
    assert_eq!(
        names,
        vec!["id", "email", "name", "version", "status", "created_at"]
    );
    Ok(())
}

#[tokio::test]
async fn test_reflected_types_and_keys() -> anyhow::Result<()> {
    let store = common::people_store().await;
    let client = common::client(&store).await;

    let people = client.reflect_table(&Context::background(), "people").await?;

    let types: Vec<SemanticType> = people.columns().iter().map(|c| c.semantic_type).collect();
    assert_eq!(
        types,
        vec![
            SemanticType::Integer,
            SemanticType::Text,
            SemanticType::Text,
            SemanticType::Integer,
            SemanticType::Enumeration,
            SemanticType::Timestamp,
        ]
    );
    assert_eq!(people.keys(), vec![vec!["id"], vec!["email"]]);
    Ok(())
}

#[tokio::test]
async fn test_missing_table() {
    let store = common::people_store().await;
    let client = common::client(&store).await;

    let err = client.reflect_table(&Context::background(), "ghosts").await.unwrap_err();
    assert_eq!(err, Error::Schema(SchemaError::NotFound("ghosts".into())));
}

#[tokio::test]
async fn test_unsupported_storage_type() {
    let store = common::people_store().await;
    store
        .create_table(
            TableSchema::new("files")
                .column(StoredColumn::new("id", "bigint").primary_key())
                .column(StoredColumn::new("payload", "blob")),
        )
        .await
        .unwrap();
    let client = common::client(&store).await;

    let err = client.reflect_table(&Context::background(), "files").await.unwrap_err();
    assert_eq!(
        err,
        Error::Schema(SchemaError::Unsupported {
            table: "files".into(),
            column: "payload".into(),
            storage_type: "blob".into(),
        })
    );
}

#[tokio::test]
async fn test_entity_source_needs_no_store() -> anyhow::Result<()> {
    let store = common::people_store().await;
    let client = common::client(&store).await;
    store.set_available(false);

    let descriptor = client
        .reflect(&Context::background(), ReflectSource::Entity(Person::definition()))
        .await?;

    assert_eq!(descriptor.name(), "people");
    assert!(descriptor.is_key(&["email"]));
    assert_eq!(
        descriptor.get_column("status").map(|c| c.semantic_type),
        Some(SemanticType::Enumeration)
    );
    Ok(())
}

#[tokio::test]
async fn test_derived_entity_matches_live_table() -> anyhow::Result<()> {
    let store = common::people_store().await;
    let client = common::client(&store).await;
    let ctx = Context::background();

    let declared = client.reflect_entity::<Person>(&ctx).await?;
    assert_eq!(*declared, Person::descriptor()?);

    let err = client.reflect_entity::<EmailAsTimestamp>(&ctx).await.unwrap_err();
    assert_eq!(
        err,
        Error::Schema(SchemaError::TypeMismatch {
            table: "people".into(),
            column: "email".into(),
            declared: "TIMESTAMP".into(),
            stored: "TEXT".into(),
        })
    );

    let err = client.reflect_entity::<WithNickname>(&ctx).await.unwrap_err();
    assert_eq!(
        err,
        Error::Schema(SchemaError::ColumnMissing {
            table: "people".into(),
            column: "nickname".into(),
        })
    );
    Ok(())
}

#[tokio::test]
async fn test_entity_key_roles_must_match_store() -> anyhow::Result<()> {
    let store = common::people_store().await;
    let client = common::client(&store).await;

    let err = client
        .reflect_entity::<EmailWithoutKey>(&Context::background())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        Error::Schema(SchemaError::KeyMismatch {
            table: "people".into(),
            column: "email".into(),
            declared: "non-key".into(),
            stored: "unique".into(),
        })
    );
    Ok(())
}

#[tokio::test]
async fn test_default_table_name_and_renamed_column() -> anyhow::Result<()> {
    assert_eq!(Version::table_name(), "versions");

    let store = common::versions_store(&[1]).await;
    let client = common::client(&store).await;
    let descriptor = client.reflect_entity::<Version>(&Context::background()).await?;

    let names: Vec<&str> = descriptor.column_names().collect();
    assert_eq!(names, vec!["id", "version"]);
    Ok(())
}

#[tokio::test]
async fn test_reflection_observes_cancellation() {
    let store = common::people_store().await;
    let client = common::client(&store).await;
    let (ctx, cancel) = Context::background().with_cancel();
    cancel.cancel();

    let err = client.reflect_table(&ctx, "people").await.unwrap_err();
    assert_eq!(err, Error::Execution(ExecutionError::Cancelled));
}
