//! A hand-written repository layer over the registry, the way an application
//! would wrap tablebind.

mod common;

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tablebind::{
    Batch, Client, ConflictPolicy, Context, Direction, Entity, MethodBinding, MethodContract,
    Result, ScalarType, TableDescriptor, UpdateExpr,
};

#[derive(Debug, Clone, PartialEq, Entity)]
#[entity(table = "versions")]
struct Version {
    #[column(primary_key)]
    id: i64,
    version: i32,
}

#[derive(Debug, Clone, PartialEq, Entity)]
#[entity(table = "people")]
struct Person {
    #[column(primary_key)]
    id: i64,
    #[column(unique)]
    email: String,
    name: Option<String>,
    version: i32,
    #[column(enumeration)]
    status: String,
    created_at: NaiveDateTime,
}

struct VersionRepository {
    client: Client,
    table: Arc<TableDescriptor>,
    most_frequent: Arc<MethodBinding>,
    by_id: Arc<MethodBinding>,
}

impl VersionRepository {
    async fn open(client: Client, ctx: &Context) -> Result<Self> {
        let table = client.reflect_entity::<Version>(ctx).await?;
        let most_frequent = client.register(
            MethodContract::most_frequent("most_frequent_version_count", "version", ScalarType::U8),
            &table,
        )?;
        let by_id = client.register(MethodContract::row("by_id").filter("id"), &table)?;
        Ok(Self {
            client,
            table,
            most_frequent,
            by_id,
        })
    }

    async fn most_frequent_version_count(&self, ctx: &Context) -> Result<u8> {
        self.client
            .executor()
            .fetch_scalar(ctx, &self.most_frequent, &[])
            .await
    }

    async fn find(&self, ctx: &Context, id: i64) -> Result<Option<Version>> {
        self.client
            .executor()
            .fetch_one(ctx, &self.by_id, &[id.into()])
            .await
    }

    /// Inserts missing versions, bumps existing ones.
    async fn bump(&self, ctx: &Context, versions: &[Version]) -> Result<u64> {
        let batch = Batch::from_entities(Arc::clone(&self.table), versions)?;
        let policy =
            ConflictPolicy::do_update(["id"]).set_expression("version", UpdateExpr::increment(1));
        self.client.upsert(ctx, batch, &policy).await
    }
}

struct PeopleRepository {
    client: Client,
    table: Arc<TableDescriptor>,
    by_email: Arc<MethodBinding>,
    newest_first: Arc<MethodBinding>,
}

impl PeopleRepository {
    async fn open(client: Client, ctx: &Context) -> Result<Self> {
        let table = client.reflect_entity::<Person>(ctx).await?;
        let by_email = client.register(MethodContract::row("by_email").filter("email"), &table)?;
        let newest_first = client.register(
            MethodContract::row_set("newest_first").order_by("id", Direction::Desc),
            &table,
        )?;
        Ok(Self {
            client,
            table,
            by_email,
            newest_first,
        })
    }

    /// Email is the natural key. A later save takes the new name and status
    /// and bumps the version.
    async fn save_all(&self, ctx: &Context, people: &[Person]) -> Result<u64> {
        let batch = Batch::from_entities(Arc::clone(&self.table), people)?;
        let policy = ConflictPolicy::update_incoming(["email"], ["name", "status"])
            .set_expression("version", UpdateExpr::increment(1));
        self.client.upsert(ctx, batch, &policy).await
    }

    async fn by_email(&self, ctx: &Context, email: &str) -> Result<Option<Person>> {
        self.client
            .executor()
            .fetch_one(ctx, &self.by_email, &[email.into()])
            .await
    }

    async fn newest_first(&self, ctx: &Context) -> Result<Vec<Person>> {
        self.client
            .executor()
            .fetch_all(ctx, &self.newest_first, &[])
            .await
    }
}

fn joined() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 11, 5)
        .unwrap()
        .and_hms_opt(8, 30, 0)
        .unwrap()
}

fn person(id: i64, email: &str, name: &str) -> Person {
    Person {
        id,
        email: email.to_string(),
        name: Some(name.to_string()),
        version: 1,
        status: "active".to_string(),
        created_at: joined(),
    }
}

#[tokio::test]
async fn test_versions_repository() -> anyhow::Result<()> {
    let store = common::versions_store(&[1, 1, 1, 2, 2, 3]).await;
    let client = common::client(&store).await;
    let ctx = Context::background();
    let repo = VersionRepository::open(client, &ctx).await?;

    assert_eq!(repo.most_frequent_version_count(&ctx).await?, 3);

    let bumped = repo
        .bump(
            &ctx,
            &[Version { id: 4, version: 2 }, Version { id: 7, version: 1 }],
        )
        .await?;
    assert_eq!(bumped, 2);

    // Row 4 went from 2 to 3, row 7 was inserted as is.
    assert_eq!(repo.find(&ctx, 4).await?, Some(Version { id: 4, version: 3 }));
    assert_eq!(repo.find(&ctx, 7).await?, Some(Version { id: 7, version: 1 }));
    assert_eq!(repo.find(&ctx, 70).await?, None);
    assert_eq!(repo.most_frequent_version_count(&ctx).await?, 4);
    Ok(())
}

#[tokio::test]
async fn test_people_repository() -> anyhow::Result<()> {
    let store = common::people_store().await;
    let client = common::client(&store).await;
    let ctx = Context::background();
    let repo = PeopleRepository::open(client, &ctx).await?;

    let saved = repo
        .save_all(
            &ctx,
            &[person(1, "ann@x", "Ann"), person(2, "bob@x", "Bob")],
        )
        .await?;
    assert_eq!(saved, 2);

    let mut renamed = person(1, "ann@x", "Ann Smith");
    renamed.status = "banned".to_string();
    repo.save_all(&ctx, &[renamed]).await?;

    let ann = repo.by_email(&ctx, "ann@x").await?.expect("ann was saved");
    assert_eq!(ann.name.as_deref(), Some("Ann Smith"));
    assert_eq!(ann.status, "banned");
    assert_eq!(ann.version, 2);
    assert_eq!(ann.created_at, joined());

    assert!(repo.by_email(&ctx, "carol@x").await?.is_none());

    let emails: Vec<String> = repo
        .newest_first(&ctx)
        .await?
        .into_iter()
        .map(|p| p.email)
        .collect();
    assert_eq!(emails, vec!["bob@x", "ann@x"]);
    Ok(())
}
