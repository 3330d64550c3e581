#![allow(dead_code)]

use std::sync::Arc;

use tablebind::storage::{StoredColumn, TableSchema};
use tablebind::{Client, ConnectionConfig, MemoryStore, Value};

/// `versions(id bigint pk, version int)` seeded with one row per entry,
/// ids counting from 1.
pub async fn versions_store(versions: &[i64]) -> MemoryStore {
    let store = MemoryStore::new();
    store
        .create_table(
            TableSchema::new("versions")
                .column(StoredColumn::new("id", "bigint").primary_key())
                .column(StoredColumn::new("version", "int")),
        )
        .await
        .unwrap();

    for (idx, version) in versions.iter().enumerate() {
        store
            .insert("versions", vec![Value::Integer(idx as i64 + 1), Value::Integer(*version)])
            .await
            .unwrap();
    }
    store
}

/// `people` as a typical application table: surrogate key, unique email,
/// an enum column and a creation timestamp.
pub async fn people_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .create_table(
            TableSchema::new("people")
                .column(StoredColumn::new("id", "bigint unsigned").primary_key())
                .column(StoredColumn::new("email", "varchar(191)").unique())
                .column(StoredColumn::new("name", "varchar(255)"))
                .column(StoredColumn::new("version", "int"))
                .column(StoredColumn::new("status", "enum('active','banned')"))
                .column(StoredColumn::new("created_at", "datetime(3)")),
        )
        .await
        .unwrap();
    store
}

pub async fn client(store: &MemoryStore) -> Client {
    client_with(store, ConnectionConfig::default()).await
}

pub async fn client_with(store: &MemoryStore, config: ConnectionConfig) -> Client {
    Client::connect(config, Arc::new(store.clone())).await.unwrap()
}
