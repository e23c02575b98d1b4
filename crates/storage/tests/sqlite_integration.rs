use storage::keys::StorageKey;
use storage::repository::{KeyValueStore, Storage};
use storage::sqlite::SqliteRepository;

#[tokio::test]
async fn sqlite_roundtrip_set_get_remove() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_kv_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    assert_eq!(repo.get(StorageKey::Xp.as_str()).await.unwrap(), None);

    repo.set(StorageKey::Xp.as_str(), "40").await.unwrap();
    repo.set(StorageKey::Xp.as_str(), "55").await.unwrap();
    assert_eq!(
        repo.get(StorageKey::Xp.as_str()).await.unwrap().as_deref(),
        Some("55")
    );

    repo.remove(StorageKey::Xp.as_str()).await.unwrap();
    assert_eq!(repo.get(StorageKey::Xp.as_str()).await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_set_many_and_clear() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_kv_batch?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    repo.set_many(&[
        (StorageKey::Hearts.as_str(), "3".to_string()),
        (StorageKey::Levels.as_str(), r#"["arrays"]"#.to_string()),
        (StorageKey::Hearts.as_str(), "2".to_string()),
    ])
    .await
    .unwrap();

    assert_eq!(
        repo.get(StorageKey::Hearts.as_str()).await.unwrap().as_deref(),
        Some("2")
    );
    assert_eq!(
        repo.get(StorageKey::Levels.as_str()).await.unwrap().as_deref(),
        Some(r#"["arrays"]"#)
    );

    repo.clear().await.unwrap();
    for key in StorageKey::ALL {
        assert_eq!(repo.get(key.as_str()).await.unwrap(), None);
    }
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_kv_migrate?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("first migrate");
    repo.set("user_streak", "4").await.unwrap();
    repo.migrate().await.expect("second migrate");
    assert_eq!(repo.get("user_streak").await.unwrap().as_deref(), Some("4"));
}

#[tokio::test]
async fn storage_sqlite_constructor_migrates() {
    let storage = Storage::sqlite("sqlite:file:memdb_kv_storage?mode=memory&cache=shared")
        .await
        .expect("storage");
    storage.kv.set("user_isDark", "true").await.unwrap();
    assert_eq!(
        storage.kv.get("user_isDark").await.unwrap().as_deref(),
        Some("true")
    );
}
