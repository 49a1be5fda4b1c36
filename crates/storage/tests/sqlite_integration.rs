use chrono::Duration;
use funnel_core::model::{ChatEntry, ModuleId, ProgressRecord};
use funnel_core::time::fixed_now;
use storage::legacy::LegacyFlags;
use storage::repository::{KeyValueStore, Storage, StoreChange};
use storage::sqlite::SqliteStore;
use storage::StoredProgress;

#[tokio::test]
async fn sqlite_kv_round_trip_and_events() {
    let store = SqliteStore::connect("sqlite:file:memdb_kv_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("migrate");
    store.migrate().await.expect("migrations are idempotent");

    let mut events = store.subscribe();
    store.set("b", "2").await.unwrap();
    store.set("a", "1").await.unwrap();
    store.set("a", "one").await.unwrap();
    assert_eq!(store.get("a").await.unwrap().as_deref(), Some("one"));
    assert_eq!(store.keys().await.unwrap(), vec!["a", "b"]);

    store.remove("b").await.unwrap();
    store.remove("b").await.unwrap();
    assert_eq!(store.get("b").await.unwrap(), None);

    let mut changes = Vec::new();
    while let Ok(event) = events.try_recv() {
        changes.push(event.change);
    }
    assert_eq!(
        changes,
        vec![
            StoreChange::Set,
            StoreChange::Set,
            StoreChange::Set,
            StoreChange::Removed
        ]
    );
}

#[tokio::test]
async fn sqlite_storage_persists_progress_transcripts_and_flags() {
    let storage = Storage::sqlite("sqlite:file:memdb_progress?mode=memory&cache=shared")
        .await
        .expect("storage");
    let progress = storage.progress();

    let now = fixed_now();
    let mut record = ProgressRecord::new(now);
    record.advance_step(ModuleId::Module2, 7, now);
    record.unlock_level(3, now);
    progress.save_progress(&record).await.unwrap();
    progress.write_level_flags(record.unlocked_level()).await.unwrap();

    let entries = vec![ChatEntry::bot("welcome", None), ChatEntry::user("CONTINUE")];
    progress
        .save_transcript(ModuleId::Module2, &entries)
        .await
        .unwrap();
    progress
        .save_typing_checkpoint(ModuleId::Module2, 1)
        .await
        .unwrap();

    let StoredProgress::Found(row) = progress.load_progress().await.unwrap() else {
        panic!("progress should be stored");
    };
    let restored = row.into_record(now + Duration::minutes(1));
    assert_eq!(restored.checkpoint(ModuleId::Module2), 7);
    assert_eq!(restored.unlocked_level(), 3);

    assert_eq!(
        progress.load_transcript(ModuleId::Module2).await.unwrap(),
        Some(entries)
    );
    assert_eq!(
        progress.load_typing_checkpoint(ModuleId::Module2).await.unwrap(),
        Some(1)
    );
    assert_eq!(
        progress.read_level_flags().await.unwrap(),
        LegacyFlags::for_level(3)
    );

    progress.clear_session().await.unwrap();
    assert_eq!(progress.load_transcript(ModuleId::Module2).await.unwrap(), None);
    assert_eq!(progress.read_level_flags().await.unwrap().implied_level(), 1);
}
