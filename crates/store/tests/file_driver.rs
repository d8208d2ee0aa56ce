use ra_store::{Database, Document, FileDatabase, Filter, StorageError};
use serde_json::json;

fn doc(v: serde_json::Value) -> Document {
    v.as_object().cloned().unwrap()
}

#[tokio::test]
async fn documents_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = FileDatabase::open(dir.path()).unwrap();
        let hooks = db.collection("hooks");
        hooks
            .insert_one(doc(json!({ "hook_id": "h1", "room": "general" })))
            .await
            .unwrap();
        hooks
            .insert_one(doc(json!({ "hook_id": "h2", "room": "ops" })))
            .await
            .unwrap();
        assert!(hooks.delete_one(&Filter::eq("hook_id", "h1")).await.unwrap());
    }

    let db = FileDatabase::open(dir.path()).unwrap();
    let all = db.collection("hooks").find(&Filter::all()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["hook_id"], "h2");
    assert!(dir.path().join("hooks.json").exists());
}

#[tokio::test]
async fn missing_file_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let db = FileDatabase::open(dir.path().join("nested/state")).unwrap();
    assert!(db
        .collection("settings")
        .find(&Filter::all())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn corrupt_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hooks.json"), "{ not json").unwrap();

    let db = FileDatabase::open(dir.path()).unwrap();
    let err = db.collection("hooks").find(&Filter::all()).await.unwrap_err();
    assert!(matches!(err, StorageError::Corrupt { ref collection, .. } if collection == "hooks"));
}

#[tokio::test]
async fn failed_write_leaves_collection_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let db = FileDatabase::open(dir.path()).unwrap();
    let hooks = db.collection("hooks");
    hooks
        .insert_one(doc(json!({ "hook_id": "h1" })))
        .await
        .unwrap();

    // A directory squatting on the temp path makes the next write fail.
    std::fs::create_dir(dir.path().join("hooks.json.tmp")).unwrap();

    let err = hooks
        .insert_one(doc(json!({ "hook_id": "h2" })))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Io { .. }));

    let all = hooks.find(&Filter::all()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["hook_id"], "h1");
}

#[tokio::test]
async fn upsert_merges_into_settings_document() {
    let dir = tempfile::tempdir().unwrap();
    let db = FileDatabase::open(dir.path()).unwrap();
    let settings = db.collection("settings");
    let key = Filter::eq("_id", "settings");

    assert!(settings
        .update_one(&key, doc(json!({ "token": "a", "admins": ["alice"] })), true)
        .await
        .unwrap());
    assert!(settings
        .update_one(&key, doc(json!({ "token": "b" })), false)
        .await
        .unwrap());

    let stored = settings.find_one(&key).await.unwrap().unwrap();
    assert_eq!(stored["token"], "b");
    assert_eq!(stored["admins"], json!(["alice"]));
    assert_eq!(settings.find(&Filter::all()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn no_op_delete_does_not_touch_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db = FileDatabase::open(dir.path()).unwrap();
    let rooms = db.collection("blocked_rooms");

    assert!(!rooms.delete_one(&Filter::eq("name", "nope")).await.unwrap());
    assert!(!dir.path().join("blocked_rooms.json").exists());
}
