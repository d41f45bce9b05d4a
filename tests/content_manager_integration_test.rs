use content_manager::core::{
    Association, EditPayload, EntryId, FileInput, FindParams, ModelRef, ModelSchema,
    MultipartPayload, ProviderConfig, QueryRegistry, Record,
};
use content_manager::{ContentError, ContentManager, LocalStorage, LocalUpload, MemoryStore};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

fn schemas() -> Vec<ModelSchema> {
    vec![
        ModelSchema::new("article")
            .with_association(Association::related("gallery"))
            .with_association(Association::reference("tags")),
        ModelSchema::new("tag"),
        ModelSchema::upload_files(),
    ]
}

fn setup(dir: &TempDir) -> (ContentManager<MemoryStore>, MemoryStore) {
    let store = MemoryStore::new(schemas());
    let files = store
        .query(&ModelSchema::upload_files().model_ref())
        .unwrap();
    let upload = LocalUpload::new(
        LocalStorage::new(dir.path().join("uploads")),
        files,
        ProviderConfig {
            provider: "local".to_string(),
            size_limit: Some(1024),
            public_path: None,
        },
    );
    let manager = ContentManager::new(store.clone()).with_upload(Arc::new(upload));
    (manager, store)
}

fn temp_input(dir: &TempDir, name: &str, content: &[u8]) -> FileInput {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    FileInput {
        name: name.to_string(),
        path,
        mime: None,
        size: None,
    }
}

fn record(value: Value) -> Record {
    Record::try_from(value).unwrap()
}

fn gallery_names(entry: &Record) -> Vec<String> {
    entry
        .get("gallery")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .map(|f| f["name"].as_str().unwrap().to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn test_multipart_upload_then_remove_attachment() {
    let dir = TempDir::new().unwrap();
    let (manager, store) = setup(&dir);
    let article = ModelRef::new("article").with_source("content-manager");

    let created = assert_ok!(
        manager
            .create_record(&article, record(json!({"title": "Draft"})))
            .await
    );
    let id = created.id("id").unwrap();

    // First submission: change the title and attach three images
    let mut files = BTreeMap::new();
    files.insert(
        "gallery".to_string(),
        vec![
            temp_input(&dir, "one.png", b"1"),
            temp_input(&dir, "two.png", b"22"),
            temp_input(&dir, "three.png", b"333"),
        ],
    );
    let payload = MultipartPayload {
        fields: json!({"title": "\"Published\"", "slug": "published-post"})
            .as_object()
            .unwrap()
            .clone(),
        files,
    };
    let updated = assert_ok!(
        manager
            .update_record(&article, &id, EditPayload::Multipart(payload))
            .await
    );
    assert_eq!(updated.get("title"), Some(&json!("Published")));
    assert_eq!(updated.get("slug"), Some(&json!("published-post")));

    let entry = assert_ok!(manager.get_record(&article, &id).await);
    let mut names = gallery_names(&entry);
    names.sort();
    assert_eq!(names, vec!["one.png", "three.png", "two.png"]);

    // Second submission keeps everything but "two.png"
    let gallery = entry.get("gallery").unwrap().as_array().unwrap();
    let kept: Vec<Value> = gallery
        .iter()
        .filter(|f| f["name"] != json!("two.png"))
        .cloned()
        .collect();
    let removed_id = gallery
        .iter()
        .find(|f| f["name"] == json!("two.png"))
        .map(|f| EntryId::from_value(&f["id"]).unwrap())
        .unwrap();

    let payload = MultipartPayload {
        fields: json!({"gallery": serde_json::to_string(&kept).unwrap()})
            .as_object()
            .unwrap()
            .clone(),
        files: BTreeMap::new(),
    };
    assert_ok!(
        manager
            .update_record(&article, &id, EditPayload::Multipart(payload))
            .await
    );

    let entry = assert_ok!(manager.get_record(&article, &id).await);
    let mut names = gallery_names(&entry);
    names.sort();
    assert_eq!(names, vec!["one.png", "three.png"]);

    // The detached file entry still exists, without back-reference
    let files = store
        .query(&ModelSchema::upload_files().model_ref())
        .unwrap();
    let detached = assert_ok!(files.find_one(&removed_id).await);
    assert_eq!(detached.get("related"), Some(&json!([])));
    assert_eq!(assert_ok!(files.count().await), 3);
}

#[tokio::test]
async fn test_oversized_upload_fails_after_update() {
    let dir = TempDir::new().unwrap();
    let (manager, _store) = setup(&dir);
    let article = ModelRef::new("article");

    let created = assert_ok!(
        manager
            .create_record(&article, record(json!({"title": "Big"})))
            .await
    );
    let id = created.id("id").unwrap();

    let mut files = BTreeMap::new();
    files.insert(
        "gallery".to_string(),
        vec![temp_input(&dir, "huge.bin", &[0u8; 2048])],
    );
    let payload = MultipartPayload {
        fields: json!({"title": "\"Bigger\""}).as_object().unwrap().clone(),
        files,
    };

    let err = assert_err!(
        manager
            .update_record(&article, &id, EditPayload::Multipart(payload))
            .await
    );
    assert!(matches!(err, ContentError::UploadError { .. }));

    // fields were applied before the upload was attempted
    let entry = assert_ok!(manager.get_record(&article, &id).await);
    assert_eq!(entry.get("title"), Some(&json!("Bigger")));
    assert!(gallery_names(&entry).is_empty());
}

#[tokio::test]
async fn test_delete_clears_relations_and_removes_entry() {
    let dir = TempDir::new().unwrap();
    let (manager, _store) = setup(&dir);
    let article = ModelRef::new("article");

    let created = assert_ok!(
        manager
            .create_record(&article, record(json!({"title": "Tagged", "tags": [1, 2]})))
            .await
    );
    let id = created.id("id").unwrap();

    let deleted = assert_ok!(manager.delete_record(&article, &id).await);
    assert_eq!(deleted.get("tags"), Some(&json!([])));
    assert_eq!(deleted.get("title"), Some(&json!("Tagged")));

    assert_eq!(assert_ok!(manager.count_records(&article).await), 0);
    let err = assert_err!(manager.get_record(&article, &id).await);
    assert!(matches!(err, ContentError::NotFound { .. }));
}

#[tokio::test]
async fn test_delete_releases_uploaded_attachments() {
    let dir = TempDir::new().unwrap();
    let (manager, store) = setup(&dir);
    let article = ModelRef::new("article");

    let created = assert_ok!(
        manager
            .create_record(&article, record(json!({"id": 5, "title": "With cover"})))
            .await
    );
    let id = created.id("id").unwrap();

    let mut files = BTreeMap::new();
    files.insert("gallery".to_string(), vec![temp_input(&dir, "a.png", b"a")]);
    let payload = MultipartPayload {
        fields: serde_json::Map::new(),
        files,
    };
    assert_ok!(
        manager
            .update_record(&article, &id, EditPayload::Multipart(payload))
            .await
    );
    let entry = assert_ok!(manager.get_record(&article, &id).await);
    assert_eq!(gallery_names(&entry), vec!["a.png"]);

    assert_ok!(manager.delete_record(&article, &id).await);

    let files = store
        .query(&ModelSchema::upload_files().model_ref())
        .unwrap();
    let file = assert_ok!(files.find_one(&EntryId::from(1)).await);
    assert_eq!(file.get("related"), Some(&json!([])));

    // a new entry reusing the id starts without attachments
    let recreated = assert_ok!(
        manager
            .create_record(&article, record(json!({"id": 5, "title": "Fresh"})))
            .await
    );
    assert!(gallery_names(&recreated).is_empty());
}

#[tokio::test]
async fn test_plain_update_and_listing() {
    let dir = TempDir::new().unwrap();
    let (manager, _store) = setup(&dir);
    let tag = ModelRef::new("tag");

    for name in ["rust", "async", "cms"] {
        assert_ok!(manager.create_record(&tag, record(json!({"name": name}))).await);
    }

    let values = record(json!({"name": "\"tokio\""}));
    let updated = assert_ok!(
        manager
            .update_record(&tag, &EntryId::from(2), values.into())
            .await
    );
    // plain updates are not decoded
    assert_eq!(updated.get("name"), Some(&json!("\"tokio\"")));

    let params = FindParams {
        sort: Some("name:desc".parse().unwrap()),
        limit: Some(2),
        ..Default::default()
    };
    let listed = assert_ok!(manager.list_records(&tag, &params).await);
    let names: Vec<&Value> = listed.iter().map(|r| r.get("name").unwrap()).collect();
    assert_eq!(names, vec![&json!("rust"), &json!("cms")]);
}

#[tokio::test]
async fn test_unknown_source_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (manager, _store) = setup(&dir);

    let err = assert_err!(
        manager
            .count_records(&ModelRef::new("article").with_source("users-permissions"))
            .await
    );
    assert!(matches!(err, ContentError::ModelNotFound { .. }));
}
