use crate::adapters::{LocalStorage, LocalUpload, MemoryStore};
use crate::config::{CmsConfig, Command};
use crate::core::content_manager::ContentManager;
use crate::core::{EntryId, ModelSchema, QueryRegistry, Record};
use crate::utils::error::{ContentError, Result};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

/// Content manager wired to the configured store and upload directory.
pub struct AdminApp {
    manager: ContentManager<MemoryStore>,
    storage: LocalStorage,
    snapshot: String,
}

/// Splits `data_file` into the storage directory and the snapshot file name.
fn split_data_file(data_file: &str) -> Result<(String, String)> {
    let path = Path::new(data_file);
    let file = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ContentError::ConfigValidationError {
            field: "storage.data_file".to_string(),
            message: format!("'{}' does not name a file", data_file),
        })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().to_string(),
        _ => ".".to_string(),
    };
    Ok((dir, file.to_string()))
}

impl AdminApp {
    pub async fn from_config(config: &CmsConfig) -> Result<Self> {
        let (dir, snapshot) = split_data_file(&config.storage.data_file)?;
        let storage = LocalStorage::new(dir);

        let store = MemoryStore::new(config.schemas());
        let loaded = store.load_snapshot(&storage, &snapshot).await?;
        tracing::info!(
            "📂 Project '{}': {} entries loaded from {}",
            config.project.name,
            loaded,
            config.storage.data_file
        );

        let mut manager = ContentManager::new(store.clone());
        if let (Some(provider), Some(upload)) = (config.provider_config(), &config.upload) {
            let files = store.query(&ModelSchema::upload_files().model_ref())?;
            let service = LocalUpload::new(LocalStorage::new(&upload.upload_dir), files, provider);
            manager = manager.with_upload(Arc::new(service));
            tracing::debug!("Upload service enabled, files go to {}", upload.upload_dir);
        }

        Ok(Self {
            manager,
            storage,
            snapshot,
        })
    }

    pub fn manager(&self) -> &ContentManager<MemoryStore> {
        &self.manager
    }

    /// Runs one command; mutations are persisted to the snapshot file.
    pub async fn run(&self, command: &Command) -> Result<Value> {
        let target = command.target();

        let output = match command {
            Command::List { .. } => {
                let records = self
                    .manager
                    .list_records(&target, &command.find_params()?)
                    .await?;
                Value::Array(records.into_iter().map(Record::into_value).collect())
            }
            Command::Count { .. } => json!({ "count": self.manager.count_records(&target).await? }),
            Command::Get { id, .. } => self
                .manager
                .get_record(&target, &EntryId::new(id.as_str()))
                .await?
                .into_value(),
            Command::Create { .. } => self
                .manager
                .create_record(&target, command.create_values()?)
                .await?
                .into_value(),
            Command::Update { id, .. } => self
                .manager
                .update_record(&target, &EntryId::new(id.as_str()), command.edit_payload()?)
                .await?
                .into_value(),
            Command::Delete { id, .. } => self
                .manager
                .delete_record(&target, &EntryId::new(id.as_str()))
                .await?
                .into_value(),
        };

        if command.is_mutation() {
            self.manager
                .queries()
                .save_snapshot(&self.storage, &self.snapshot)
                .await?;
        }

        Ok(output)
    }
}
