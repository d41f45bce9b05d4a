use crate::core::{
    EntryId, FileInput, FilePatch, ProviderConfig, QueryProvider, Record, Storage, UploadFile,
    UploadService,
};
use crate::utils::error::{ContentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_PUBLIC_PATH: &str = "/uploads";

/// Upload subsystem writing files through a `Storage` and keeping one file
/// entry per upload in the `upload::file` model.
pub struct LocalUpload<S: Storage> {
    storage: S,
    files: Arc<dyn QueryProvider>,
    config: ProviderConfig,
}

impl<S: Storage> LocalUpload<S> {
    pub fn new(storage: S, files: Arc<dyn QueryProvider>, config: ProviderConfig) -> Self {
        Self {
            storage,
            files,
            config,
        }
    }
}

/// Storage key stem: the sanitized file stem plus a random v4 uuid.
fn unique_hash(name: &str) -> String {
    let stem: String = Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("file")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{}_{}", stem, Uuid::new_v4().simple())
}

fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn guess_mime(ext: &str) -> &'static str {
    match ext {
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".gif" => "image/gif",
        ".svg" => "image/svg+xml",
        ".webp" => "image/webp",
        ".pdf" => "application/pdf",
        ".txt" | ".md" => "text/plain",
        ".json" => "application/json",
        ".mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl<S: Storage> UploadService for LocalUpload<S> {
    async fn provider_config(&self) -> Result<ProviderConfig> {
        Ok(self.config.clone())
    }

    async fn edit(&self, id: &EntryId, patch: FilePatch) -> Result<Record> {
        let mut values = Record::new();
        values.insert("related", serde_json::to_value(&patch.related)?);
        self.files.update(id, values).await
    }

    async fn bufferize(&self, inputs: &[FileInput]) -> Result<Vec<UploadFile>> {
        let mut buffered = Vec::with_capacity(inputs.len());

        for input in inputs {
            let buffer = tokio::fs::read(&input.path).await.map_err(|e| {
                ContentError::UploadError {
                    message: format!("cannot read '{}': {}", input.path.display(), e),
                }
            })?;
            let ext = extension_of(&input.name);
            let mime = input
                .mime
                .clone()
                .unwrap_or_else(|| guess_mime(&ext).to_string());

            buffered.push(UploadFile {
                name: input.name.clone(),
                hash: unique_hash(&input.name),
                ext,
                mime,
                size: buffer.len() as u64,
                buffer,
                related: Vec::new(),
            });
        }

        Ok(buffered)
    }

    async fn upload(&self, files: Vec<UploadFile>, config: &ProviderConfig) -> Result<Vec<Record>> {
        if let Some(limit) = config.size_limit {
            if let Some(file) = files.iter().find(|file| file.size > limit) {
                return Err(ContentError::UploadError {
                    message: format!(
                        "'{}' is {} bytes, the limit is {} bytes",
                        file.name, file.size, limit
                    ),
                });
            }
        }

        let public_path = config
            .public_path
            .as_deref()
            .unwrap_or(DEFAULT_PUBLIC_PATH)
            .trim_end_matches('/');
        let mut created = Vec::with_capacity(files.len());

        for file in files {
            let key = format!("{}{}", file.hash, file.ext);
            self.storage.write_file(&key, &file.buffer).await?;

            let mut entry = Record::try_from(serde_json::to_value(&file)?)?;
            entry.insert("url", Value::String(format!("{}/{}", public_path, key)));
            entry.insert("provider", Value::String(config.provider.clone()));
            entry.insert("created_at", Value::String(Utc::now().to_rfc3339()));

            tracing::debug!("Stored '{}' as {}", file.name, key);
            created.push(self.files.create(entry).await?);
        }

        Ok(created)
    }
}
