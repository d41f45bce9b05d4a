use crate::core::field_parser::parse_fields;
use crate::core::relations::{clearing_patch, detached_files};
use crate::core::{
    EditPayload, EntryId, FileInput, FilePatch, FindParams, ModelRef, MultipartPayload,
    QueryProvider, QueryRegistry, Record, RelatedRef, UploadService,
};
use crate::utils::error::Result;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Admin-panel request handler. Every operation resolves the query provider
/// of the target model and delegates to it; errors from the providers are
/// returned untouched.
pub struct ContentManager<Q: QueryRegistry> {
    queries: Q,
    upload: Option<Arc<dyn UploadService>>,
}

impl<Q: QueryRegistry> ContentManager<Q> {
    pub fn new(queries: Q) -> Self {
        Self {
            queries,
            upload: None,
        }
    }

    pub fn with_upload(mut self, upload: Arc<dyn UploadService>) -> Self {
        self.upload = Some(upload);
        self
    }

    pub fn queries(&self) -> &Q {
        &self.queries
    }

    pub fn has_upload(&self) -> bool {
        self.upload.is_some()
    }

    pub async fn list_records(&self, target: &ModelRef, params: &FindParams) -> Result<Vec<Record>> {
        tracing::debug!("Listing {} with {:?}", target, params);
        self.queries.query(target)?.find(params).await
    }

    pub async fn count_records(&self, target: &ModelRef) -> Result<u64> {
        self.queries.query(target)?.count().await
    }

    pub async fn get_record(&self, target: &ModelRef, id: &EntryId) -> Result<Record> {
        self.queries.query(target)?.find_one(id).await
    }

    pub async fn create_record(&self, target: &ModelRef, values: Record) -> Result<Record> {
        let created = self.queries.query(target)?.create(values).await?;
        tracing::info!("Created entry in {}", target);
        Ok(created)
    }

    pub async fn update_record(
        &self,
        target: &ModelRef,
        id: &EntryId,
        payload: EditPayload,
    ) -> Result<Record> {
        let query = self.queries.query(target)?;

        match payload {
            EditPayload::Values(values) => {
                let updated = query.update(id, values).await?;
                tracing::info!("Updated {} entry {}", target, id);
                Ok(updated)
            }
            EditPayload::Multipart(payload) => {
                self.update_multipart(query.as_ref(), target, id, payload).await
            }
        }
    }

    async fn update_multipart(
        &self,
        query: &dyn QueryProvider,
        target: &ModelRef,
        id: &EntryId,
        payload: MultipartPayload,
    ) -> Result<Record> {
        let MultipartPayload { fields, files } = payload;
        let fields = parse_fields(&fields);

        // Snapshot before the update so removed attachments can still be seen.
        let stored = match self.upload {
            Some(_) => Some(query.find_one(id).await?),
            None => None,
        };

        let updated = query.update(id, Record::from(fields.clone())).await?;
        tracing::info!("Updated {} entry {} from multipart form", target, id);

        if let (Some(upload), Some(stored)) = (&self.upload, stored) {
            sync_attachments(upload, query, target, id, &stored, &fields, files).await?;
        } else if !files.is_empty() {
            tracing::warn!(
                "Ignoring {} file field(s) for {} entry {}: no upload service registered",
                files.len(),
                target,
                id
            );
        }

        Ok(updated)
    }

    pub async fn delete_record(&self, target: &ModelRef, id: &EntryId) -> Result<Record> {
        let query = self.queries.query(target)?;
        let record = query.find_one(id).await?;

        let patch = clearing_patch(query.associations(), &record);
        if !patch.is_empty() {
            tracing::debug!(
                "Clearing {} relation(s) of {} entry {} before delete",
                patch.len(),
                target,
                id
            );
            query.update(id, patch).await?;
        }

        let deleted = query.delete(id).await?;
        tracing::info!("Deleted {} entry {}", target, id);
        Ok(deleted)
    }
}

/// Detaches files dropped from the form and ingests newly submitted ones.
/// All requests run concurrently; every one of them finishes before this returns.
async fn sync_attachments(
    upload: &Arc<dyn UploadService>,
    query: &dyn QueryProvider,
    target: &ModelRef,
    id: &EntryId,
    stored: &Record,
    fields: &Map<String, Value>,
    files: BTreeMap<String, Vec<FileInput>>,
) -> Result<()> {
    let config = upload.provider_config().await?;
    let config = &config;

    let detached = detached_files(query.associations(), stored, fields, query.primary_key());
    let mut tasks: Vec<BoxFuture<'_, Result<()>>> = Vec::with_capacity(detached.len() + files.len());

    for file_id in detached {
        let upload = Arc::clone(upload);
        tasks.push(
            async move {
                tracing::debug!("Detaching file {}", file_id);
                upload.edit(&file_id, FilePatch::detached()).await.map(|_| ())
            }
            .boxed(),
        );
    }

    for (field, inputs) in files {
        let upload = Arc::clone(upload);
        let related = RelatedRef {
            ref_id: id.clone(),
            ref_model: target.model.clone(),
            source: target.source.clone(),
            field,
        };
        tasks.push(
            async move {
                let mut buffered = upload.bufferize(&inputs).await?;
                for file in &mut buffered {
                    file.related = vec![related.clone()];
                }
                tracing::debug!("Uploading {} file(s) for '{}'", buffered.len(), related.field);
                upload.upload(buffered, config).await.map(|_| ())
            }
            .boxed(),
        );
    }

    let mut first_error = None;
    for outcome in join_all(tasks).await {
        if let Err(e) = outcome {
            tracing::warn!("Attachment sync failed for {} entry {}: {}", target, id, e);
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
