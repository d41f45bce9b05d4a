use crate::domain::model::{
    Association, EntryId, FileInput, FilePatch, FindParams, ModelRef, ProviderConfig, Record,
    UploadFile,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Query interface bound to a single model.
#[async_trait]
pub trait QueryProvider: Send + Sync {
    fn primary_key(&self) -> &str;
    fn associations(&self) -> &[Association];

    async fn find(&self, params: &FindParams) -> Result<Vec<Record>>;
    async fn count(&self) -> Result<u64>;
    /// Fails with `NotFound` when no entry has this id.
    async fn find_one(&self, id: &EntryId) -> Result<Record>;
    async fn create(&self, values: Record) -> Result<Record>;
    async fn update(&self, id: &EntryId, values: Record) -> Result<Record>;
    async fn delete(&self, id: &EntryId) -> Result<Record>;
}

pub trait QueryRegistry: Send + Sync {
    fn query(&self, target: &ModelRef) -> Result<Arc<dyn QueryProvider>>;
}

#[async_trait]
pub trait UploadService: Send + Sync {
    async fn provider_config(&self) -> Result<ProviderConfig>;
    async fn edit(&self, id: &EntryId, patch: FilePatch) -> Result<Record>;
    async fn bufferize(&self, inputs: &[FileInput]) -> Result<Vec<UploadFile>>;
    async fn upload(&self, files: Vec<UploadFile>, config: &ProviderConfig) -> Result<Vec<Record>>;
}
