pub mod content_manager;
pub mod field_parser;
pub mod relations;

pub use crate::domain::model::{
    Association, EditPayload, EntryId, FileInput, FilePatch, FindParams, ModelRef, ModelSchema,
    MultipartPayload, ProviderConfig, Record, RelatedRef, RelationKind, Sort, SortOrder,
    UploadFile,
};
pub use crate::domain::ports::{QueryProvider, QueryRegistry, Storage, UploadService};
pub use crate::utils::error::Result;
