pub mod adapters;
#[cfg(feature = "cli")]
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{LocalStorage, LocalUpload, MemoryStore};
#[cfg(feature = "cli")]
pub use app::AdminApp;
#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::CmsConfig;
pub use crate::core::content_manager::ContentManager;
pub use utils::error::{ContentError, Result};
