// Adapters layer: concrete implementations of the ports, used by the CLI and the tests.

pub mod memory;
pub mod storage;
pub mod upload;

pub use memory::MemoryStore;
pub use storage::LocalStorage;
pub use upload::LocalUpload;
