pub mod kv;
pub mod store;

pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use store::LocalRepository;
