//! Deskline store: directory records in SQLite behind an injectable client.

pub mod client;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use client::{RecordSource, StoreClient, StoreState};
pub use memory::MemoryDirectory;
pub use sqlite::DirectoryStore;
pub use types::*;
