//! Plugin store implementations.
//!
//! - Memory
//! - SQLite

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
