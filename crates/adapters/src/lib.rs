//! postpilot adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `store`: SQLite and in-memory post store + audit log
//! - `publish`: Platform publisher adapters (simulated, outbox, webhook)

mod store_memory;
mod store_sqlite;

pub mod publish;

/// Re-exports for store adapters
pub mod store {
    pub use crate::store_memory::InMemoryStore;
    pub use crate::store_sqlite::SqliteStore;
}
