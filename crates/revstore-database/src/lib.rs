//! # revstore-database
//!
//! The [`MetadataStore`] contract for file and revision records, with a
//! PostgreSQL implementation and an in-memory one, plus connection
//! management and migrations.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod postgres;
pub mod store;

pub use connection::DatabasePool;
pub use memory::MemoryMetadataStore;
pub use postgres::PgMetadataStore;
pub use store::MetadataStore;
