//! # revstore-entity
//!
//! Domain entity models for RevStore. Database rows derive `sqlx::FromRow`;
//! every entity derives `Debug`, `Clone`, `Serialize`, and `Deserialize`.

pub mod file;
pub mod stats;

pub use file::{FileDocument, FileRecord, FileRevision, NewFile, NewRevision};
pub use stats::OwnerStats;
