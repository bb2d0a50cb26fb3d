//! File domain entities.

pub mod document;
pub mod naming;
pub mod revision;

pub use document::{FileDocument, FileRecord, NewFile};
pub use revision::{FileRevision, NewRevision};
