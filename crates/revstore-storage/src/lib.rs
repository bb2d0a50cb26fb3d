//! # revstore-storage
//!
//! Blob store providers holding revision content. Blobs are written to a
//! temporary location first and published under their final key in a single
//! atomic step.

pub mod manager;
pub mod providers;

pub use manager::BlobStoreManager;
pub use providers::local::LocalBlobStore;
