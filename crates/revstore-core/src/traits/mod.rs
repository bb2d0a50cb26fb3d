//! Core traits defined in `revstore-core` and implemented by other crates.

pub mod blob;

pub use blob::{BlobInfo, BlobStore, BlobWrite, ByteStream};
