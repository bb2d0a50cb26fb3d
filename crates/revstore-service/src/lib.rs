//! # revstore-service
//!
//! The revision manager and the maintenance jobs that keep the blob store
//! and the metadata store consistent.
//!
//! Services follow constructor injection: the metadata store and the blob
//! store are handed in as `Arc` trait objects.

pub mod context;
pub mod file;
pub mod maintenance;

pub use context::RequestContext;
pub use file::{
    RetryPolicy, RevisionDownload, RevisionManager, RevisionVerification, UploadContent,
    UploadPolicy,
};
pub use maintenance::{MaintenanceReport, MaintenanceService};
