//! Background maintenance: finishing interrupted deletions and reaping blobs
//! that no revision references.

pub mod service;

pub use service::{MaintenanceReport, MaintenanceService};
