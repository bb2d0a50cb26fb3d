//! File revision services: upload, download, history, deletion.

pub mod deletion;
pub mod download;
pub mod manager;
pub mod retry;
pub mod upload;
pub mod validation;

pub use download::{RevisionDownload, RevisionVerification};
pub use manager::RevisionManager;
pub use retry::RetryPolicy;
pub use upload::UploadContent;
pub use validation::UploadPolicy;
