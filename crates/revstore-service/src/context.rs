//! Request context carrying the authenticated owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use revstore_core::types::OwnerId;

/// Context for the current authenticated request.
///
/// Built by whatever authenticates the caller and passed into every
/// [`RevisionManager`](crate::RevisionManager) operation, so each one knows
/// *who* is acting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// The authenticated owner.
    pub owner_id: OwnerId,
    /// Correlation id for log lines belonging to this request.
    pub request_id: Uuid,
    /// When the request was received.
    pub request_time: DateTime<Utc>,
}

impl RequestContext {
    /// Creates a context for `owner_id` with a fresh request id.
    pub fn new(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            request_id: Uuid::new_v4(),
            request_time: Utc::now(),
        }
    }
}
