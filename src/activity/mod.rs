//! Append-only audit trail: event types, the log repository contract, the
//! best-effort recorder, and the role-scoped feed.

mod entry;
mod feed;
mod recorder;

use async_trait::async_trait;

use crate::error::BackendError;

pub use entry::{ActivityAction, ActivityDetails, ActivityLogEntry, ActivityQuery, NewActivity};
pub use feed::{effective_user_filter, ActivityFeed, ActorSummary, FeedItem, FeedScope, PageRequest};
pub use recorder::ActivityRecorder;

/// The `activity_logs` table.
#[async_trait]
pub trait ActivityLogRepository: Send + Sync {
    async fn insert(&self, entry: NewActivity) -> Result<(), BackendError>;
    /// Rows ordered by timestamp descending, windowed by offset/limit, optionally one actor's only.
    async fn query(&self, query: &ActivityQuery) -> Result<Vec<ActivityLogEntry>, BackendError>;
}
