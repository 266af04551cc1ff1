use std::sync::Arc;

use tracing::{debug, warn};

use super::entry::NewActivity;
use super::ActivityLogRepository;
use crate::error::AuditLogError;

/// Best-effort audit writer shared by the auth context and the fleet service.
#[derive(Clone)]
pub struct ActivityRecorder {
    log: Arc<dyn ActivityLogRepository>,
}

impl ActivityRecorder {
    pub fn new(log: Arc<dyn ActivityLogRepository>) -> Self { Self { log } }

    pub async fn try_record(&self, activity: NewActivity) -> Result<(), AuditLogError> {
        let action = activity.action;
        self.log
            .insert(activity)
            .await
            .map_err(|source| AuditLogError { action, source })
    }

    /// Append the event; a failure goes to the operator channel only.
    /// Returns whether the entry was written.
    pub async fn record(&self, activity: NewActivity) -> bool {
        let user = activity.user_id.clone();
        let action = activity.action;
        match self.try_record(activity).await {
            Ok(()) => {
                debug!(target: "fleetwatch::activity", %action, %user, "activity recorded");
                true
            }
            Err(e) => {
                warn!(target: "fleetwatch::operator", %action, %user, error = %e, "audit append failed");
                false
            }
        }
    }
}
