use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification dispatch failed: {0}")]
    Dispatch(String),
}

/// Boundary to the external notification delivery service.
///
/// Delivery is best-effort, at-most-once-attempted. A failed dispatch is
/// logged and never surfaces as a request failure.
#[async_trait]
pub trait NotificationDispatch: Send + Sync {
    /// `target_user_id = None` addresses the system-wide activity feed.
    async fn dispatch(
        &self,
        target_user_id: Option<Uuid>,
        event_type: &str,
        payload: JsonValue,
    ) -> Result<(), NotifyError>;
}

/// Default dispatcher: writes events to the log only. A real delivery
/// channel (push/email) plugs in behind the same trait.
pub struct LogDispatch;

#[async_trait]
impl NotificationDispatch for LogDispatch {
    async fn dispatch(
        &self,
        target_user_id: Option<Uuid>,
        event_type: &str,
        payload: JsonValue,
    ) -> Result<(), NotifyError> {
        match target_user_id {
            Some(uid) => tracing::info!(%uid, event_type, %payload, "notification"),
            None => tracing::info!(event_type, %payload, "activity event"),
        }
        Ok(())
    }
}

/// Fire-and-forget dispatch after a state mutation has committed.
/// Must never roll back or fail the originating request.
pub fn notify_best_effort(
    notifier: Arc<dyn NotificationDispatch>,
    target_user_id: Option<Uuid>,
    event_type: &'static str,
    payload: JsonValue,
) {
    tokio::spawn(async move {
        if let Err(e) = notifier.dispatch(target_user_id, event_type, payload).await {
            tracing::warn!("notification dropped ({event_type}): {e}");
        }
    });
}
