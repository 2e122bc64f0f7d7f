//! Port describing dispatch of notification jobs.

use async_trait::async_trait;

use crate::domain::notification::Notification;

use super::define_port_error;

define_port_error! {
    /// Errors surfaced by the queue adapter.
    pub enum JobDispatchError {
        /// Queue infrastructure is unavailable.
        Unavailable { message: String } => "notification queue is unavailable: {message}",
        /// The job could not be serialised or persisted.
        Rejected { message: String } => "notification job was rejected: {message}",
    }
}

/// Port for enqueuing notification jobs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Enqueue a job for the notification workers.
    async fn enqueue(&self, notification: &Notification) -> Result<(), JobDispatchError>;
}
