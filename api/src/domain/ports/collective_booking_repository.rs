//! Port for collective booking maintenance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::collective::CollectiveBooking;

use super::define_port_error;

define_port_error! {
    /// Errors raised by collective booking repository adapters.
    pub enum CollectiveBookingRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "collective booking repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "collective booking repository query failed: {message}",
    }
}

/// Port for collective bookings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CollectiveBookingRepository: Send + Sync {
    /// Mark confirmed collective bookings whose event began before
    /// `threshold` as used, returning the updated bookings.
    ///
    /// A `BookingUsed` finance event is recorded for each booking in the
    /// same transaction.
    async fn mark_used_after_event(
        &self,
        threshold: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<CollectiveBooking>, CollectiveBookingRepositoryError>;
}
