//! Port for finance event reads.
//!
//! Finance events are written by the booking adapters, in the transaction
//! of the booking change they record.

use async_trait::async_trait;

use crate::domain::BookingId;
use crate::domain::finance::FinanceEvent;

use super::define_port_error;

define_port_error! {
    /// Errors raised by finance event repository adapters.
    pub enum FinanceEventRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "finance event repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "finance event repository query failed: {message}",
    }
}

/// Port for finance events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FinanceEventRepository: Send + Sync {
    /// Most recent non-cancelled event of a booking, with its pricing state.
    async fn find_latest_active_event(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<FinanceEvent>, FinanceEventRepositoryError>;
}
