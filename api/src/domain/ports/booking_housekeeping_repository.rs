//! Port for the set-based booking maintenance run by scheduled jobs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::booking::{Booking, ExpiryCutoffs};
use crate::domain::{BookingId, StockId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by booking housekeeping adapters.
    pub enum BookingHousekeepingError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "booking housekeeping connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "booking housekeeping query failed: {message}",
    }
}

/// Which confirmed bookings count as expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryQuery {
    /// Creation thresholds.
    pub cutoffs: ExpiryCutoffs,
    /// Subcategories using the book threshold.
    pub book_subcategory_ids: Vec<&'static str>,
    /// Other subcategories whose bookings expire.
    pub other_expirable_subcategory_ids: Vec<&'static str>,
}

/// Creation window of bookings about to expire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoonToExpireQuery {
    /// `[start, end)` creation window for books.
    pub books_window: (DateTime<Utc>, DateTime<Utc>),
    /// `[start, end)` creation window for other goods.
    pub others_window: (DateTime<Utc>, DateTime<Utc>),
    /// Subcategories using the book window.
    pub book_subcategory_ids: Vec<&'static str>,
    /// Other subcategories whose bookings expire.
    pub other_expirable_subcategory_ids: Vec<&'static str>,
}

/// Result of cancelling one batch of expired bookings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiredBatch {
    /// Bookings actually cancelled.
    pub cancelled: usize,
    /// Stocks whose counters were recomputed.
    pub stock_ids: Vec<StockId>,
}

/// Port for scheduled booking maintenance.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookingHousekeepingRepository: Send + Sync {
    /// Ids of confirmed bookings past their expiry, ordered by id.
    async fn find_expiring_booking_ids(
        &self,
        query: &ExpiryQuery,
    ) -> Result<Vec<BookingId>, BookingHousekeepingError>;

    /// Cancel a batch as expired and recompute the touched stock counters
    /// in one transaction. Bookings no longer confirmed are skipped.
    async fn cancel_expired_batch(
        &self,
        ids: &[BookingId],
        now: DateTime<Utc>,
    ) -> Result<ExpiredBatch, BookingHousekeepingError>;

    /// Bookings cancelled as expired within `[start, end)`.
    async fn list_expired_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingHousekeepingError>;

    /// Confirmed bookings created within the soon-to-expire windows.
    async fn list_soon_to_expire(
        &self,
        query: &SoonToExpireQuery,
    ) -> Result<Vec<Booking>, BookingHousekeepingError>;

    /// Mark confirmed event bookings whose event began before `threshold`
    /// as used by `AUTO`, returning the updated bookings.
    ///
    /// A `BookingUsed` finance event is recorded for each booking in the
    /// same transaction.
    async fn mark_event_bookings_used(
        &self,
        threshold: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingHousekeepingError>;

    /// Recompute `dn_booked_quantity` from live bookings.
    async fn recompute_dn_booked_quantity(
        &self,
        stock_ids: &[StockId],
    ) -> Result<usize, BookingHousekeepingError>;

    /// Flag old bookings as ended for display.
    async fn archive_bookings(
        &self,
        created_before: DateTime<Utc>,
        display_even_if_used_subcategory_ids: &[&'static str],
    ) -> Result<usize, BookingHousekeepingError>;
}
