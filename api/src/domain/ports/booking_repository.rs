//! Port for reading and writing individual bookings.
//!
//! Every write takes a [`FinanceJournal`] and applies it in the same
//! database transaction as the booking. Writes that move stock units
//! (`insert_with_reservation`, `save_cancellation`, `save_uncancellation`)
//! update the stock's `dn_booked_quantity` in that transaction too.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::booking::{Booking, NewBooking};
use crate::domain::finance::FinanceJournal;
use crate::domain::{BookingId, OfferId, StockId, UserId, VenueId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by booking repository adapters.
    pub enum BookingRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "booking repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "booking repository query failed: {message}",
        /// The stock no longer holds enough units for the reservation.
        InsufficientStock { stock_id: i64 } =>
            "stock {stock_id} has not enough units left",
        /// The booking vanished between read and write.
        Missing { booking_id: i64 } =>
            "booking {booking_id} not found",
        /// The user booked the offer while this booking was checked.
        OfferAlreadyBooked { offer_id: i64 } =>
            "offer {offer_id} is already booked by the user",
        /// The deposit was charged while this booking was checked.
        DepositSpendingChanged { deposit_id: i64 } =>
            "deposit {deposit_id} was charged concurrently",
        /// The stock has no free activation code left.
        NoActivationCode { stock_id: i64 } =>
            "stock {stock_id} has no activation code left",
        /// The finance event to cancel was priced in the meantime.
        SettledPricing { event_id: i64 } =>
            "finance event {event_id} has a settled pricing",
    }
}

/// Port for booking persistence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Find a booking by id.
    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, BookingRepositoryError>;

    /// Whether a booking already uses `token`.
    async fn token_exists(&self, token: &str) -> Result<bool, BookingRepositoryError>;

    /// Whether the user holds a non-cancelled booking on the offer.
    async fn has_live_booking_for_offer(
        &self,
        user_id: UserId,
        offer_id: OfferId,
    ) -> Result<bool, BookingRepositoryError>;

    /// Whether the venue has ever been booked.
    async fn venue_has_bookings(&self, venue_id: VenueId) -> Result<bool, BookingRepositoryError>;

    /// Reserve `quantity` units of the stock and insert the booking.
    ///
    /// The user is locked for the duration of the write, then the offer
    /// and deposit checks are replayed. Fails with
    /// [`BookingRepositoryError::OfferAlreadyBooked`] or
    /// [`BookingRepositoryError::DepositSpendingChanged`] when a concurrent
    /// booking of the same user got there first,
    /// [`BookingRepositoryError::InsufficientStock`] when the stock is
    /// soft-deleted or lacks units, and
    /// [`BookingRepositoryError::NoActivationCode`] when a code was
    /// requested and none is free.
    async fn insert_with_reservation(
        &self,
        booking: &NewBooking,
        journal: &FinanceJournal,
    ) -> Result<Booking, BookingRepositoryError>;

    /// Persist status, usage and cancellation fields without touching stock.
    async fn save_status(
        &self,
        booking: &Booking,
        journal: &FinanceJournal,
    ) -> Result<(), BookingRepositoryError>;

    /// Persist a cancellation and release the booking's units.
    ///
    /// A booking holding an activation code also takes one unit off the
    /// stock's quantity.
    async fn save_cancellation(
        &self,
        booking: &Booking,
        journal: &FinanceJournal,
    ) -> Result<(), BookingRepositoryError>;

    /// Persist an uncancellation and reserve the booking's units again.
    async fn save_uncancellation(
        &self,
        booking: &Booking,
        journal: &FinanceJournal,
    ) -> Result<(), BookingRepositoryError>;

    /// Non-cancelled bookings of a stock.
    async fn list_live_for_stock(
        &self,
        stock_id: StockId,
    ) -> Result<Vec<Booking>, BookingRepositoryError>;

    /// Set the cancellation limit of every live booking of a stock.
    async fn update_cancellation_limit_dates(
        &self,
        stock_id: StockId,
        limit: DateTime<Utc>,
    ) -> Result<usize, BookingRepositoryError>;
}

/// Fixture implementation for tests that do not exercise booking storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureBookingRepository;

#[async_trait]
impl BookingRepository for FixtureBookingRepository {
    async fn find_by_id(&self, _id: BookingId) -> Result<Option<Booking>, BookingRepositoryError> {
        Ok(None)
    }

    async fn token_exists(&self, _token: &str) -> Result<bool, BookingRepositoryError> {
        Ok(false)
    }

    async fn has_live_booking_for_offer(
        &self,
        _user_id: UserId,
        _offer_id: OfferId,
    ) -> Result<bool, BookingRepositoryError> {
        Ok(false)
    }

    async fn venue_has_bookings(&self, _venue_id: VenueId) -> Result<bool, BookingRepositoryError> {
        Ok(false)
    }

    async fn insert_with_reservation(
        &self,
        booking: &NewBooking,
        _journal: &FinanceJournal,
    ) -> Result<Booking, BookingRepositoryError> {
        Err(BookingRepositoryError::insufficient_stock(booking.stock_id.get()))
    }

    async fn save_status(
        &self,
        _booking: &Booking,
        _journal: &FinanceJournal,
    ) -> Result<(), BookingRepositoryError> {
        Ok(())
    }

    async fn save_cancellation(
        &self,
        _booking: &Booking,
        _journal: &FinanceJournal,
    ) -> Result<(), BookingRepositoryError> {
        Ok(())
    }

    async fn save_uncancellation(
        &self,
        _booking: &Booking,
        _journal: &FinanceJournal,
    ) -> Result<(), BookingRepositoryError> {
        Ok(())
    }

    async fn list_live_for_stock(
        &self,
        _stock_id: StockId,
    ) -> Result<Vec<Booking>, BookingRepositoryError> {
        Ok(Vec::new())
    }

    async fn update_cancellation_limit_dates(
        &self,
        _stock_id: StockId,
        _limit: DateTime<Utc>,
    ) -> Result<usize, BookingRepositoryError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[tokio::test]
    async fn fixture_lookup_returns_none() {
        let repo = FixtureBookingRepository;
        let found = repo
            .find_by_id(BookingId::new(1))
            .await
            .expect("fixture lookup succeeds");
        assert!(found.is_none());
    }

    #[rstest]
    fn insufficient_stock_formats_stock_id() {
        let err = BookingRepositoryError::insufficient_stock(12_i64);
        assert_eq!(err.to_string(), "stock 12 has not enough units left");
    }

    #[rstest]
    #[case(BookingRepositoryError::offer_already_booked(4_i64), "offer 4 is already booked by the user")]
    #[case(BookingRepositoryError::deposit_spending_changed(2_i64), "deposit 2 was charged concurrently")]
    #[case(BookingRepositoryError::settled_pricing(9_i64), "finance event 9 has a settled pricing")]
    fn concurrency_errors_name_the_contended_row(
        #[case] err: BookingRepositoryError,
        #[case] expected: &str,
    ) {
        assert_eq!(err.to_string(), expected);
    }
}
