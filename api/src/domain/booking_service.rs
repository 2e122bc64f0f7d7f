//! Individual booking use cases.
//!
//! The service validates each request with the rules in
//! [`crate::domain::booking`], persists through the repository ports and
//! then signals search and the notification queue. Finance events ride
//! along with the booking write in a [`FinanceJournal`]. Signals are sent
//! after the write succeeded; a failed signal is logged and does not undo
//! it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::{info, warn};

use crate::domain::booking::{
    Booking, BookingCancellationReason, BookingError, BookingStatus, BookingValidationAuthorType,
    NewBooking, TokenGenerator, check_beneficiary_can_cancel_booking,
    check_booking_can_be_cancelled, check_can_be_marked_as_unused, check_can_book_free_offer,
    check_expenses_limits, check_is_usable, check_offer_already_booked,
    check_offer_category_is_bookable_by_user, check_quantity, check_stock_is_bookable,
    compute_cancellation_limit_date, compute_edition_limit_date,
};
use crate::domain::deposit::Expenses;
use crate::domain::finance::{FinanceEvent, FinanceEventMotive, FinanceJournal};
use crate::domain::indexing::IndexationReason;
use crate::domain::notification::Notification;
use crate::domain::offer::BookableStock;
use crate::domain::ports::{
    BeneficiaryRepository, BeneficiaryRepositoryError, BookingRepository, BookingRepositoryError,
    DepositRepository, DepositRepositoryError, FinanceEventRepository,
    FinanceEventRepositoryError, NotificationQueue, OfferIndexer, StockRepository,
    StockRepositoryError,
};
use crate::domain::{BookingId, Error, OfferId, StockId, UserId};

/// Attempts at drawing an unused booking token before giving up.
const TOKEN_GENERATION_ATTEMPTS: usize = 100;

fn map_booking_repository_error(error: BookingRepositoryError) -> Error {
    match error {
        BookingRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("booking repository unavailable: {message}"))
        }
        BookingRepositoryError::Query { message } => {
            Error::internal(format!("booking repository error: {message}"))
        }
        BookingRepositoryError::InsufficientStock { .. } => BookingError::StockIsNotBookable.into(),
        BookingRepositoryError::Missing { .. } => BookingError::BookingDoesntExist.into(),
        BookingRepositoryError::OfferAlreadyBooked { .. } => {
            BookingError::OfferIsAlreadyBooked.into()
        }
        BookingRepositoryError::DepositSpendingChanged { .. } => {
            BookingError::ConcurrentBooking.into()
        }
        BookingRepositoryError::NoActivationCode { .. } => {
            BookingError::NoActivationCodeAvailable.into()
        }
        BookingRepositoryError::SettledPricing { .. } => {
            BookingError::NonCancellablePricing.into()
        }
    }
}

/// A pricing settled under a cancellation is a rule failure, not an outage.
fn map_cancellation_write_error(error: BookingRepositoryError) -> CancelFailure {
    match error {
        BookingRepositoryError::SettledPricing { .. } => {
            CancelFailure::Rule(BookingError::NonCancellablePricing)
        }
        other => CancelFailure::Port(map_booking_repository_error(other)),
    }
}

fn map_stock_repository_error(error: StockRepositoryError) -> Error {
    match error {
        StockRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("stock repository unavailable: {message}"))
        }
        StockRepositoryError::Query { message } => {
            Error::internal(format!("stock repository error: {message}"))
        }
    }
}

pub(crate) fn map_beneficiary_repository_error(error: BeneficiaryRepositoryError) -> Error {
    match error {
        BeneficiaryRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("beneficiary repository unavailable: {message}"))
        }
        BeneficiaryRepositoryError::Query { message } => {
            Error::internal(format!("beneficiary repository error: {message}"))
        }
    }
}

pub(crate) fn map_deposit_repository_error(error: DepositRepositoryError) -> Error {
    match error {
        DepositRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("deposit repository unavailable: {message}"))
        }
        DepositRepositoryError::Query { message } => {
            Error::internal(format!("deposit repository error: {message}"))
        }
    }
}

fn map_finance_event_repository_error(error: FinanceEventRepositoryError) -> Error {
    match error {
        FinanceEventRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("finance event repository unavailable: {message}"))
        }
        FinanceEventRepositoryError::Query { message } => {
            Error::internal(format!("finance event repository error: {message}"))
        }
    }
}

/// Why a cancellation did not go through.
///
/// Bulk cancellation skips rule failures but stops on infrastructure ones.
enum CancelFailure {
    Rule(BookingError),
    Port(Error),
}

impl From<BookingError> for CancelFailure {
    fn from(value: BookingError) -> Self {
        Self::Rule(value)
    }
}

impl From<Error> for CancelFailure {
    fn from(value: Error) -> Self {
        Self::Port(value)
    }
}

impl From<CancelFailure> for Error {
    fn from(value: CancelFailure) -> Self {
        match value {
            CancelFailure::Rule(rule) => rule.into(),
            CancelFailure::Port(error) => error,
        }
    }
}

/// Port bundle required by [`BookingService`].
#[derive(Clone)]
pub struct BookingServicePorts {
    /// Booking persistence.
    pub bookings: Arc<dyn BookingRepository>,
    /// Stock reads.
    pub stocks: Arc<dyn StockRepository>,
    /// Users and their wallet.
    pub beneficiaries: Arc<dyn BeneficiaryRepository>,
    /// Deposit reads.
    pub deposits: Arc<dyn DepositRepository>,
    /// Finance event journal.
    pub finance_events: Arc<dyn FinanceEventRepository>,
    /// Search reindexing signal.
    pub indexer: Arc<dyn OfferIndexer>,
    /// Notification job queue.
    pub notifications: Arc<dyn NotificationQueue>,
}

/// Booking use cases.
#[derive(Clone)]
pub struct BookingService {
    ports: BookingServicePorts,
    clock: Arc<dyn Clock>,
    tokens: Arc<dyn TokenGenerator>,
}

impl BookingService {
    /// Build the service.
    pub fn new(
        ports: BookingServicePorts,
        clock: Arc<dyn Clock>,
        tokens: Arc<dyn TokenGenerator>,
    ) -> Self {
        Self {
            ports,
            clock,
            tokens,
        }
    }

    /// Book `quantity` units of a stock for a beneficiary.
    ///
    /// # Errors
    ///
    /// Returns the first booking rule violated, in the order category,
    /// free offer, already booked, quantity, stock, expenses; or a
    /// repository failure.
    pub async fn book_offer(
        &self,
        user_id: UserId,
        stock_id: StockId,
        quantity: u32,
    ) -> Result<Booking, Error> {
        let now = self.clock.utc();
        let bookable = self.find_stock(stock_id).await?;
        let claim_activation_code = bookable.uses_activation_codes();
        let BookableStock {
            stock,
            offer,
            offerer_id,
            ..
        } = bookable;
        let user = self
            .ports
            .beneficiaries
            .find_by_id(user_id)
            .await
            .map_err(map_beneficiary_repository_error)?
            .ok_or_else(|| Error::not_found(format!("user {user_id} not found")))?;

        check_offer_category_is_bookable_by_user(&user, &offer, &stock)?;
        check_can_book_free_offer(&user, &stock)?;
        let already_booked = self
            .ports
            .bookings
            .has_live_booking_for_offer(user_id, offer.id)
            .await
            .map_err(map_booking_repository_error)?;
        check_offer_already_booked(already_booked)?;
        check_quantity(&offer, quantity)?;
        check_stock_is_bookable(&stock, &offer, quantity, now)?;

        let requested = stock.price.times(quantity);
        let expenses = match user.deposit.as_ref() {
            Some(deposit) => {
                let lines = self
                    .ports
                    .beneficiaries
                    .list_expense_lines(deposit.id)
                    .await
                    .map_err(map_beneficiary_repository_error)?;
                Expenses::from_lines(&lines)
            }
            None => Expenses::default(),
        };
        check_expenses_limits(&user, &expenses, requested, &offer, now)?;

        let first_venue_booking = !self
            .ports
            .bookings
            .venue_has_bookings(offer.venue_id)
            .await
            .map_err(map_booking_repository_error)?;
        let token = self.generate_unique_token().await?;
        let auto_used = offer.is_automatically_used() || claim_activation_code;
        let deposit_id = user
            .deposit
            .as_ref()
            .filter(|deposit| !deposit.is_expired(now))
            .map(|deposit| deposit.id);

        let new_booking = NewBooking {
            user_id,
            stock_id,
            offer_id: offer.id,
            venue_id: offer.venue_id,
            offerer_id,
            deposit_id,
            quantity,
            amount: stock.price,
            token,
            status: if auto_used {
                BookingStatus::Used
            } else {
                BookingStatus::Confirmed
            },
            date_created: now,
            date_used: auto_used.then_some(now),
            validation_author_type: auto_used.then_some(BookingValidationAuthorType::Auto),
            cancellation_limit_date: compute_cancellation_limit_date(
                stock.beginning_datetime,
                now,
            ),
            deposit_spent: expenses.all,
            claim_activation_code,
        };
        let journal = if auto_used {
            FinanceJournal::recording(FinanceEventMotive::BookingUsed, now)
        } else {
            FinanceJournal::empty(now)
        };
        let booking = self
            .ports
            .bookings
            .insert_with_reservation(&new_booking, &journal)
            .await
            .map_err(map_booking_repository_error)?;

        info!(
            actor = %user_id,
            offer_id = %offer.id,
            stock_id = %stock_id,
            booking_id = %booking.id,
            used = auto_used,
            activation_code = claim_activation_code,
            booking_quantity = booking.quantity,
            "beneficiary booked an offer"
        );

        self.reindex(&[offer.id], IndexationReason::BookingCreation)
            .await;
        self.notify(Notification::NewBookingToPro {
            booking_id: booking.id,
            first_venue_booking,
        })
        .await;
        self.notify(Notification::BookingConfirmationToBeneficiary {
            booking_id: booking.id,
        })
        .await;

        Ok(booking)
    }

    /// Cancel a booking at its beneficiary's request.
    ///
    /// # Errors
    ///
    /// Fails when the booking belongs to someone else, is no longer live or
    /// its cancellation window closed.
    pub async fn cancel_booking_by_beneficiary(
        &self,
        user_id: UserId,
        booking_id: BookingId,
    ) -> Result<Booking, Error> {
        let booking = self.find_booking(booking_id).await?;
        check_beneficiary_can_cancel_booking(user_id, &booking, self.clock.utc())?;
        let booking = self
            .cancel(booking, BookingCancellationReason::Beneficiary, false)
            .await?;
        self.notify(Notification::BookingCancellation {
            booking_id,
            reason: BookingCancellationReason::Beneficiary,
        })
        .await;
        Ok(booking)
    }

    /// Cancel a booking at the offerer's request.
    ///
    /// # Errors
    ///
    /// Fails when the booking is already cancelled, used or refunded.
    pub async fn cancel_booking_by_offerer(&self, booking_id: BookingId) -> Result<Booking, Error> {
        let booking = self.find_booking(booking_id).await?;
        check_booking_can_be_cancelled(&booking)?;
        let booking = self
            .cancel(booking, BookingCancellationReason::Offerer, false)
            .await?;
        self.notify(Notification::CancelBookingPush {
            booking_ids: vec![booking_id],
        })
        .await;
        self.notify(Notification::BookingCancellation {
            booking_id,
            reason: BookingCancellationReason::Offerer,
        })
        .await;
        Ok(booking)
    }

    /// Cancel a fraudulent booking.
    ///
    /// Returns `None` when the booking could not be cancelled after all,
    /// for instance because it was priced in the meantime.
    ///
    /// # Errors
    ///
    /// Fails when the booking is already cancelled, used or refunded.
    pub async fn cancel_booking_for_fraud(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Booking>, Error> {
        let booking = self.find_booking(booking_id).await?;
        check_booking_can_be_cancelled(&booking)?;
        match self
            .cancel(booking, BookingCancellationReason::Fraud, false)
            .await
        {
            Ok(booking) => {
                info!(booking_id = %booking_id, "cancelled booking for fraud reason");
                self.notify(Notification::BookingCancellation {
                    booking_id,
                    reason: BookingCancellationReason::Fraud,
                })
                .await;
                Ok(Some(booking))
            }
            Err(CancelFailure::Rule(rule)) => {
                info!(booking_id = %booking_id, error = %rule, "fraud cancellation skipped");
                Ok(None)
            }
            Err(CancelFailure::Port(error)) => Err(error),
        }
    }

    /// Cancel every live booking of a stock.
    ///
    /// Used bookings are cancelled too when the offer is an event. Bookings
    /// a rule keeps from being cancelled are logged and skipped.
    ///
    /// # Errors
    ///
    /// Fails when the stock is unknown or a repository is unavailable.
    pub async fn cancel_bookings_from_stock(
        &self,
        stock_id: StockId,
        reason: BookingCancellationReason,
    ) -> Result<Vec<Booking>, Error> {
        let BookableStock { offer, .. } = self.find_stock(stock_id).await?;
        let cancel_even_if_used = offer.is_event();
        let live = self
            .ports
            .bookings
            .list_live_for_stock(stock_id)
            .await
            .map_err(map_booking_repository_error)?;

        let mut cancelled = Vec::with_capacity(live.len());
        for booking in live {
            let booking_id = booking.id;
            match self.cancel(booking, reason, cancel_even_if_used).await {
                Ok(booking) => cancelled.push(booking),
                Err(CancelFailure::Rule(rule)) => {
                    info!(
                        booking_id = %booking_id,
                        reason = reason.as_str(),
                        error = %rule,
                        "booking left uncancelled"
                    );
                }
                Err(CancelFailure::Port(error)) => return Err(error),
            }
        }

        if !cancelled.is_empty() {
            self.notify(Notification::CancelBookingPush {
                booking_ids: cancelled.iter().map(|booking| booking.id).collect(),
            })
            .await;
            for booking in &cancelled {
                self.notify(Notification::BookingCancellation {
                    booking_id: booking.id,
                    reason,
                })
                .await;
            }
        }
        Ok(cancelled)
    }

    /// Validate a booking's counter mark.
    ///
    /// # Errors
    ///
    /// Fails when the booking is not confirmed, or is an event booking
    /// whose cancellation window is still open.
    pub async fn mark_as_used(
        &self,
        booking_id: BookingId,
        author: BookingValidationAuthorType,
    ) -> Result<Booking, Error> {
        let now = self.clock.utc();
        let mut booking = self.find_booking(booking_id).await?;
        let BookableStock { stock, .. } = self.find_stock(booking.stock_id).await?;
        check_is_usable(&booking, stock.beginning_datetime, now)?;

        booking.mark_as_used(author, now);
        self.save_status(
            &booking,
            &FinanceJournal::recording(FinanceEventMotive::BookingUsed, now),
        )
        .await?;

        info!(booking_id = %booking_id, "booking was marked as used");
        Ok(booking)
    }

    /// Mark a booking as used, reviving it first if it was cancelled.
    ///
    /// For bookings cancelled by mistake after the beneficiary already
    /// collected the good.
    ///
    /// # Errors
    ///
    /// Fails when the deposit charged has expired or the booking was
    /// refunded. The units go back to the stock without a capacity check.
    pub async fn mark_as_used_with_uncancelling(
        &self,
        booking_id: BookingId,
        author: BookingValidationAuthorType,
    ) -> Result<Booking, Error> {
        let now = self.clock.utc();
        let mut booking = self.find_booking(booking_id).await?;
        self.check_deposit_not_expired(&booking, now).await?;
        let journal =
            FinanceJournal::recording(FinanceEventMotive::BookingUsedAfterCancellation, now);

        match booking.status {
            BookingStatus::Cancelled => {
                booking.uncancel_and_mark_as_used(author, now);
                self.ports
                    .bookings
                    .save_uncancellation(&booking, &journal)
                    .await
                    .map_err(map_booking_repository_error)?;
            }
            BookingStatus::Confirmed => {
                booking.mark_as_used(author, now);
                self.save_status(&booking, &journal).await?;
            }
            BookingStatus::Used => {
                booking.validation_author_type = Some(author);
                self.save_status(&booking, &journal).await?;
            }
            BookingStatus::Reimbursed => return Err(BookingError::BookingIsAlreadyRefunded.into()),
        }

        info!(booking_id = %booking_id, "booking was uncancelled and marked as used");
        Ok(booking)
    }

    /// Walk a used booking back to confirmed.
    ///
    /// # Errors
    ///
    /// Fails when the booking is not used, or its pricing is settled.
    pub async fn mark_as_unused(&self, booking_id: BookingId) -> Result<Booking, Error> {
        let now = self.clock.utc();
        let mut booking = self.find_booking(booking_id).await?;
        check_can_be_marked_as_unused(&booking)?;
        let latest = self
            .latest_cancellable_event(booking_id)
            .await
            .map_err(Error::from)?;

        booking.mark_as_unused();
        let journal = FinanceJournal::recording(FinanceEventMotive::BookingUnused, now)
            .cancelling(latest.map(|event| event.id));
        self.save_status(&booking, &journal).await?;

        info!(booking_id = %booking_id, "booking was marked as unused");
        Ok(booking)
    }

    /// Cancel a booking from the back office, even if used.
    ///
    /// # Errors
    ///
    /// Fails when the booking is already cancelled or refunded.
    pub async fn mark_as_cancelled(
        &self,
        booking_id: BookingId,
        reason: BookingCancellationReason,
    ) -> Result<Booking, Error> {
        let booking = self.find_booking(booking_id).await?;
        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::BookingIsAlreadyCancelled.into());
        }
        if booking.status == BookingStatus::Reimbursed || booking.reimbursement_date.is_some() {
            return Err(BookingError::BookingIsAlreadyRefunded.into());
        }
        let booking = self.cancel(booking, reason, true).await?;
        self.notify(Notification::BookingCancellation { booking_id, reason })
            .await;
        Ok(booking)
    }

    /// Reset cancellation limits after the event of a stock moved.
    ///
    /// # Errors
    ///
    /// Fails when the booking repository is unavailable.
    pub async fn update_cancellation_limit_dates(
        &self,
        stock_id: StockId,
        new_beginning: DateTime<Utc>,
    ) -> Result<usize, Error> {
        let limit = compute_edition_limit_date(new_beginning, self.clock.utc());
        let updated = self
            .ports
            .bookings
            .update_cancellation_limit_dates(stock_id, limit)
            .await
            .map_err(map_booking_repository_error)?;
        info!(stock_id = %stock_id, updated, %limit, "cancellation limit dates updated");
        Ok(updated)
    }

    async fn cancel(
        &self,
        mut booking: Booking,
        reason: BookingCancellationReason,
        cancel_even_if_used: bool,
    ) -> Result<Booking, CancelFailure> {
        let now = self.clock.utc();
        booking.cancel(reason, now, cancel_even_if_used)?;

        let journal = match self.latest_cancellable_event(booking.id).await? {
            Some(event) => {
                FinanceJournal::recording(FinanceEventMotive::BookingCancelledAfterUse, now)
                    .cancelling(Some(event.id))
            }
            None => FinanceJournal::empty(now),
        };
        self.ports
            .bookings
            .save_cancellation(&booking, &journal)
            .await
            .map_err(map_cancellation_write_error)?;

        info!(
            booking_id = %booking.id,
            reason = reason.as_str(),
            booking_token = %booking.token,
            "booking has been cancelled"
        );
        self.reindex(&[booking.offer_id], IndexationReason::BookingCancellation)
            .await;
        Ok(booking)
    }

    /// The booking's latest finance event, refused when already settled.
    async fn latest_cancellable_event(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<FinanceEvent>, CancelFailure> {
        let Some(event) = self
            .ports
            .finance_events
            .find_latest_active_event(booking_id)
            .await
            .map_err(map_finance_event_repository_error)?
        else {
            return Ok(None);
        };
        if event.pricing_status.is_some_and(|status| status.is_settled()) {
            return Err(BookingError::NonCancellablePricing.into());
        }
        Ok(Some(event))
    }

    async fn check_deposit_not_expired(
        &self,
        booking: &Booking,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let Some(deposit_id) = booking.deposit_id else {
            return Ok(());
        };
        let deposits = self
            .ports
            .deposits
            .list_for_user(booking.user_id)
            .await
            .map_err(map_deposit_repository_error)?;
        let expired = deposits
            .iter()
            .any(|deposit| deposit.id == deposit_id && deposit.is_expired(now));
        if expired {
            return Err(BookingError::BookingDepositCreditExpired.into());
        }
        Ok(())
    }

    async fn generate_unique_token(&self) -> Result<String, Error> {
        for _ in 0..TOKEN_GENERATION_ATTEMPTS {
            let candidate = self.tokens.generate();
            let taken = self
                .ports
                .bookings
                .token_exists(&candidate)
                .await
                .map_err(map_booking_repository_error)?;
            if !taken {
                return Ok(candidate);
            }
        }
        Err(BookingError::TokenGenerationExhausted.into())
    }

    async fn find_booking(&self, booking_id: BookingId) -> Result<Booking, Error> {
        self.ports
            .bookings
            .find_by_id(booking_id)
            .await
            .map_err(map_booking_repository_error)?
            .ok_or_else(|| BookingError::BookingDoesntExist.into())
    }

    async fn find_stock(&self, stock_id: StockId) -> Result<BookableStock, Error> {
        self.ports
            .stocks
            .find_bookable(stock_id)
            .await
            .map_err(map_stock_repository_error)?
            .ok_or_else(|| BookingError::StockDoesNotExist.into())
    }

    async fn save_status(&self, booking: &Booking, journal: &FinanceJournal) -> Result<(), Error> {
        self.ports
            .bookings
            .save_status(booking, journal)
            .await
            .map_err(map_booking_repository_error)
    }

    async fn reindex(&self, offer_ids: &[OfferId], reason: IndexationReason) {
        if let Err(error) = self.ports.indexer.index_offer_ids(offer_ids, reason).await {
            warn!(%error, reason = reason.as_str(), "could not signal offers for reindexing");
        }
    }

    async fn notify(&self, notification: Notification) {
        if let Err(error) = self.ports.notifications.enqueue(&notification).await {
            warn!(%error, kind = notification.kind(), "could not enqueue notification");
        }
    }
}

#[cfg(test)]
#[path = "booking_service_tests.rs"]
mod tests;
