//! Individual bookings and their lifecycle.
//!
//! A booking moves through `Confirmed → Used → Reimbursed`, or ends in
//! `Cancelled`. Back office tooling may walk some transitions backwards
//! (unuse, uncancel); those paths are exposed as separate methods so every
//! caller states which transition it means.

mod dates;
mod error;
mod listing;
mod rules;
mod token;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BookingId, Cents, DepositId, OfferId, OffererId, StockId, UserId, VenueId};

pub use self::dates::{
    ARCHIVE_DELAY, AUTO_USE_AFTER_EVENT_TIME_DELAY, BOOKINGS_AUTO_EXPIRY_DELAY,
    BOOKINGS_EXPIRY_NOTIFICATION_DELAY, BOOKS_BOOKINGS_AUTO_EXPIRY_DELAY,
    BOOKS_BOOKINGS_EXPIRY_NOTIFICATION_DELAY, CONFIRM_BOOKING_AFTER_CREATION_DELAY,
    CONFIRM_BOOKING_BEFORE_EVENT_DELAY, ExpiryCutoffs, compute_cancellation_limit_date,
    compute_edition_limit_date, expiry_cutoffs, soon_to_expire_windows, today_at_midnight,
};
pub use self::error::BookingError;
pub use self::listing::{BookingView, ClassifiedBookings, classify_and_sort_bookings};
pub use self::rules::{
    check_beneficiary_can_cancel_booking, check_booking_can_be_cancelled,
    check_can_be_marked_as_unused, check_can_book_free_offer, check_expenses_limits,
    check_is_usable, check_offer_already_booked, check_offer_category_is_bookable_by_user,
    check_quantity, check_stock_is_bookable,
};
#[cfg(test)]
pub use self::token::MockTokenGenerator;
pub use self::token::{BOOKING_TOKEN_LENGTH, RandomTokenGenerator, TokenGenerator};

/// Lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Booked and not yet collected.
    Confirmed,
    /// Collected or validated by the offerer.
    Used,
    /// Cancelled by someone, or expired.
    Cancelled,
    /// Paid back to the offerer.
    Reimbursed,
}

impl BookingStatus {
    /// Database representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "CONFIRMED",
            Self::Used => "USED",
            Self::Cancelled => "CANCELLED",
            Self::Reimbursed => "REIMBURSED",
        }
    }

    /// Parse the database representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "CONFIRMED" => Some(Self::Confirmed),
            "USED" => Some(Self::Used),
            "CANCELLED" => Some(Self::Cancelled),
            "REIMBURSED" => Some(Self::Reimbursed),
            _ => None,
        }
    }
}

/// Who or what cancelled a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingCancellationReason {
    /// The offerer cancelled.
    Offerer,
    /// The beneficiary cancelled.
    Beneficiary,
    /// Nobody collected the booking in time.
    Expired,
    /// Fraud was detected.
    Fraud,
    /// The offerer refused an external booking.
    Refused,
    /// Support staff cancelled.
    Backoffice,
}

impl BookingCancellationReason {
    /// Database representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offerer => "OFFERER",
            Self::Beneficiary => "BENEFICIARY",
            Self::Expired => "EXPIRED",
            Self::Fraud => "FRAUD",
            Self::Refused => "REFUSED_BY_INSTITUTE",
            Self::Backoffice => "BACKOFFICE",
        }
    }

    /// Parse the database representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "OFFERER" => Some(Self::Offerer),
            "BENEFICIARY" => Some(Self::Beneficiary),
            "EXPIRED" => Some(Self::Expired),
            "FRAUD" => Some(Self::Fraud),
            "REFUSED_BY_INSTITUTE" => Some(Self::Refused),
            "BACKOFFICE" => Some(Self::Backoffice),
            _ => None,
        }
    }
}

/// Who marked a booking as used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingValidationAuthorType {
    /// A pro user scanned or typed the token.
    Offerer,
    /// Support staff.
    Backoffice,
    /// A scheduled job or automatic usage on booking.
    Auto,
}

impl BookingValidationAuthorType {
    /// Database representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offerer => "OFFERER",
            Self::Backoffice => "BACKOFFICE",
            Self::Auto => "AUTO",
        }
    }

    /// Parse the database representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "OFFERER" => Some(Self::Offerer),
            "BACKOFFICE" => Some(Self::Backoffice),
            "AUTO" => Some(Self::Auto),
            _ => None,
        }
    }
}

/// An individual booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    /// Booking id.
    pub id: BookingId,
    /// Beneficiary.
    pub user_id: UserId,
    /// Booked stock.
    pub stock_id: StockId,
    /// Offer of the booked stock.
    pub offer_id: OfferId,
    /// Venue of the offer.
    pub venue_id: VenueId,
    /// Offerer owning the venue.
    pub offerer_id: OffererId,
    /// Deposit charged.
    pub deposit_id: Option<DepositId>,
    /// Booked units.
    pub quantity: u32,
    /// Unit price at booking time.
    pub amount: Cents,
    /// Counter mark shown to the offerer.
    pub token: String,
    /// Lifecycle status.
    pub status: BookingStatus,
    /// Creation instant.
    pub date_created: DateTime<Utc>,
    /// When the booking was used.
    pub date_used: Option<DateTime<Utc>>,
    /// When the booking was cancelled.
    pub cancellation_date: Option<DateTime<Utc>>,
    /// Why the booking was cancelled.
    pub cancellation_reason: Option<BookingCancellationReason>,
    /// Until when the beneficiary may cancel.
    pub cancellation_limit_date: Option<DateTime<Utc>>,
    /// Who marked the booking as used.
    pub validation_author_type: Option<BookingValidationAuthorType>,
    /// When the offerer was paid back.
    pub reimbursement_date: Option<DateTime<Utc>>,
    /// Whether the beneficiary archived the booking.
    pub display_as_ended: bool,
    /// Label of the price category booked.
    pub price_category_label: Option<String>,
}

impl Booking {
    /// Total charged to the deposit.
    pub const fn total_amount(&self) -> Cents {
        self.amount.times(self.quantity)
    }

    /// Whether the cancellation window has closed.
    pub fn is_confirmed(&self, now: DateTime<Utc>) -> bool {
        self.cancellation_limit_date.is_some_and(|limit| limit <= now)
    }

    /// Cancel the booking.
    ///
    /// # Errors
    ///
    /// Returns the rule violated when the booking is already cancelled,
    /// reimbursed, or used without `cancel_even_if_used`.
    pub fn cancel(
        &mut self,
        reason: BookingCancellationReason,
        now: DateTime<Utc>,
        cancel_even_if_used: bool,
    ) -> Result<(), BookingError> {
        match self.status {
            BookingStatus::Cancelled => return Err(BookingError::BookingIsAlreadyCancelled),
            BookingStatus::Reimbursed => return Err(BookingError::BookingIsAlreadyRefunded),
            BookingStatus::Used if !cancel_even_if_used => {
                return Err(BookingError::BookingIsAlreadyUsed);
            }
            BookingStatus::Used | BookingStatus::Confirmed => {}
        }
        self.status = BookingStatus::Cancelled;
        self.cancellation_date = Some(now);
        self.cancellation_reason = Some(reason);
        Ok(())
    }

    /// Mark the booking as collected.
    pub fn mark_as_used(&mut self, author: BookingValidationAuthorType, now: DateTime<Utc>) {
        self.status = BookingStatus::Used;
        self.date_used = Some(now);
        self.validation_author_type = Some(author);
    }

    /// Walk a used booking back to confirmed.
    pub fn mark_as_unused(&mut self) {
        self.status = BookingStatus::Confirmed;
        self.date_used = None;
        self.validation_author_type = None;
    }

    /// Revive a cancelled booking directly as used.
    pub fn uncancel_and_mark_as_used(
        &mut self,
        author: BookingValidationAuthorType,
        now: DateTime<Utc>,
    ) {
        self.cancellation_date = None;
        self.cancellation_reason = None;
        self.mark_as_used(author, now);
    }
}

/// Data needed to insert a booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    /// Beneficiary.
    pub user_id: UserId,
    /// Booked stock.
    pub stock_id: StockId,
    /// Offer of the stock.
    pub offer_id: OfferId,
    /// Venue of the offer.
    pub venue_id: VenueId,
    /// Offerer owning the venue.
    pub offerer_id: OffererId,
    /// Deposit charged.
    pub deposit_id: Option<DepositId>,
    /// Booked units.
    pub quantity: u32,
    /// Unit price.
    pub amount: Cents,
    /// Unique counter mark.
    pub token: String,
    /// Initial status.
    pub status: BookingStatus,
    /// Creation instant.
    pub date_created: DateTime<Utc>,
    /// Set when the booking is used on creation.
    pub date_used: Option<DateTime<Utc>>,
    /// Set when the booking is used on creation.
    pub validation_author_type: Option<BookingValidationAuthorType>,
    /// Until when the beneficiary may cancel.
    pub cancellation_limit_date: Option<DateTime<Utc>>,
    /// Total charged to the deposit when the spending limits were checked.
    pub deposit_spent: Cents,
    /// Attach a free activation code of the stock to the booking.
    pub claim_activation_code: bool,
}

#[cfg(test)]
#[path = "booking_tests.rs"]
mod tests;
