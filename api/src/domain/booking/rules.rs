//! Checks run before booking, cancelling or validating.

use chrono::{DateTime, Utc};

use super::{Booking, BookingError, BookingStatus};
use crate::domain::beneficiary::Beneficiary;
use crate::domain::deposit::{ExpenseDomain, Expenses, expense_domains};
use crate::domain::offer::{Offer, Stock};
use crate::domain::{Cents, UserId};

/// Free stocks may only be booked by beneficiaries.
pub fn check_can_book_free_offer(user: &Beneficiary, stock: &Stock) -> Result<(), BookingError> {
    if stock.price.is_zero() && !user.can_book_free_offers() {
        return Err(BookingError::CannotBookFreeOffers);
    }
    Ok(())
}

/// A beneficiary holds at most one live booking per offer.
pub const fn check_offer_already_booked(already_booked: bool) -> Result<(), BookingError> {
    if already_booked {
        return Err(BookingError::OfferIsAlreadyBooked);
    }
    Ok(())
}

/// Duo offers accept one or two places, others exactly one.
pub const fn check_quantity(offer: &Offer, quantity: u32) -> Result<(), BookingError> {
    if offer.is_duo {
        if quantity == 0 || quantity > 2 {
            return Err(BookingError::DuoQuantityIsInvalid);
        }
    } else if quantity != 1 {
        return Err(BookingError::QuantityIsNotOne);
    }
    Ok(())
}

/// The stock must be bookable and hold enough units.
pub fn check_stock_is_bookable(
    stock: &Stock,
    offer: &Offer,
    quantity: u32,
    now: DateTime<Utc>,
) -> Result<(), BookingError> {
    let enough_left = stock
        .remaining_quantity()
        .is_none_or(|remaining| remaining >= quantity);
    if !stock.is_bookable(offer, now) || !enough_left {
        return Err(BookingError::StockIsNotBookable);
    }
    Ok(())
}

/// Underage beneficiaries cannot book video games, nor paid online offers
/// outside the subcategories opened to them.
pub fn check_offer_category_is_bookable_by_user(
    user: &Beneficiary,
    offer: &Offer,
    stock: &Stock,
) -> Result<(), BookingError> {
    if !user.is_underage_beneficiary() {
        return Ok(());
    }
    let subcategory = offer.subcategory();
    if subcategory.is_some_and(|sub| sub.is_video_game) {
        return Err(BookingError::OfferCategoryNotBookableByUser);
    }
    let opened = subcategory.is_some_and(|sub| sub.bookable_digital_by_underage);
    if offer.is_digital() && !stock.price.is_zero() && !opened {
        return Err(BookingError::OfferCategoryNotBookableByUser);
    }
    Ok(())
}

/// The deposit must cover `requested` within its caps.
pub fn check_expenses_limits(
    user: &Beneficiary,
    expenses: &Expenses,
    requested: Cents,
    offer: &Offer,
    now: DateTime<Utc>,
) -> Result<(), BookingError> {
    let deposit = user
        .deposit
        .as_ref()
        .filter(|deposit| !deposit.is_expired(now))
        .ok_or(BookingError::UserHasInsufficientFunds)?;

    if requested > deposit.amount - expenses.all {
        return Err(BookingError::UserHasInsufficientFunds);
    }

    let caps = deposit.specific_caps();
    let domains = expense_domains(&offer.subcategory_id, offer.is_digital());
    if let Some(cap) = caps.digital {
        if domains.contains(&ExpenseDomain::Digital) && expenses.digital + requested > cap {
            return Err(BookingError::DigitalExpenseLimitHasBeenReached { cap });
        }
    }
    if let Some(cap) = caps.physical {
        if domains.contains(&ExpenseDomain::Physical) && expenses.physical + requested > cap {
            return Err(BookingError::PhysicalExpenseLimitHasBeenReached { cap });
        }
    }
    Ok(())
}

/// A booking can be validated once, and event bookings only after their
/// cancellation window closed.
pub fn check_is_usable(
    booking: &Booking,
    event_beginning: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), BookingError> {
    match booking.status {
        BookingStatus::Reimbursed => return Err(BookingError::BookingIsAlreadyRefunded),
        BookingStatus::Used => return Err(BookingError::BookingIsAlreadyUsed),
        BookingStatus::Cancelled => return Err(BookingError::BookingIsAlreadyCancelled),
        BookingStatus::Confirmed => {}
    }
    if event_beginning.is_some() && !booking.is_confirmed(now) {
        let confirmable_from = booking
            .cancellation_limit_date
            .map(|limit| limit.format("%d/%m/%Y à %H:%M").to_string())
            .unwrap_or_default();
        return Err(BookingError::BookingIsNotConfirmed {
            booked_on: booking.date_created.format("%d/%m/%Y à %H:%M").to_string(),
            confirmable_from,
        });
    }
    Ok(())
}

/// A beneficiary may cancel their own live booking while the window is open.
pub fn check_beneficiary_can_cancel_booking(
    user_id: UserId,
    booking: &Booking,
    now: DateTime<Utc>,
) -> Result<(), BookingError> {
    if booking.user_id != user_id {
        return Err(BookingError::BookingDoesntExist);
    }
    match booking.status {
        BookingStatus::Used => return Err(BookingError::BookingIsAlreadyUsed),
        BookingStatus::Cancelled => return Err(BookingError::BookingIsAlreadyCancelled),
        BookingStatus::Reimbursed => return Err(BookingError::BookingIsAlreadyRefunded),
        BookingStatus::Confirmed => {}
    }
    if booking.is_confirmed(now) {
        return Err(BookingError::CannotCancelConfirmedBooking);
    }
    Ok(())
}

/// Offerers may cancel bookings that are neither cancelled nor used.
pub const fn check_booking_can_be_cancelled(booking: &Booking) -> Result<(), BookingError> {
    match booking.status {
        BookingStatus::Cancelled => Err(BookingError::BookingIsAlreadyCancelled),
        BookingStatus::Used => Err(BookingError::BookingIsAlreadyUsed),
        BookingStatus::Reimbursed => Err(BookingError::BookingIsAlreadyRefunded),
        BookingStatus::Confirmed => Ok(()),
    }
}

/// Only used, unreimbursed bookings can be walked back.
pub const fn check_can_be_marked_as_unused(booking: &Booking) -> Result<(), BookingError> {
    match booking.status {
        BookingStatus::Reimbursed => Err(BookingError::BookingIsAlreadyRefunded),
        BookingStatus::Cancelled => Err(BookingError::BookingIsAlreadyCancelled),
        BookingStatus::Confirmed => Err(BookingError::BookingIsNotUsed),
        BookingStatus::Used => Ok(()),
    }
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
