//! Tests for the booking checks.

use chrono::Duration;
use rstest::rstest;

use super::*;
use crate::domain::beneficiary::UserRole;
use crate::domain::deposit::{DepositType, Expenses};
use crate::domain::offer::OfferValidation;
use crate::test_support::fixtures::{beneficiary, booking, fixed_now, offer, stock};

fn grant_18_v1() -> Beneficiary {
    let mut user = beneficiary();
    if let Some(deposit) = user.deposit.as_mut() {
        deposit.version = 1;
        deposit.amount = Cents::euros(500);
    }
    user
}

fn digital_offer(subcategory_id: &str) -> Offer {
    let mut digital = offer();
    digital.subcategory_id = subcategory_id.to_owned();
    digital.url = Some("https://example.com/offre".to_owned());
    digital
}

#[rstest]
fn non_beneficiary_cannot_book_free_offer() {
    let mut user = beneficiary();
    user.roles = vec![UserRole::Pro];
    let mut free = stock();
    free.price = Cents::ZERO;

    assert_eq!(
        check_can_book_free_offer(&user, &free),
        Err(BookingError::CannotBookFreeOffers)
    );
    assert_eq!(check_can_book_free_offer(&user, &stock()), Ok(()));
}

#[rstest]
fn already_booked_offer_is_refused() {
    assert_eq!(
        check_offer_already_booked(true),
        Err(BookingError::OfferIsAlreadyBooked)
    );
}

#[rstest]
#[case(false, 1, Ok(()))]
#[case(false, 2, Err(BookingError::QuantityIsNotOne))]
#[case(true, 2, Ok(()))]
#[case(true, 3, Err(BookingError::DuoQuantityIsInvalid))]
#[case(true, 0, Err(BookingError::DuoQuantityIsInvalid))]
fn quantity_depends_on_duo(
    #[case] is_duo: bool,
    #[case] quantity: u32,
    #[case] expected: Result<(), BookingError>,
) {
    let mut candidate = offer();
    candidate.is_duo = is_duo;
    assert_eq!(check_quantity(&candidate, quantity), expected);
}

#[rstest]
fn stock_without_enough_units_is_not_bookable() {
    let mut nearly_gone = stock();
    nearly_gone.quantity = Some(3);
    nearly_gone.dn_booked_quantity = 2;

    assert_eq!(
        check_stock_is_bookable(&nearly_gone, &offer(), 2, fixed_now()),
        Err(BookingError::StockIsNotBookable)
    );
    assert_eq!(
        check_stock_is_bookable(&nearly_gone, &offer(), 1, fixed_now()),
        Ok(())
    );
}

#[rstest]
fn rejected_offer_is_not_bookable() {
    let mut rejected = offer();
    rejected.validation = OfferValidation::Rejected;
    assert_eq!(
        check_stock_is_bookable(&stock(), &rejected, 1, fixed_now()),
        Err(BookingError::StockIsNotBookable)
    );
}

#[rstest]
#[case("ABO_JEU_VIDEO", Cents::ZERO, false)]
#[case("VOD", Cents::euros(5), false)]
#[case("ABO_PRESSE_EN_LIGNE", Cents::euros(5), true)]
#[case("VOD", Cents::ZERO, true)]
fn underage_restrictions_on_online_offers(
    #[case] subcategory_id: &str,
    #[case] price: Cents,
    #[case] allowed: bool,
) {
    let mut user = beneficiary();
    user.roles = vec![UserRole::UnderageBeneficiary];
    let mut priced = stock();
    priced.price = price;

    let result =
        check_offer_category_is_bookable_by_user(&user, &digital_offer(subcategory_id), &priced);

    assert_eq!(result.is_ok(), allowed);
}

#[rstest]
fn adults_may_book_video_games() {
    let result =
        check_offer_category_is_bookable_by_user(&beneficiary(), &digital_offer("ABO_JEU_VIDEO"), &stock());
    assert_eq!(result, Ok(()));
}

#[rstest]
#[case(Cents::euros(10), Ok(()))]
#[case(Cents::euros(11), Err(BookingError::UserHasInsufficientFunds))]
fn global_balance_is_enforced(#[case] requested: Cents, #[case] expected: Result<(), BookingError>) {
    let user = grant_18_v1();
    let expenses = Expenses {
        all: Cents::euros(490),
        ..Expenses::default()
    };
    let result = check_expenses_limits(&user, &expenses, requested, &offer(), fixed_now());
    assert_eq!(result, expected);
}

#[rstest]
#[case(Cents::euros(10), Ok(()))]
#[case(Cents::euros(11), Err(BookingError::PhysicalExpenseLimitHasBeenReached { cap: Cents::euros(200) }))]
fn physical_cap_is_enforced_for_v1(
    #[case] requested: Cents,
    #[case] expected: Result<(), BookingError>,
) {
    let expenses = Expenses {
        all: Cents::euros(190),
        physical: Cents::euros(190),
        ..Expenses::default()
    };
    let result = check_expenses_limits(&grant_18_v1(), &expenses, requested, &offer(), fixed_now());
    assert_eq!(result, expected);
}

#[rstest]
fn digital_cap_is_enforced_for_v2() {
    let expenses = Expenses {
        all: Cents::euros(95),
        digital: Cents::euros(95),
        ..Expenses::default()
    };
    let result = check_expenses_limits(
        &beneficiary(),
        &expenses,
        Cents::euros(6),
        &digital_offer("VOD"),
        fixed_now(),
    );
    assert_eq!(
        result,
        Err(BookingError::DigitalExpenseLimitHasBeenReached {
            cap: Cents::euros(100)
        })
    );
}

#[rstest]
fn uncapped_digital_offer_only_checks_balance() {
    let expenses = Expenses {
        all: Cents::euros(150),
        digital: Cents::euros(150),
        ..Expenses::default()
    };
    let result = check_expenses_limits(
        &beneficiary(),
        &expenses,
        Cents::euros(50),
        &digital_offer("OEUVRE_ART"),
        fixed_now(),
    );
    assert_eq!(result, Ok(()));
}

#[rstest]
fn expired_deposit_counts_as_insufficient_funds() {
    let mut user = beneficiary();
    if let Some(deposit) = user.deposit.as_mut() {
        deposit.expiration_date = Some(fixed_now() - Duration::days(1));
    }
    let result = check_expenses_limits(
        &user,
        &Expenses::default(),
        Cents::euros(1),
        &offer(),
        fixed_now(),
    );
    assert_eq!(result, Err(BookingError::UserHasInsufficientFunds));
}

#[rstest]
fn underage_grant_has_no_caps() {
    let mut user = beneficiary();
    if let Some(deposit) = user.deposit.as_mut() {
        deposit.deposit_type = DepositType::Grant15To17;
        deposit.amount = Cents::euros(30);
    }
    let result = check_expenses_limits(
        &user,
        &Expenses::default(),
        Cents::euros(30),
        &digital_offer("VOD"),
        fixed_now(),
    );
    assert_eq!(result, Ok(()));
}

#[rstest]
#[case(BookingStatus::Reimbursed, BookingError::BookingIsAlreadyRefunded)]
#[case(BookingStatus::Used, BookingError::BookingIsAlreadyUsed)]
#[case(BookingStatus::Cancelled, BookingError::BookingIsAlreadyCancelled)]
fn finished_bookings_are_not_usable(#[case] status: BookingStatus, #[case] expected: BookingError) {
    let mut finished = booking();
    finished.status = status;
    assert_eq!(check_is_usable(&finished, None, fixed_now()), Err(expected));
}

#[rstest]
fn event_booking_inside_cancellation_window_is_not_usable() {
    let now = fixed_now();
    let mut event = booking();
    event.date_created = now - Duration::days(1);
    event.cancellation_limit_date = Some(now + Duration::days(1));

    let result = check_is_usable(&event, Some(now + Duration::weeks(1)), now);

    assert!(matches!(
        result,
        Err(BookingError::BookingIsNotConfirmed { .. })
    ));
}

#[rstest]
fn event_booking_after_cancellation_window_is_usable() {
    let now = fixed_now();
    let mut event = booking();
    event.date_created = now - Duration::days(3);
    event.cancellation_limit_date = Some(now - Duration::days(1));

    assert_eq!(check_is_usable(&event, Some(now + Duration::days(4)), now), Ok(()));
}

#[rstest]
fn beneficiary_cannot_cancel_someone_elses_booking() {
    let result = check_beneficiary_can_cancel_booking(UserId::new(999), &booking(), fixed_now());
    assert_eq!(result, Err(BookingError::BookingDoesntExist));
}

#[rstest]
fn beneficiary_cannot_cancel_confirmed_booking() {
    let now = fixed_now();
    let mut event = booking();
    event.cancellation_limit_date = Some(now - Duration::hours(1));

    let result = check_beneficiary_can_cancel_booking(event.user_id, &event, now);

    assert_eq!(result, Err(BookingError::CannotCancelConfirmedBooking));
}

#[rstest]
fn beneficiary_can_cancel_inside_window() {
    let now = fixed_now();
    let mut event = booking();
    event.cancellation_limit_date = Some(now + Duration::hours(1));

    assert_eq!(
        check_beneficiary_can_cancel_booking(event.user_id, &event, now),
        Ok(())
    );
}

#[rstest]
#[case(BookingStatus::Cancelled, Err(BookingError::BookingIsAlreadyCancelled))]
#[case(BookingStatus::Used, Err(BookingError::BookingIsAlreadyUsed))]
#[case(BookingStatus::Confirmed, Ok(()))]
fn offerer_cancellation_checks(
    #[case] status: BookingStatus,
    #[case] expected: Result<(), BookingError>,
) {
    let mut candidate = booking();
    candidate.status = status;
    assert_eq!(check_booking_can_be_cancelled(&candidate), expected);
}

#[rstest]
#[case(BookingStatus::Reimbursed, Err(BookingError::BookingIsAlreadyRefunded))]
#[case(BookingStatus::Cancelled, Err(BookingError::BookingIsAlreadyCancelled))]
#[case(BookingStatus::Confirmed, Err(BookingError::BookingIsNotUsed))]
#[case(BookingStatus::Used, Ok(()))]
fn unuse_checks(#[case] status: BookingStatus, #[case] expected: Result<(), BookingError>) {
    let mut candidate = booking();
    candidate.status = status;
    assert_eq!(check_can_be_marked_as_unused(&candidate), expected);
}
