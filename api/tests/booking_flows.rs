//! End-to-end booking flows over the in-memory adapters.

use std::sync::Arc;

use chrono::Duration;
use pcapi::domain::booking::{
    BookingCancellationReason, BookingStatus, BookingValidationAuthorType, NewBooking,
    RandomTokenGenerator,
};
use pcapi::domain::finance::{FinanceEventMotive, FinanceEventStatus, FinanceJournal, PricingStatus};
use pcapi::domain::indexing::IndexationReason;
use pcapi::domain::notification::Notification;
use pcapi::domain::offer::BookableStock;
use pcapi::domain::ports::{BookingRepository, BookingRepositoryError};
use pcapi::domain::{
    BookingService, BookingServicePorts, Cents, DepositId, ErrorCode, OfferId, StockId, UserId,
};
use pcapi::test_support::MutableClock;
use pcapi::test_support::fixtures::{beneficiary, bookable_stock, deposit, fixed_now};
use pcapi::test_support::memory::{InMemoryMarketplace, RecordingIndexer, RecordingQueue};
use rstest::{fixture, rstest};

struct Harness {
    store: Arc<InMemoryMarketplace>,
    indexer: Arc<RecordingIndexer>,
    queue: Arc<RecordingQueue>,
    clock: Arc<MutableClock>,
    service: BookingService,
}

#[fixture]
fn harness() -> Harness {
    let store = Arc::new(InMemoryMarketplace::new());
    store.add_stock(bookable_stock());
    store.add_user(beneficiary());
    let indexer = Arc::new(RecordingIndexer::default());
    let queue = Arc::new(RecordingQueue::default());
    let clock = Arc::new(MutableClock::new(fixed_now()));
    let ports = BookingServicePorts {
        bookings: store.clone(),
        stocks: store.clone(),
        beneficiaries: store.clone(),
        deposits: store.clone(),
        finance_events: store.clone(),
        indexer: indexer.clone(),
        notifications: queue.clone(),
    };
    let service = BookingService::new(ports, clock.clone(), Arc::new(RandomTokenGenerator));
    Harness {
        store,
        indexer,
        queue,
        clock,
        service,
    }
}

fn second_beneficiary() -> pcapi::domain::beneficiary::Beneficiary {
    let mut user = beneficiary();
    user.id = UserId::new(2);
    user.email = "autre.jeune@example.com".to_owned();
    if let Some(deposit) = user.deposit.as_mut() {
        deposit.id = DepositId::new(2);
        deposit.user_id = UserId::new(2);
    }
    user
}

fn ebook(id: i64) -> BookableStock {
    let mut ebook = bookable_stock();
    ebook.stock.id = StockId::new(id);
    ebook.stock.offer_id = OfferId::new(id);
    ebook.offer.id = OfferId::new(id);
    ebook.offer.subcategory_id = "LIVRE_NUMERIQUE".to_owned();
    ebook.offer.url = Some("https://lecture.example.com/livre".to_owned());
    ebook
}

fn new_booking_of(stock: &BookableStock, deposit_spent: Cents) -> NewBooking {
    NewBooking {
        user_id: UserId::new(1),
        stock_id: stock.stock.id,
        offer_id: stock.offer.id,
        venue_id: stock.offer.venue_id,
        offerer_id: stock.offerer_id,
        deposit_id: Some(deposit().id),
        quantity: 1,
        amount: stock.stock.price,
        token: "RACE01".to_owned(),
        status: BookingStatus::Confirmed,
        date_created: fixed_now(),
        date_used: None,
        validation_author_type: None,
        cancellation_limit_date: None,
        deposit_spent,
        claim_activation_code: false,
    }
}

#[rstest]
#[tokio::test]
async fn booking_reserves_stock_and_signals_side_effects(harness: Harness) {
    let booking = harness
        .service
        .book_offer(UserId::new(1), StockId::new(1), 1)
        .await
        .expect("booking succeeds");

    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.deposit_id, Some(deposit().id));
    assert_eq!(booking.token.len(), 6);
    let stock = harness.store.stock(StockId::new(1)).expect("stock kept");
    assert_eq!(stock.stock.dn_booked_quantity, 1);
    assert_eq!(
        harness.indexer.calls(),
        vec![(vec![OfferId::new(1)], IndexationReason::BookingCreation)]
    );
    assert_eq!(
        harness.queue.sent(),
        vec![
            Notification::NewBookingToPro {
                booking_id: booking.id,
                first_venue_booking: true,
            },
            Notification::BookingConfirmationToBeneficiary {
                booking_id: booking.id,
            },
        ]
    );
    assert!(harness.store.finance_events().is_empty());
}

#[rstest]
#[tokio::test]
async fn beneficiary_cancellation_releases_the_unit(harness: Harness) {
    let booking = harness
        .service
        .book_offer(UserId::new(1), StockId::new(1), 1)
        .await
        .expect("booking succeeds");
    harness.clock.advance(Duration::minutes(5));

    let cancelled = harness
        .service
        .cancel_booking_by_beneficiary(UserId::new(1), booking.id)
        .await
        .expect("cancellation succeeds");

    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(
        cancelled.cancellation_reason,
        Some(BookingCancellationReason::Beneficiary)
    );
    assert_eq!(
        cancelled.cancellation_date,
        Some(fixed_now() + Duration::minutes(5))
    );
    let stock = harness.store.stock(StockId::new(1)).expect("stock kept");
    assert_eq!(stock.stock.dn_booked_quantity, 0);
    assert_eq!(
        harness.indexer.calls().last().map(|(_, reason)| *reason),
        Some(IndexationReason::BookingCancellation)
    );
}

#[rstest]
#[tokio::test]
async fn same_offer_cannot_be_booked_twice(harness: Harness) {
    harness
        .service
        .book_offer(UserId::new(1), StockId::new(1), 1)
        .await
        .expect("first booking succeeds");

    let err = harness
        .service
        .book_offer(UserId::new(1), StockId::new(1), 1)
        .await
        .expect_err("second booking rejected");

    assert_eq!(err.code(), ErrorCode::InvalidRequest);
    assert!(err.details().and_then(|details| details.get("offerId")).is_some());
    assert_eq!(harness.store.bookings().len(), 1);
}

#[rstest]
#[tokio::test]
async fn last_unit_goes_to_the_first_beneficiary(harness: Harness) {
    let mut last_copy = bookable_stock();
    last_copy.stock.quantity = Some(1);
    harness.store.add_stock(last_copy);
    harness.store.add_user(second_beneficiary());

    harness
        .service
        .book_offer(UserId::new(1), StockId::new(1), 1)
        .await
        .expect("first booking succeeds");
    let err = harness
        .service
        .book_offer(UserId::new(2), StockId::new(1), 1)
        .await
        .expect_err("no unit left");

    assert_eq!(err.code(), ErrorCode::InvalidRequest);
    assert!(err.details().and_then(|details| details.get("stock")).is_some());
    let stock = harness.store.stock(StockId::new(1)).expect("stock kept");
    assert_eq!(stock.stock.dn_booked_quantity, 1);
}

#[rstest]
#[tokio::test]
async fn digital_book_is_used_on_booking(harness: Harness) {
    harness.store.add_stock(ebook(7));

    let booking = harness
        .service
        .book_offer(UserId::new(1), StockId::new(7), 1)
        .await
        .expect("booking succeeds");

    assert_eq!(booking.status, BookingStatus::Used);
    assert_eq!(booking.date_used, Some(fixed_now()));
    assert_eq!(
        booking.validation_author_type,
        Some(BookingValidationAuthorType::Auto)
    );
    let events = harness.store.finance_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].motive, FinanceEventMotive::BookingUsed);
    assert_eq!(events[0].booking_id, Some(booking.id));
}

#[rstest]
#[tokio::test]
async fn used_then_unused_replaces_the_finance_event(harness: Harness) {
    let booking = harness
        .service
        .book_offer(UserId::new(1), StockId::new(1), 1)
        .await
        .expect("booking succeeds");
    harness
        .service
        .mark_as_used(booking.id, BookingValidationAuthorType::Offerer)
        .await
        .expect("mark as used");

    let unused = harness
        .service
        .mark_as_unused(booking.id)
        .await
        .expect("mark as unused");

    assert_eq!(unused.status, BookingStatus::Confirmed);
    assert_eq!(unused.date_used, None);
    let events = harness.store.finance_events();
    let summary: Vec<_> = events
        .iter()
        .map(|event| (event.motive, event.status == FinanceEventStatus::Cancelled))
        .collect();
    assert_eq!(
        summary,
        vec![
            (FinanceEventMotive::BookingUsed, true),
            (FinanceEventMotive::BookingUnused, false),
        ]
    );
}

#[rstest]
#[case(PricingStatus::Processed)]
#[case(PricingStatus::Invoiced)]
#[tokio::test]
async fn settled_pricing_blocks_unuse(harness: Harness, #[case] pricing: PricingStatus) {
    let booking = harness
        .service
        .book_offer(UserId::new(1), StockId::new(1), 1)
        .await
        .expect("booking succeeds");
    harness
        .service
        .mark_as_used(booking.id, BookingValidationAuthorType::Offerer)
        .await
        .expect("mark as used");
    harness.store.price_latest_event(booking.id, pricing);

    let err = harness
        .service
        .mark_as_unused(booking.id)
        .await
        .expect_err("pricing is settled");

    assert_eq!(err.code(), ErrorCode::Conflict);
    let stored = harness.store.booking(booking.id).expect("booking kept");
    assert_eq!(stored.status, BookingStatus::Used);
}

#[rstest]
#[tokio::test]
async fn cancelled_booking_can_be_revived_as_used(harness: Harness) {
    let booking = harness
        .service
        .book_offer(UserId::new(1), StockId::new(1), 1)
        .await
        .expect("booking succeeds");
    harness
        .service
        .cancel_booking_by_offerer(booking.id)
        .await
        .expect("offerer cancels");

    let revived = harness
        .service
        .mark_as_used_with_uncancelling(booking.id, BookingValidationAuthorType::Backoffice)
        .await
        .expect("revived");

    assert_eq!(revived.status, BookingStatus::Used);
    assert_eq!(revived.cancellation_reason, None);
    let stock = harness.store.stock(StockId::new(1)).expect("stock kept");
    assert_eq!(stock.stock.dn_booked_quantity, 1);
    let motives: Vec<_> = harness
        .store
        .finance_events()
        .iter()
        .map(|event| event.motive)
        .collect();
    assert_eq!(motives, vec![FinanceEventMotive::BookingUsedAfterCancellation]);
}

#[rstest]
#[tokio::test]
async fn cancelling_a_stock_cancels_its_live_bookings(harness: Harness) {
    harness.store.add_user(second_beneficiary());
    for user in [1, 2] {
        harness
            .service
            .book_offer(UserId::new(user), StockId::new(1), 1)
            .await
            .expect("booking succeeds");
    }

    let cancelled = harness
        .service
        .cancel_bookings_from_stock(StockId::new(1), BookingCancellationReason::Offerer)
        .await
        .expect("stock cancellation");

    assert_eq!(cancelled.len(), 2);
    assert!(
        harness
            .store
            .bookings()
            .iter()
            .all(|booking| booking.status == BookingStatus::Cancelled)
    );
    let stock = harness.store.stock(StockId::new(1)).expect("stock kept");
    assert_eq!(stock.stock.dn_booked_quantity, 0);
    assert!(harness.queue.sent().iter().any(|notification| matches!(
        notification,
        Notification::CancelBookingPush { booking_ids } if booking_ids.len() == 2
    )));
}

#[rstest]
#[tokio::test]
async fn stale_wallet_read_is_refused_at_write(harness: Harness) {
    harness
        .service
        .book_offer(UserId::new(1), StockId::new(1), 1)
        .await
        .expect("first booking succeeds");
    let other_ebook = ebook(8);
    harness.store.add_stock(other_ebook.clone());

    let err = harness
        .store
        .insert_with_reservation(
            &new_booking_of(&other_ebook, Cents::ZERO),
            &FinanceJournal::empty(fixed_now()),
        )
        .await
        .expect_err("wallet changed since it was read");

    assert_eq!(
        err,
        BookingRepositoryError::deposit_spending_changed(deposit().id.get())
    );
    assert_eq!(harness.store.bookings().len(), 1);
    let stock = harness.store.stock(StockId::new(8)).expect("stock kept");
    assert_eq!(stock.stock.dn_booked_quantity, 0);
}

#[rstest]
#[tokio::test]
async fn concurrent_booking_of_the_same_offer_is_refused_at_write(harness: Harness) {
    harness
        .service
        .book_offer(UserId::new(1), StockId::new(1), 1)
        .await
        .expect("first booking succeeds");

    let err = harness
        .store
        .insert_with_reservation(
            &new_booking_of(&bookable_stock(), Cents::euros(10)),
            &FinanceJournal::empty(fixed_now()),
        )
        .await
        .expect_err("offer already booked");

    assert_eq!(err, BookingRepositoryError::offer_already_booked(1));
    let stock = harness.store.stock(StockId::new(1)).expect("stock kept");
    assert_eq!(stock.stock.dn_booked_quantity, 1);
}

#[rstest]
#[tokio::test]
async fn activation_codes_are_handed_out_once(harness: Harness) {
    harness.store.add_stock(ebook(7));
    harness.store.add_activation_code(StockId::new(7), "CODE-1", None);
    harness.store.add_user(second_beneficiary());

    let booking = harness
        .service
        .book_offer(UserId::new(1), StockId::new(7), 1)
        .await
        .expect("booking succeeds");
    let err = harness
        .service
        .book_offer(UserId::new(2), StockId::new(7), 1)
        .await
        .expect_err("no code left");

    assert_eq!(booking.status, BookingStatus::Used);
    assert_eq!(
        harness.store.activation_code_of(booking.id).as_deref(),
        Some("CODE-1")
    );
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
    assert!(err.details().and_then(|details| details.get("stock")).is_some());
    assert_eq!(harness.store.bookings().len(), 1);
}

#[rstest]
#[tokio::test]
async fn expired_activation_codes_are_not_handed_out(harness: Harness) {
    harness.store.add_stock(ebook(7));
    harness.store.add_activation_code(
        StockId::new(7),
        "OLD-CODE",
        Some(fixed_now() - Duration::days(1)),
    );

    let err = harness
        .service
        .book_offer(UserId::new(1), StockId::new(7), 1)
        .await
        .expect_err("only expired codes");

    assert!(err.details().and_then(|details| details.get("stock")).is_some());
}

#[rstest]
#[tokio::test]
async fn cancelling_a_code_booking_retires_the_code_unit(harness: Harness) {
    harness.store.add_stock(ebook(7));
    harness.store.add_activation_code(StockId::new(7), "CODE-1", None);
    let booking = harness
        .service
        .book_offer(UserId::new(1), StockId::new(7), 1)
        .await
        .expect("booking succeeds");

    harness
        .service
        .mark_as_cancelled(booking.id, BookingCancellationReason::Backoffice)
        .await
        .expect("back office cancels");

    let stock = harness.store.stock(StockId::new(7)).expect("stock kept");
    assert_eq!(stock.stock.quantity, Some(9));
    assert_eq!(stock.stock.dn_booked_quantity, 0);
    assert_eq!(
        harness.store.activation_code_of(booking.id).as_deref(),
        Some("CODE-1")
    );
    let summary: Vec<_> = harness
        .store
        .finance_events()
        .iter()
        .map(|event| (event.motive, event.status == FinanceEventStatus::Cancelled))
        .collect();
    assert_eq!(
        summary,
        vec![
            (FinanceEventMotive::BookingUsed, true),
            (FinanceEventMotive::BookingCancelledAfterUse, false),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn fraud_cancellation_releases_the_unit(harness: Harness) {
    let booking = harness
        .service
        .book_offer(UserId::new(1), StockId::new(1), 1)
        .await
        .expect("booking succeeds");

    let cancelled = harness
        .service
        .cancel_booking_for_fraud(booking.id)
        .await
        .expect("fraud cancellation succeeds")
        .expect("booking was cancellable");

    assert_eq!(
        cancelled.cancellation_reason,
        Some(BookingCancellationReason::Fraud)
    );
    let stock = harness.store.stock(StockId::new(1)).expect("stock kept");
    assert_eq!(stock.stock.dn_booked_quantity, 0);
    assert!(harness.queue.sent().contains(&Notification::BookingCancellation {
        booking_id: booking.id,
        reason: BookingCancellationReason::Fraud,
    }));
}

#[rstest]
#[tokio::test]
async fn fraud_cancellation_leaves_priced_bookings_alone(harness: Harness) {
    let booking = harness
        .service
        .book_offer(UserId::new(1), StockId::new(1), 1)
        .await
        .expect("booking succeeds");
    harness
        .service
        .mark_as_used(booking.id, BookingValidationAuthorType::Offerer)
        .await
        .expect("mark as used");
    harness
        .service
        .mark_as_unused(booking.id)
        .await
        .expect("mark as unused");
    harness
        .store
        .price_latest_event(booking.id, PricingStatus::Processed);
    let events_before = harness.store.finance_events();

    let outcome = harness
        .service
        .cancel_booking_for_fraud(booking.id)
        .await
        .expect("priced booking is skipped");

    assert_eq!(outcome, None);
    let stored = harness.store.booking(booking.id).expect("booking kept");
    assert_eq!(stored.status, BookingStatus::Confirmed);
    assert_eq!(harness.store.finance_events(), events_before);
}

#[rstest]
#[tokio::test]
async fn settled_pricing_rolls_back_the_whole_cancellation(harness: Harness) {
    let booking = harness
        .service
        .book_offer(UserId::new(1), StockId::new(1), 1)
        .await
        .expect("booking succeeds");
    let used = harness
        .service
        .mark_as_used(booking.id, BookingValidationAuthorType::Offerer)
        .await
        .expect("mark as used");
    let event_id = harness.store.finance_events()[0].id;
    harness
        .store
        .price_latest_event(booking.id, PricingStatus::Invoiced);
    let events_before = harness.store.finance_events();
    let mut cancelled = used.clone();
    cancelled
        .cancel(BookingCancellationReason::Backoffice, fixed_now(), true)
        .expect("used bookings can be cancelled from the back office");
    let journal =
        FinanceJournal::recording(FinanceEventMotive::BookingCancelledAfterUse, fixed_now())
            .cancelling(Some(event_id));

    let err = harness
        .store
        .save_cancellation(&cancelled, &journal)
        .await
        .expect_err("pricing is settled");

    assert_eq!(err, BookingRepositoryError::settled_pricing(event_id.get()));
    assert_eq!(harness.store.booking(booking.id), Some(used));
    assert_eq!(harness.store.finance_events(), events_before);
    let stock = harness.store.stock(StockId::new(1)).expect("stock kept");
    assert_eq!(stock.stock.dn_booked_quantity, 1);
}

#[rstest]
#[tokio::test]
async fn revived_booking_may_exceed_the_stock(harness: Harness) {
    let mut last_copy = bookable_stock();
    last_copy.stock.quantity = Some(1);
    harness.store.add_stock(last_copy);
    harness.store.add_user(second_beneficiary());
    let booking = harness
        .service
        .book_offer(UserId::new(1), StockId::new(1), 1)
        .await
        .expect("booking succeeds");
    harness
        .service
        .cancel_booking_by_offerer(booking.id)
        .await
        .expect("offerer cancels");
    harness
        .service
        .book_offer(UserId::new(2), StockId::new(1), 1)
        .await
        .expect("freed unit is booked again");

    harness
        .service
        .mark_as_used_with_uncancelling(booking.id, BookingValidationAuthorType::Backoffice)
        .await
        .expect("revived past capacity");

    let stock = harness.store.stock(StockId::new(1)).expect("stock kept");
    assert_eq!(stock.stock.quantity, Some(1));
    assert_eq!(stock.stock.dn_booked_quantity, 2);
}
