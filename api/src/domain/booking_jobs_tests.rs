//! Tests for the scheduled booking jobs.

use std::sync::Arc;

use chrono::Duration;
use rstest::rstest;

use super::*;
use crate::domain::booking::BookingStatus;
use crate::domain::collective::{CollectiveBooking, CollectiveBookingStatus};
use crate::domain::ports::{
    ExpiredBatch, JobDispatchError, MockBookingHousekeepingRepository,
    MockCollectiveBookingRepository, MockNotificationQueue,
};
use crate::domain::{CollectiveBookingId, ErrorCode, OffererId, UserId, VenueId};
use crate::test_support::MutableClock;
use crate::test_support::fixtures::{booking, fixed_now};

#[derive(Default)]
struct Mocks {
    housekeeping: MockBookingHousekeepingRepository,
    collective_bookings: MockCollectiveBookingRepository,
    notifications: MockNotificationQueue,
}

impl Mocks {
    fn jobs(self) -> BookingJobs {
        self.jobs_with_toggle(true)
    }

    fn jobs_with_toggle(self, update_booking_used: bool) -> BookingJobs {
        BookingJobs::new(
            BookingJobsPorts {
                housekeeping: Arc::new(self.housekeeping),
                collective_bookings: Arc::new(self.collective_bookings),
                notifications: Arc::new(self.notifications),
            },
            Arc::new(MutableClock::new(fixed_now())),
            update_booking_used,
        )
    }
}

fn booking_for(id: i64, user_id: i64, offerer_id: i64) -> Booking {
    Booking {
        id: BookingId::new(id),
        user_id: UserId::new(user_id),
        offerer_id: OffererId::new(offerer_id),
        status: BookingStatus::Cancelled,
        ..booking()
    }
}

fn collective_booking(id: i64) -> CollectiveBooking {
    CollectiveBooking {
        id: CollectiveBookingId::new(id),
        educational_institution_uai: "0470009E".to_owned(),
        venue_id: VenueId::new(1),
        offerer_id: OffererId::new(1),
        collective_stock_id: 5,
        event_beginning: fixed_now() - Duration::days(3),
        status: CollectiveBookingStatus::Used,
        date_used: Some(fixed_now()),
    }
}

fn ids(raw: &[i64]) -> Vec<BookingId> {
    raw.iter().copied().map(BookingId::new).collect()
}

#[tokio::test]
async fn cancel_expired_bookings_rejects_zero_batch_size() {
    let jobs = Mocks::default().jobs();

    let error = jobs
        .cancel_expired_bookings(0)
        .await
        .expect_err("zero batch size is invalid");

    assert_eq!(error.code(), ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn cancel_expired_bookings_uses_book_and_other_thresholds() {
    let mut mocks = Mocks::default();
    mocks
        .housekeeping
        .expect_find_expiring_booking_ids()
        .withf(|query| {
            query.cutoffs == expiry_cutoffs(fixed_now())
                && query.book_subcategory_ids.contains(&"LIVRE_PAPIER")
                && !query.other_expirable_subcategory_ids.contains(&"LIVRE_PAPIER")
                && query
                    .other_expirable_subcategory_ids
                    .contains(&"LIVRE_AUDIO_PHYSIQUE")
        })
        .times(1)
        .return_once(|_| Ok(Vec::new()));
    mocks.housekeeping.expect_cancel_expired_batch().never();

    let report = mocks
        .jobs()
        .cancel_expired_bookings(100)
        .await
        .expect("no bookings to cancel");

    assert_eq!(report, ExpiredBookingsReport::default());
}

#[tokio::test]
async fn cancel_expired_bookings_skips_failed_batches() {
    let mut mocks = Mocks::default();
    mocks
        .housekeeping
        .expect_find_expiring_booking_ids()
        .times(1)
        .return_once(|_| Ok(ids(&[1, 2, 3, 4, 5])));
    mocks
        .housekeeping
        .expect_cancel_expired_batch()
        .times(3)
        .returning(|batch, _| {
            if batch.first() == Some(&BookingId::new(3)) {
                return Err(BookingHousekeepingError::query("deadlock detected"));
            }
            Ok(ExpiredBatch {
                cancelled: batch.len(),
                stock_ids: vec![StockId::new(batch[0].get() * 10)],
            })
        });

    let report = mocks
        .jobs()
        .cancel_expired_bookings(2)
        .await
        .expect("job completes despite a failed batch");

    assert_eq!(report.cancelled, 3);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(
        report.touched_stocks,
        BTreeSet::from([StockId::new(10), StockId::new(50)])
    );
}

#[tokio::test]
async fn cancel_expired_bookings_fails_when_listing_fails() {
    let mut mocks = Mocks::default();
    mocks
        .housekeeping
        .expect_find_expiring_booking_ids()
        .times(1)
        .return_once(|_| Err(BookingHousekeepingError::connection("refused")));

    let error = mocks
        .jobs()
        .cancel_expired_bookings(10)
        .await
        .expect_err("listing failure surfaces");

    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
}

#[tokio::test]
async fn notify_users_groups_expired_bookings_per_beneficiary() {
    let day = fixed_now().date_naive();
    let mut mocks = Mocks::default();
    mocks
        .housekeeping
        .expect_list_expired_between()
        .withf(move |start, end| {
            *start == Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
                && *end - *start == Duration::days(1)
        })
        .times(1)
        .return_once(|_, _| {
            Ok(vec![
                booking_for(1, 7, 1),
                booking_for(2, 8, 1),
                booking_for(3, 7, 2),
            ])
        });
    mocks
        .notifications
        .expect_enqueue()
        .withf(|notification| {
            *notification
                == Notification::ExpiredBookingsToBeneficiary {
                    user_id: UserId::new(7),
                    booking_ids: ids(&[1, 3]),
                }
        })
        .times(1)
        .returning(|_| Ok(()));
    mocks
        .notifications
        .expect_enqueue()
        .withf(|notification| {
            *notification
                == Notification::ExpiredBookingsToBeneficiary {
                    user_id: UserId::new(8),
                    booking_ids: ids(&[2]),
                }
        })
        .times(1)
        .returning(|_| Ok(()));

    let sent = mocks
        .jobs()
        .notify_users_of_expired_bookings(day)
        .await
        .expect("notifications queued");

    assert_eq!(sent, 2);
}

#[tokio::test]
async fn notify_offerers_counts_only_queued_notifications() {
    let mut mocks = Mocks::default();
    mocks
        .housekeeping
        .expect_list_expired_between()
        .times(1)
        .return_once(|_, _| {
            Ok(vec![
                booking_for(1, 7, 1),
                booking_for(2, 8, 1),
                booking_for(3, 7, 2),
            ])
        });
    mocks
        .notifications
        .expect_enqueue()
        .times(2)
        .returning(|notification| match notification {
            Notification::ExpiredBookingsToOfferer { offerer_id, .. }
                if *offerer_id == OffererId::new(2) =>
            {
                Err(JobDispatchError::unavailable("redis down"))
            }
            _ => Ok(()),
        });

    let sent = mocks
        .jobs()
        .notify_offerers_of_expired_bookings(fixed_now().date_naive())
        .await
        .expect("job completes");

    assert_eq!(sent, 1);
}

#[tokio::test]
async fn notify_soon_to_be_expired_bookings_queries_both_windows() {
    let day = fixed_now().date_naive();
    let mut mocks = Mocks::default();
    mocks
        .housekeeping
        .expect_list_soon_to_expire()
        .withf(move |query| {
            let (books_window, others_window) = soon_to_expire_windows(day);
            query.books_window == books_window && query.others_window == others_window
        })
        .times(1)
        .return_once(|_| Ok(vec![booking_for(4, 9, 1)]));
    mocks
        .notifications
        .expect_enqueue()
        .withf(|notification| {
            *notification
                == Notification::SoonToBeExpiredBookingsToBeneficiary {
                    user_id: UserId::new(9),
                    booking_ids: ids(&[4]),
                }
        })
        .times(1)
        .returning(|_| Ok(()));

    let sent = mocks
        .jobs()
        .notify_soon_to_be_expired_bookings(day)
        .await
        .expect("warning queued");

    assert_eq!(sent, 1);
}

#[tokio::test]
async fn auto_use_is_forbidden_when_toggle_is_off() {
    let mut mocks = Mocks::default();
    mocks.housekeeping.expect_mark_event_bookings_used().never();

    let error = mocks
        .jobs_with_toggle(false)
        .auto_mark_as_used_after_event()
        .await
        .expect_err("toggle off");

    assert_eq!(error.code(), ErrorCode::Forbidden);
}

#[tokio::test]
async fn auto_use_marks_both_kinds() {
    let mut mocks = Mocks::default();
    mocks
        .housekeeping
        .expect_mark_event_bookings_used()
        .withf(|threshold, now| {
            *now == fixed_now() && *threshold == fixed_now() - Duration::hours(48)
        })
        .times(1)
        .return_once(|_, now| {
            Ok(vec![Booking {
                status: BookingStatus::Used,
                date_used: Some(now),
                ..booking_for(1, 1, 1)
            }])
        });
    mocks
        .collective_bookings
        .expect_mark_used_after_event()
        .times(1)
        .return_once(|_, _| Ok(vec![collective_booking(3), collective_booking(4)]));

    let report = mocks
        .jobs()
        .auto_mark_as_used_after_event()
        .await
        .expect("bookings marked as used");

    assert_eq!(
        report,
        AutoUseReport {
            individual: 1,
            collective: 2,
        }
    );
}

#[tokio::test]
async fn auto_use_without_candidates_reports_nothing() {
    let mut mocks = Mocks::default();
    mocks
        .housekeeping
        .expect_mark_event_bookings_used()
        .times(1)
        .return_once(|_, _| Ok(Vec::new()));
    mocks
        .collective_bookings
        .expect_mark_used_after_event()
        .times(1)
        .return_once(|_, _| Ok(Vec::new()));

    let report = mocks
        .jobs()
        .auto_mark_as_used_after_event()
        .await
        .expect("nothing to do");

    assert_eq!(report, AutoUseReport::default());
}

#[tokio::test]
async fn failed_individual_auto_use_stops_before_collective_bookings() {
    let mut mocks = Mocks::default();
    mocks
        .housekeeping
        .expect_mark_event_bookings_used()
        .times(1)
        .return_once(|_, _| Err(BookingHousekeepingError::connection("transaction aborted")));
    mocks.collective_bookings.expect_mark_used_after_event().never();

    let error = mocks
        .jobs()
        .auto_mark_as_used_after_event()
        .await
        .expect_err("individual write failed");

    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
}

#[tokio::test]
async fn failed_collective_auto_use_is_reported() {
    let mut mocks = Mocks::default();
    mocks
        .housekeeping
        .expect_mark_event_bookings_used()
        .times(1)
        .return_once(|_, _| Ok(Vec::new()));
    mocks
        .collective_bookings
        .expect_mark_used_after_event()
        .times(1)
        .return_once(|_, _| Err(CollectiveBookingRepositoryError::query("decode failed")));

    let error = mocks
        .jobs()
        .auto_mark_as_used_after_event()
        .await
        .expect_err("collective write failed");

    assert_eq!(error.code(), ErrorCode::InternalError);
}

#[rstest]
#[case::empty(Vec::new(), 0)]
#[case::two_stocks(vec![StockId::new(1), StockId::new(2)], 2)]
#[tokio::test]
async fn recompute_dn_booked_quantity_delegates_non_empty_sets(
    #[case] stock_ids: Vec<StockId>,
    #[case] expected: usize,
) {
    let mut mocks = Mocks::default();
    let calls = usize::from(!stock_ids.is_empty());
    mocks
        .housekeeping
        .expect_recompute_dn_booked_quantity()
        .times(calls)
        .returning(|ids| Ok(ids.len()));

    let updated = mocks
        .jobs()
        .recompute_dn_booked_quantity(&stock_ids)
        .await
        .expect("recompute succeeds");

    assert_eq!(updated, expected);
}

#[tokio::test]
async fn archive_old_bookings_targets_subscriptions_older_than_thirty_days() {
    let mut mocks = Mocks::default();
    mocks
        .housekeeping
        .expect_archive_bookings()
        .withf(|created_before, subcategory_ids| {
            *created_before == fixed_now() - Duration::days(30)
                && subcategory_ids.contains(&"ABO_PLATEFORME_VIDEO")
                && subcategory_ids.contains(&"CARTE_CINE_ILLIMITE")
                && !subcategory_ids.contains(&"LIVRE_PAPIER")
        })
        .times(1)
        .return_once(|_, _| Ok(12));

    let archived = mocks
        .jobs()
        .archive_old_bookings()
        .await
        .expect("archive succeeds");

    assert_eq!(archived, 12);
}
