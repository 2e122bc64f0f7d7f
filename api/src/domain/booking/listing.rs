//! Splitting a beneficiary's bookings into ended and ongoing lists.

use std::cmp::Reverse;

use chrono::{DateTime, Utc};

use super::dates::{BOOKINGS_AUTO_EXPIRY_DELAY, BOOKS_BOOKINGS_AUTO_EXPIRY_DELAY};
use super::{Booking, BookingStatus};
use crate::domain::subcategory;

/// A booking with the offer data the listing needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingView {
    /// The booking.
    pub booking: Booking,
    /// Event start, for event offers.
    pub event_beginning: Option<DateTime<Utc>>,
    /// Subcategory of the offer.
    pub subcategory_id: String,
    /// Permanent offers (museum passes...) stay ongoing after use.
    pub is_permanent: bool,
}

impl BookingView {
    /// When the booking expires if nobody collects it.
    pub fn expiration_date(&self) -> Option<DateTime<Utc>> {
        if self.booking.status != BookingStatus::Confirmed {
            return None;
        }
        let sub = subcategory::find(&self.subcategory_id).filter(|sub| sub.can_expire)?;
        let delay = if sub.is_book {
            BOOKS_BOOKINGS_AUTO_EXPIRY_DELAY
        } else {
            BOOKINGS_AUTO_EXPIRY_DELAY
        };
        Some(self.booking.date_created + delay)
    }

    fn is_ended(&self, now: DateTime<Utc>) -> bool {
        let booking = &self.booking;
        if booking.status != BookingStatus::Cancelled
            && self.event_beginning.is_some_and(|begin| begin >= now)
        {
            return false;
        }
        if subcategory::find(&self.subcategory_id).is_some_and(|sub| sub.display_even_if_used) {
            return booking.display_as_ended;
        }
        match booking.status {
            BookingStatus::Used | BookingStatus::Reimbursed => !self.is_permanent,
            BookingStatus::Cancelled => true,
            BookingStatus::Confirmed => false,
        }
    }

    fn ended_sort_key(&self) -> Option<DateTime<Utc>> {
        self.event_beginning
            .or(self.booking.date_used)
            .or(self.booking.cancellation_date)
    }
}

/// Bookings split for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedBookings {
    /// Past bookings, most recent first.
    pub ended: Vec<BookingView>,
    /// Live bookings, soonest deadline first.
    pub ongoing: Vec<BookingView>,
}

/// Split and sort bookings the way the beneficiary app lists them.
pub fn classify_and_sort_bookings(views: Vec<BookingView>, now: DateTime<Utc>) -> ClassifiedBookings {
    let (mut ended, mut ongoing): (Vec<_>, Vec<_>) =
        views.into_iter().partition(|view| view.is_ended(now));

    ended.sort_by_key(|view| Reverse(view.ended_sort_key()));
    ongoing.sort_by_key(|view| {
        let deadline = view
            .expiration_date()
            .or(view.event_beginning)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (deadline, Reverse(view.booking.id))
    });

    ClassifiedBookings { ended, ongoing }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rstest::rstest;

    use super::*;
    use crate::domain::BookingId;
    use crate::test_support::fixtures::{booking, fixed_now};

    fn view(id: i64, status: BookingStatus, subcategory_id: &str) -> BookingView {
        let mut booking = booking();
        booking.id = BookingId::new(id);
        booking.status = status;
        BookingView {
            booking,
            event_beginning: None,
            subcategory_id: subcategory_id.to_owned(),
            is_permanent: false,
        }
    }

    #[rstest]
    fn future_event_stays_ongoing_even_when_used() {
        let now = fixed_now();
        let mut event = view(1, BookingStatus::Used, "SEANCE_CINE");
        event.event_beginning = Some(now + Duration::days(2));

        let classified = classify_and_sort_bookings(vec![event], now);

        assert_eq!(classified.ongoing.len(), 1);
        assert!(classified.ended.is_empty());
    }

    #[rstest]
    #[case(Duration::zero(), true)]
    #[case(Duration::seconds(-1), false)]
    fn event_starting_now_is_still_ongoing(#[case] offset: Duration, #[case] ongoing: bool) {
        let now = fixed_now();
        let mut event = view(1, BookingStatus::Used, "SEANCE_CINE");
        event.event_beginning = Some(now + offset);

        let classified = classify_and_sort_bookings(vec![event], now);

        assert_eq!(classified.ongoing.len() == 1, ongoing);
    }

    #[rstest]
    fn used_and_cancelled_bookings_are_ended() {
        let now = fixed_now();
        let classified = classify_and_sort_bookings(
            vec![
                view(1, BookingStatus::Used, "LIVRE_PAPIER"),
                view(2, BookingStatus::Cancelled, "LIVRE_PAPIER"),
                view(3, BookingStatus::Confirmed, "LIVRE_PAPIER"),
            ],
            now,
        );

        assert_eq!(classified.ended.len(), 2);
        assert_eq!(classified.ongoing.len(), 1);
    }

    #[rstest]
    fn permanent_offers_stay_ongoing_after_use() {
        let mut permanent = view(1, BookingStatus::Used, "VISITE");
        permanent.is_permanent = true;
        let classified = classify_and_sort_bookings(vec![permanent], fixed_now());
        assert_eq!(classified.ongoing.len(), 1);
    }

    #[rstest]
    fn subscriptions_follow_display_as_ended_flag() {
        let mut archived = view(1, BookingStatus::Used, "ABO_PLATEFORME_VIDEO");
        archived.booking.display_as_ended = true;
        let live = view(2, BookingStatus::Used, "ABO_PLATEFORME_VIDEO");

        let classified = classify_and_sort_bookings(vec![archived, live], fixed_now());

        assert_eq!(classified.ended.len(), 1);
        assert_eq!(
            classified.ongoing.first().map(|v| v.booking.id),
            Some(BookingId::new(2))
        );
    }

    #[rstest]
    fn ongoing_bookings_sort_by_nearest_expiry() {
        let now = fixed_now();
        let mut book = view(1, BookingStatus::Confirmed, "LIVRE_PAPIER");
        book.booking.date_created = now - Duration::days(2);
        let mut cd = view(2, BookingStatus::Confirmed, "SUPPORT_PHYSIQUE_MUSIQUE_CD");
        cd.booking.date_created = now - Duration::days(2);
        let no_deadline = view(3, BookingStatus::Confirmed, "OEUVRE_ART");

        let classified = classify_and_sort_bookings(vec![no_deadline, cd, book], now);
        let ids: Vec<_> = classified
            .ongoing
            .iter()
            .map(|v| v.booking.id.get())
            .collect();

        assert_eq!(ids, vec![1, 2, 3]);
    }
}
