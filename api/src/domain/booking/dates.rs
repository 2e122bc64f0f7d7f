//! Deadlines derived from booking and event dates.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// Window after booking during which an event booking may be cancelled.
pub const CONFIRM_BOOKING_AFTER_CREATION_DELAY: Duration = Duration::hours(48);
/// Minimum distance to the event below which cancellation closes.
pub const CONFIRM_BOOKING_BEFORE_EVENT_DELAY: Duration = Duration::hours(48);
/// Delay after which unused bookings of expirable goods are cancelled.
pub const BOOKINGS_AUTO_EXPIRY_DELAY: Duration = Duration::days(30);
/// Delay after which unused paper book bookings are cancelled.
pub const BOOKS_BOOKINGS_AUTO_EXPIRY_DELAY: Duration = Duration::days(10);
/// How far ahead beneficiaries are warned of expiring bookings.
pub const BOOKINGS_EXPIRY_NOTIFICATION_DELAY: Duration = Duration::days(7);
/// How far ahead beneficiaries are warned of expiring book bookings.
pub const BOOKS_BOOKINGS_EXPIRY_NOTIFICATION_DELAY: Duration = Duration::days(5);
/// Delay after an event begins before its bookings are marked as used.
pub const AUTO_USE_AFTER_EVENT_TIME_DELAY: Duration = Duration::hours(48);
/// Age after which subscription bookings are archived.
pub const ARCHIVE_DELAY: Duration = Duration::days(30);

/// Last moment a beneficiary may cancel an event booking.
///
/// Non-event bookings have no limit. For events the window closes 48 hours
/// after booking or 48 hours before the event, whichever comes first, but
/// never before the booking itself.
pub fn compute_cancellation_limit_date(
    event_beginning: Option<DateTime<Utc>>,
    booking_date: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let beginning = event_beginning?;
    let before_event = beginning - CONFIRM_BOOKING_BEFORE_EVENT_DELAY;
    let after_creation = booking_date + CONFIRM_BOOKING_AFTER_CREATION_DELAY;
    Some(before_event.min(after_creation).max(booking_date))
}

/// New cancellation limit after the offerer moved the event.
pub fn compute_edition_limit_date(
    event_beginning: DateTime<Utc>,
    edition_date: DateTime<Utc>,
) -> DateTime<Utc> {
    event_beginning.min(edition_date + CONFIRM_BOOKING_AFTER_CREATION_DELAY)
}

/// Midnight (UTC) of the day containing `now`.
pub fn today_at_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    midnight_of(now.date_naive())
}

fn midnight_of(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Creation-date thresholds below which confirmed bookings have expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryCutoffs {
    /// Paper books created at or before this instant have expired.
    pub books_created_before: DateTime<Utc>,
    /// Other expirable goods created at or before this instant have expired.
    pub others_created_before: DateTime<Utc>,
}

/// Expiry thresholds for the day containing `now`.
pub fn expiry_cutoffs(now: DateTime<Utc>) -> ExpiryCutoffs {
    let midnight = today_at_midnight(now);
    ExpiryCutoffs {
        books_created_before: midnight - BOOKS_BOOKINGS_AUTO_EXPIRY_DELAY,
        others_created_before: midnight - BOOKINGS_AUTO_EXPIRY_DELAY,
    }
}

/// Creation-date windows `[start, end)` of bookings expiring on the day
/// warned about at `given_date`: books first, then other goods.
pub fn soon_to_expire_windows(
    given_date: NaiveDate,
) -> ((DateTime<Utc>, DateTime<Utc>), (DateTime<Utc>, DateTime<Utc>)) {
    let day = midnight_of(given_date);
    let window = |expiry: Duration, notice: Duration| {
        let start = day - expiry + notice;
        (start, start + Duration::days(1))
    };
    (
        window(
            BOOKS_BOOKINGS_AUTO_EXPIRY_DELAY,
            BOOKS_BOOKINGS_EXPIRY_NOTIFICATION_DELAY,
        ),
        window(
            BOOKINGS_AUTO_EXPIRY_DELAY,
            BOOKINGS_EXPIRY_NOTIFICATION_DELAY,
        ),
    )
}
