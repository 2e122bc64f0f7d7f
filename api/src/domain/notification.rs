//! Transactional notifications queued for the mailer and push workers.
//!
//! Only the job payloads live here. Rendering and delivery belong to the
//! workers consuming the queue.

use serde::{Deserialize, Serialize};

use crate::domain::booking::BookingCancellationReason;
use crate::domain::{BookingId, OffererId, UserId};

/// A notification job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Tell the venue a booking was made.
    NewBookingToPro {
        /// Booking created.
        booking_id: BookingId,
        /// Whether this is the venue's first booking ever.
        first_venue_booking: bool,
    },
    /// Confirm a booking to the beneficiary.
    BookingConfirmationToBeneficiary {
        /// Booking created.
        booking_id: BookingId,
    },
    /// Tell both sides a booking was cancelled.
    BookingCancellation {
        /// Cancelled booking.
        booking_id: BookingId,
        /// Who cancelled.
        reason: BookingCancellationReason,
    },
    /// Push notification for an offerer-side cancellation.
    CancelBookingPush {
        /// Cancelled booking ids.
        booking_ids: Vec<BookingId>,
    },
    /// List bookings that expired today to the beneficiary.
    ExpiredBookingsToBeneficiary {
        /// Recipient.
        user_id: UserId,
        /// Expired bookings.
        booking_ids: Vec<BookingId>,
    },
    /// List bookings that expired today to the offerer.
    ExpiredBookingsToOfferer {
        /// Recipient.
        offerer_id: OffererId,
        /// Expired bookings.
        booking_ids: Vec<BookingId>,
    },
    /// Warn a beneficiary that bookings will soon expire.
    SoonToBeExpiredBookingsToBeneficiary {
        /// Recipient.
        user_id: UserId,
        /// Bookings about to expire.
        booking_ids: Vec<BookingId>,
    },
}

impl Notification {
    /// Short label used in logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NewBookingToPro { .. } => "new_booking_to_pro",
            Self::BookingConfirmationToBeneficiary { .. } => "booking_confirmation_to_beneficiary",
            Self::BookingCancellation { .. } => "booking_cancellation",
            Self::CancelBookingPush { .. } => "cancel_booking_push",
            Self::ExpiredBookingsToBeneficiary { .. } => "expired_bookings_to_beneficiary",
            Self::ExpiredBookingsToOfferer { .. } => "expired_bookings_to_offerer",
            Self::SoonToBeExpiredBookingsToBeneficiary { .. } => {
                "soon_to_be_expired_bookings_to_beneficiary"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    fn serialises_with_kind_tag() {
        let notification = Notification::ExpiredBookingsToOfferer {
            offerer_id: OffererId::new(4),
            booking_ids: vec![BookingId::new(1), BookingId::new(2)],
        };

        let value = serde_json::to_value(&notification).expect("notification serialises");

        assert_eq!(
            value,
            json!({
                "kind": "expired_bookings_to_offerer",
                "offerer_id": 4,
                "booking_ids": [1, 2]
            })
        );
        assert_eq!(notification.kind(), "expired_bookings_to_offerer");
    }
}
