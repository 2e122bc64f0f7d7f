//! Collective (educational) bookings made by school institutions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CollectiveBookingId, OffererId, VenueId};

/// Lifecycle status of a collective booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectiveBookingStatus {
    /// Pre-booked by a teacher, waiting for the head of school.
    Pending,
    /// Confirmed by the institution.
    Confirmed,
    /// The event took place.
    Used,
    /// Cancelled by either side.
    Cancelled,
    /// Paid back to the offerer.
    Reimbursed,
}

impl CollectiveBookingStatus {
    /// Database representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Used => "USED",
            Self::Cancelled => "CANCELLED",
            Self::Reimbursed => "REIMBURSED",
        }
    }

    /// Parse the database representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(Self::Pending),
            "CONFIRMED" => Some(Self::Confirmed),
            "USED" => Some(Self::Used),
            "CANCELLED" => Some(Self::Cancelled),
            "REIMBURSED" => Some(Self::Reimbursed),
            _ => None,
        }
    }
}

/// A booking made by an educational institution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectiveBooking {
    /// Booking id.
    pub id: CollectiveBookingId,
    /// UAI code of the institution.
    pub educational_institution_uai: String,
    /// Venue hosting the event.
    pub venue_id: VenueId,
    /// Offerer owning the venue.
    pub offerer_id: OffererId,
    /// Collective stock booked.
    pub collective_stock_id: i64,
    /// Event start.
    pub event_beginning: DateTime<Utc>,
    /// Lifecycle status.
    pub status: CollectiveBookingStatus,
    /// When the booking was used.
    pub date_used: Option<DateTime<Utc>>,
}
