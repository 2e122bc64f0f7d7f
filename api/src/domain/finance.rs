//! Finance events recorded for the reimbursement pipeline.
//!
//! Every change that affects what an offerer will be paid (a booking used,
//! unused, cancelled after use) appends an event. Pricing happens later,
//! outside this crate, and reads the pending events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::booking::Booking;
use crate::domain::{BookingId, CollectiveBookingId, FinanceEventId};

/// Why a finance event was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinanceEventMotive {
    /// The booking was used.
    BookingUsed,
    /// A cancelled booking was revived as used.
    BookingUsedAfterCancellation,
    /// A used booking was walked back.
    BookingUnused,
    /// A used event booking was cancelled.
    BookingCancelledAfterUse,
}

impl FinanceEventMotive {
    /// Database representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BookingUsed => "booking-used",
            Self::BookingUsedAfterCancellation => "booking-used-after-cancellation",
            Self::BookingUnused => "booking-unused",
            Self::BookingCancelledAfterUse => "booking-cancelled-after-use",
        }
    }

    /// Parse the database representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "booking-used" => Some(Self::BookingUsed),
            "booking-used-after-cancellation" => Some(Self::BookingUsedAfterCancellation),
            "booking-unused" => Some(Self::BookingUnused),
            "booking-cancelled-after-use" => Some(Self::BookingCancelledAfterUse),
            _ => None,
        }
    }
}

/// Processing state of a finance event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinanceEventStatus {
    /// Waiting for a pricing point.
    Pending,
    /// Ready to be priced.
    Ready,
    /// A pricing exists.
    Priced,
    /// Superseded.
    Cancelled,
    /// Will never be priced.
    NotToBePriced,
}

impl FinanceEventStatus {
    /// Database representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Priced => "priced",
            Self::Cancelled => "cancelled",
            Self::NotToBePriced => "not to be priced",
        }
    }

    /// Parse the database representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "ready" => Some(Self::Ready),
            "priced" => Some(Self::Priced),
            "cancelled" => Some(Self::Cancelled),
            "not to be priced" => Some(Self::NotToBePriced),
            _ => None,
        }
    }
}

/// State of the pricing attached to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingStatus {
    /// Computed, may still be cancelled.
    Validated,
    /// Included in a cashflow.
    Processed,
    /// Invoiced to the offerer.
    Invoiced,
}

impl PricingStatus {
    /// Database representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Processed => "processed",
            Self::Invoiced => "invoiced",
        }
    }

    /// Parse the database representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "validated" => Some(Self::Validated),
            "processed" => Some(Self::Processed),
            "invoiced" => Some(Self::Invoiced),
            _ => None,
        }
    }

    /// Whether money already moved for this pricing.
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Processed | Self::Invoiced)
    }
}

/// A persisted finance event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinanceEvent {
    /// Event id.
    pub id: FinanceEventId,
    /// Individual booking concerned.
    pub booking_id: Option<BookingId>,
    /// Collective booking concerned.
    pub collective_booking_id: Option<CollectiveBookingId>,
    /// Why the event exists.
    pub motive: FinanceEventMotive,
    /// Processing state.
    pub status: FinanceEventStatus,
    /// Date the event takes effect.
    pub value_date: DateTime<Utc>,
    /// Pricing attached, if priced.
    pub pricing_status: Option<PricingStatus>,
}

/// A finance event to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFinanceEvent {
    /// Individual booking concerned.
    pub booking_id: Option<BookingId>,
    /// Collective booking concerned.
    pub collective_booking_id: Option<CollectiveBookingId>,
    /// Why the event exists.
    pub motive: FinanceEventMotive,
    /// Initial status.
    pub status: FinanceEventStatus,
    /// Date the event takes effect.
    pub value_date: DateTime<Utc>,
}

impl NewFinanceEvent {
    /// Event for an individual booking, valued at its use date.
    pub fn for_booking(motive: FinanceEventMotive, booking: &Booking, now: DateTime<Utc>) -> Self {
        Self {
            booking_id: Some(booking.id),
            collective_booking_id: None,
            motive,
            status: FinanceEventStatus::Pending,
            value_date: booking.date_used.unwrap_or(now),
        }
    }

    /// Event for a collective booking.
    pub const fn for_collective_booking(
        motive: FinanceEventMotive,
        collective_booking_id: CollectiveBookingId,
        value_date: DateTime<Utc>,
    ) -> Self {
        Self {
            booking_id: None,
            collective_booking_id: Some(collective_booking_id),
            motive,
            status: FinanceEventStatus::Pending,
            value_date,
        }
    }
}

/// Journal writes that go with one booking change.
///
/// Booking adapters apply the journal in the transaction that saves the
/// booking: either both land or neither does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinanceJournal {
    /// Event to cancel along with its unsettled pricing.
    pub cancelled_event: Option<FinanceEventId>,
    /// Motives of the events to append, in order.
    pub new_events: Vec<FinanceEventMotive>,
    /// Instant of the change.
    pub at: DateTime<Utc>,
}

impl FinanceJournal {
    /// Journal with nothing to write.
    pub const fn empty(at: DateTime<Utc>) -> Self {
        Self {
            cancelled_event: None,
            new_events: Vec::new(),
            at,
        }
    }

    /// Journal appending one event.
    pub fn recording(motive: FinanceEventMotive, at: DateTime<Utc>) -> Self {
        Self {
            new_events: vec![motive],
            ..Self::empty(at)
        }
    }

    /// Also cancel `event_id`, if any.
    #[must_use]
    pub const fn cancelling(mut self, event_id: Option<FinanceEventId>) -> Self {
        self.cancelled_event = event_id;
        self
    }

    /// Events to insert once `booking` is saved.
    pub fn events_for(&self, booking: &Booking) -> Vec<NewFinanceEvent> {
        self.new_events
            .iter()
            .map(|motive| NewFinanceEvent::for_booking(*motive, booking, self.at))
            .collect()
    }
}
