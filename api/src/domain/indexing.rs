//! Reasons an offer is pushed back to the search index.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What changed on an offer that search must learn about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexationReason {
    /// A booking consumed stock.
    BookingCreation,
    /// A cancellation released stock.
    BookingCancellation,
    /// A booking was used or revived.
    BookingUsed,
    /// A provider synchronisation changed prices or quantities.
    StockSynchronization,
    /// A stock was edited.
    StockUpdate,
}

impl IndexationReason {
    /// Stable label used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BookingCreation => "booking_creation",
            Self::BookingCancellation => "booking_cancellation",
            Self::BookingUsed => "booking_used",
            Self::StockSynchronization => "stock_synchronization",
            Self::StockUpdate => "stock_update",
        }
    }
}

impl fmt::Display for IndexationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
