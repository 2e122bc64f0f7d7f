//! Strongly typed integer identifiers.
//!
//! Every table in the booking schema is keyed by a `BIGINT` sequence. The
//! newtypes below keep a stock id from being passed where a booking id is
//! expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw database identifier.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Raw database identifier.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of an individual booking.
    BookingId
);
define_id!(
    /// Identifier of a collective (educational) booking.
    CollectiveBookingId
);
define_id!(
    /// Identifier of a stock.
    StockId
);
define_id!(
    /// Identifier of an offer.
    OfferId
);
define_id!(
    /// Identifier of a venue.
    VenueId
);
define_id!(
    /// Identifier of an offerer (the legal entity owning venues).
    OffererId
);
define_id!(
    /// Identifier of a user account.
    UserId
);
define_id!(
    /// Identifier of a deposit granted to a beneficiary.
    DepositId
);
define_id!(
    /// Identifier of a catalogue product.
    ProductId
);
define_id!(
    /// Identifier of a stock provider (cinema chains, bookshops, ...).
    ProviderId
);
define_id!(
    /// Identifier of a finance event.
    FinanceEventId
);

/// Collect raw identifiers for array binds.
pub fn raw_ids<I, T>(ids: I) -> Vec<i64>
where
    I: IntoIterator<Item = T>,
    T: Into<i64>,
{
    ids.into_iter().map(Into::into).collect()
}

macro_rules! impl_into_raw {
    ($($name:ident),*) => {
        $(
            impl From<$name> for i64 {
                fn from(value: $name) -> Self {
                    value.0
                }
            }
        )*
    };
}

impl_into_raw!(
    BookingId,
    CollectiveBookingId,
    StockId,
    OfferId,
    VenueId,
    OffererId,
    UserId,
    DepositId,
    ProductId,
    ProviderId,
    FinanceEventId
);
