//! Offers and their stocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::subcategory::{self, Subcategory};
use crate::domain::{Cents, OfferId, OffererId, ProviderId, StockId, VenueId};

/// Highest price a stock may carry.
pub const MAX_STOCK_PRICE: Cents = Cents::euros(300);

/// Moderation state of an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferValidation {
    /// Not yet submitted.
    Draft,
    /// Waiting for moderation.
    Pending,
    /// Visible to beneficiaries.
    Approved,
    /// Refused by moderation.
    Rejected,
}

impl OfferValidation {
    /// Database representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Parse the database representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "DRAFT" => Some(Self::Draft),
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A cultural offer published by a venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    /// Offer id.
    pub id: OfferId,
    /// Publishing venue.
    pub venue_id: VenueId,
    /// Subcategory identifier.
    pub subcategory_id: String,
    /// Display name.
    pub name: String,
    /// Whether two places may be booked at once.
    pub is_duo: bool,
    /// Whether the pro user has the offer switched on.
    pub is_active: bool,
    /// Moderation state.
    pub validation: OfferValidation,
    /// Access URL; online offers have one.
    pub url: Option<String>,
    /// EAN of the underlying product, for goods.
    pub ean: Option<String>,
    /// Provider that last synchronised this offer.
    pub last_provider_id: Option<ProviderId>,
    /// Reference of this offer at its provider.
    pub id_at_provider: Option<String>,
}

impl Offer {
    /// Subcategory rules, when known.
    pub fn subcategory(&self) -> Option<&'static Subcategory> {
        subcategory::find(&self.subcategory_id)
    }

    /// Online offers are delivered through a URL.
    pub const fn is_digital(&self) -> bool {
        self.url.is_some()
    }

    /// Whether the offer's stocks have a beginning datetime.
    pub fn is_event(&self) -> bool {
        self.subcategory().is_some_and(|sub| sub.is_event)
    }

    /// Whether bookings are used as soon as they are made.
    pub fn is_automatically_used(&self) -> bool {
        self.is_digital() && self.subcategory().is_some_and(|sub| sub.is_automatically_used)
    }

    /// Whether moderation and the pro user both allow booking.
    pub fn is_released(&self) -> bool {
        self.is_active && self.validation == OfferValidation::Approved
    }
}

/// A bookable quantity of an offer at a price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stock {
    /// Stock id.
    pub id: StockId,
    /// Parent offer.
    pub offer_id: OfferId,
    /// Unit price.
    pub price: Cents,
    /// Total quantity; `None` means unlimited.
    pub quantity: Option<u32>,
    /// Units held by non-cancelled bookings.
    pub dn_booked_quantity: u32,
    /// Event start, for event offers.
    pub beginning_datetime: Option<DateTime<Utc>>,
    /// Last moment bookings are accepted.
    pub booking_limit_datetime: Option<DateTime<Utc>>,
    /// Soft-deleted stocks are kept for history but never booked.
    pub is_soft_deleted: bool,
    /// Reference of this stock at its provider.
    pub id_at_providers: Option<String>,
    /// Quantity last reported by the provider.
    pub raw_provider_quantity: Option<u32>,
    /// Provider that last synchronised this stock.
    pub last_provider_id: Option<ProviderId>,
}

impl Stock {
    /// Units still available; `None` when unlimited.
    pub const fn remaining_quantity(&self) -> Option<u32> {
        match self.quantity {
            Some(quantity) => Some(quantity.saturating_sub(self.dn_booked_quantity)),
            None => None,
        }
    }

    /// Whether the stock has nothing left to sell.
    pub const fn is_sold_out(&self) -> bool {
        matches!(self.remaining_quantity(), Some(0))
    }

    /// Whether the booking limit lies in the past.
    pub fn has_booking_limit_datetime_passed(&self, now: DateTime<Utc>) -> bool {
        self.booking_limit_datetime.is_some_and(|limit| limit <= now)
    }

    /// Whether the event has already started.
    pub fn is_event_expired(&self, now: DateTime<Utc>) -> bool {
        self.beginning_datetime.is_some_and(|begin| begin <= now)
    }

    /// Whether this stock can be booked right now.
    pub fn is_bookable(&self, offer: &Offer, now: DateTime<Utc>) -> bool {
        !self.is_soft_deleted
            && offer.is_released()
            && !self.has_booking_limit_datetime_passed(now)
            && !self.is_event_expired(now)
            && !self.is_sold_out()
    }
}

/// A stock together with the data booking rules need about its offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookableStock {
    /// The stock being booked.
    pub stock: Stock,
    /// Its offer.
    pub offer: Offer,
    /// Offerer owning the offer's venue.
    pub offerer_id: OffererId,
    /// Whether activation codes were uploaded for this stock.
    pub has_activation_codes: bool,
}

impl BookableStock {
    /// Whether a booking must take one of the stock's activation codes.
    pub const fn uses_activation_codes(&self) -> bool {
        self.has_activation_codes && self.offer.is_digital()
    }
}

/// Price validation errors for provider-fed stocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StockPriceError {
    /// The price is below zero.
    #[error("Le prix d’une offre ne peut être inférieur à 0 €")]
    Negative,
    /// The price is above the platform maximum.
    #[error("Le prix d’une offre ne peut excéder 300 euros.")]
    TooHigh,
}

/// Check a stock price against the platform bounds.
pub fn validate_stock_price(price: Cents) -> Result<(), StockPriceError> {
    if price.is_negative() {
        return Err(StockPriceError::Negative);
    }
    if price > MAX_STOCK_PRICE {
        return Err(StockPriceError::TooHigh);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn offer() -> Offer {
        Offer {
            id: OfferId::new(1),
            venue_id: VenueId::new(1),
            subcategory_id: "SEANCE_CINE".to_owned(),
            name: "Séance".to_owned(),
            is_duo: false,
            is_active: true,
            validation: OfferValidation::Approved,
            url: None,
            ean: None,
            last_provider_id: None,
            id_at_provider: None,
        }
    }

    #[fixture]
    fn stock() -> Stock {
        Stock {
            id: StockId::new(1),
            offer_id: OfferId::new(1),
            price: Cents::euros(10),
            quantity: Some(3),
            dn_booked_quantity: 1,
            beginning_datetime: None,
            booking_limit_datetime: None,
            is_soft_deleted: false,
            id_at_providers: None,
            raw_provider_quantity: None,
            last_provider_id: None,
        }
    }

    #[rstest]
    fn remaining_quantity_subtracts_booked_units(stock: Stock) {
        assert_eq!(stock.remaining_quantity(), Some(2));
        let unlimited = Stock {
            quantity: None,
            ..stock
        };
        assert_eq!(unlimited.remaining_quantity(), None);
    }

    #[rstest]
    fn sold_out_stock_is_not_bookable(offer: Offer, stock: Stock) {
        let sold_out = Stock {
            dn_booked_quantity: 3,
            ..stock
        };
        assert!(!sold_out.is_bookable(&offer, Utc::now()));
    }

    #[rstest]
    #[case(OfferValidation::Pending, true)]
    #[case(OfferValidation::Approved, false)]
    fn inactive_or_unapproved_offer_blocks_booking(
        mut offer: Offer,
        stock: Stock,
        #[case] validation: OfferValidation,
        #[case] is_active: bool,
    ) {
        offer.validation = validation;
        offer.is_active = is_active;
        assert!(!stock.is_bookable(&offer, Utc::now()));
    }

    #[rstest]
    fn passed_booking_limit_blocks_booking(offer: Offer, stock: Stock) {
        let now = Utc::now();
        let limited = Stock {
            booking_limit_datetime: Some(now - Duration::hours(1)),
            ..stock
        };
        assert!(!limited.is_bookable(&offer, now));
    }

    #[rstest]
    fn started_event_blocks_booking(offer: Offer, stock: Stock) {
        let now = Utc::now();
        let started = Stock {
            beginning_datetime: Some(now - Duration::minutes(5)),
            ..stock.clone()
        };
        assert!(!started.is_bookable(&offer, now));
        assert!(stock.is_bookable(&offer, now));
    }

    #[rstest]
    #[case(Cents::new(-1), Err(StockPriceError::Negative))]
    #[case(Cents::euros(300), Ok(()))]
    #[case(Cents::new(30_001), Err(StockPriceError::TooHigh))]
    fn validates_price_bounds(#[case] price: Cents, #[case] expected: Result<(), StockPriceError>) {
        assert_eq!(validate_stock_price(price), expected);
    }

    #[rstest]
    fn online_subscription_is_automatically_used(mut offer: Offer) {
        offer.subcategory_id = "ABO_PRESSE_EN_LIGNE".to_owned();
        assert!(!offer.is_automatically_used());
        offer.url = Some("https://example.com/presse".to_owned());
        assert!(offer.is_automatically_used());
    }
}
