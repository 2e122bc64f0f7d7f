//! Canonical entities shared by unit and integration tests.
//!
//! Every fixture is anchored on [`fixed_now`] so tests can reason about
//! deadlines without reading the wall clock.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::domain::beneficiary::{Beneficiary, UserRole};
use crate::domain::booking::{Booking, BookingStatus};
use crate::domain::deposit::{Deposit, DepositType, GRANT_18_CURRENT_VERSION};
use crate::domain::offer::{BookableStock, Offer, OfferValidation, Stock};
use crate::domain::{
    BookingId, Cents, DepositId, OfferId, OffererId, StockId, UserId, VenueId,
};

/// Instant every fixture is built around: 2024-06-10 12:00 UTC.
pub fn fixed_now() -> DateTime<Utc> {
    match Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).single() {
        Some(now) => now,
        None => panic!("valid fixture timestamp"),
    }
}

/// Birth date making the fixture beneficiary 18 on [`fixed_now`].
pub fn birth_date() -> NaiveDate {
    match NaiveDate::from_ymd_opt(2006, 1, 15) {
        Some(date) => date,
        None => panic!("valid fixture birth date"),
    }
}

/// Confirmed paper book booking made an hour before [`fixed_now`].
pub fn booking() -> Booking {
    Booking {
        id: BookingId::new(1),
        user_id: UserId::new(1),
        stock_id: StockId::new(1),
        offer_id: OfferId::new(1),
        venue_id: VenueId::new(1),
        offerer_id: OffererId::new(1),
        deposit_id: Some(DepositId::new(1)),
        quantity: 1,
        amount: Cents::euros(10),
        token: "ABC123".to_owned(),
        status: BookingStatus::Confirmed,
        date_created: fixed_now() - Duration::hours(1),
        date_used: None,
        cancellation_date: None,
        cancellation_reason: None,
        cancellation_limit_date: None,
        validation_author_type: None,
        reimbursement_date: None,
        display_as_ended: false,
        price_category_label: None,
    }
}

/// Approved paper book offer.
pub fn offer() -> Offer {
    Offer {
        id: OfferId::new(1),
        venue_id: VenueId::new(1),
        subcategory_id: "LIVRE_PAPIER".to_owned(),
        name: "Le Petit Prince".to_owned(),
        is_duo: false,
        is_active: true,
        validation: OfferValidation::Approved,
        url: None,
        ean: Some("9782070612758".to_owned()),
        last_provider_id: None,
        id_at_provider: None,
    }
}

/// Ten copies at 10 € each, none booked.
pub fn stock() -> Stock {
    Stock {
        id: StockId::new(1),
        offer_id: OfferId::new(1),
        price: Cents::euros(10),
        quantity: Some(10),
        dn_booked_quantity: 0,
        beginning_datetime: None,
        booking_limit_datetime: None,
        is_soft_deleted: false,
        id_at_providers: None,
        raw_provider_quantity: None,
        last_provider_id: None,
    }
}

/// [`stock`] with its [`offer`].
pub fn bookable_stock() -> BookableStock {
    BookableStock {
        stock: stock(),
        offer: offer(),
        offerer_id: OffererId::new(1),
        has_activation_codes: false,
    }
}

/// Current 18-year-old grant with 300 € and a year left.
pub fn deposit() -> Deposit {
    Deposit {
        id: DepositId::new(1),
        user_id: UserId::new(1),
        deposit_type: DepositType::Grant18,
        version: GRANT_18_CURRENT_VERSION,
        amount: Cents::euros(300),
        date_created: fixed_now() - Duration::days(30),
        expiration_date: Some(fixed_now() + Duration::days(365)),
        recredits: Vec::new(),
    }
}

/// Beneficiary holding [`deposit`].
pub fn beneficiary() -> Beneficiary {
    Beneficiary {
        id: UserId::new(1),
        email: "jeune@example.com".to_owned(),
        roles: vec![UserRole::Beneficiary],
        birth_date: Some(birth_date()),
        deposit: Some(deposit()),
    }
}
