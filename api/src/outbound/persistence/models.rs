//! Diesel row structs and their conversions to domain types.
//!
//! Rows never leave the persistence module. Text columns are decoded with
//! the domain parsers; an unknown value fails the conversion with a message
//! naming the column.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;

use crate::domain::beneficiary::UserRole;
use crate::domain::booking::{
    Booking, BookingCancellationReason, BookingStatus, BookingValidationAuthorType,
};
use crate::domain::collective::{CollectiveBooking, CollectiveBookingStatus};
use crate::domain::deposit::{Deposit, DepositType, RecreditType};
use crate::domain::finance::{FinanceEvent, FinanceEventMotive, FinanceEventStatus, PricingStatus};
use crate::domain::offer::{Offer, OfferValidation, Stock};
use crate::domain::{
    BookingId, Cents, CollectiveBookingId, DepositId, FinanceEventId, OfferId, OffererId,
    ProviderId, StockId, UserId, VenueId,
};

use super::diesel_helpers::{count_from_db, decode, decode_optional};
use super::schema::{
    booking, collective_booking, deposit, finance_event, offer, recredit, stock, users,
};

// ---------------------------------------------------------------------------
// Bookings
// ---------------------------------------------------------------------------

/// Row read from `booking`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = booking)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct BookingRow {
    pub id: i64,
    pub user_id: i64,
    pub stock_id: i64,
    pub offer_id: i64,
    pub venue_id: i64,
    pub offerer_id: i64,
    pub deposit_id: Option<i64>,
    pub quantity: i32,
    pub amount_cents: i64,
    pub token: String,
    pub status: String,
    pub date_created: DateTime<Utc>,
    pub date_used: Option<DateTime<Utc>>,
    pub cancellation_date: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub cancellation_limit_date: Option<DateTime<Utc>>,
    pub validation_author_type: Option<String>,
    pub reimbursement_date: Option<DateTime<Utc>>,
    pub display_as_ended: bool,
    pub price_category_label: Option<String>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = String;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: BookingId::new(row.id),
            user_id: UserId::new(row.user_id),
            stock_id: StockId::new(row.stock_id),
            offer_id: OfferId::new(row.offer_id),
            venue_id: VenueId::new(row.venue_id),
            offerer_id: OffererId::new(row.offerer_id),
            deposit_id: row.deposit_id.map(DepositId::new),
            quantity: count_from_db(row.quantity),
            amount: Cents::new(row.amount_cents),
            status: decode(&row.status, "booking.status", BookingStatus::parse)?,
            cancellation_reason: decode_optional(
                row.cancellation_reason.as_deref(),
                "booking.cancellation_reason",
                BookingCancellationReason::parse,
            )?,
            validation_author_type: decode_optional(
                row.validation_author_type.as_deref(),
                "booking.validation_author_type",
                BookingValidationAuthorType::parse,
            )?,
            token: row.token,
            date_created: row.date_created,
            date_used: row.date_used,
            cancellation_date: row.cancellation_date,
            cancellation_limit_date: row.cancellation_limit_date,
            reimbursement_date: row.reimbursement_date,
            display_as_ended: row.display_as_ended,
            price_category_label: row.price_category_label,
        })
    }
}

/// Insertable booking.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = booking)]
pub(crate) struct NewBookingRow<'a> {
    pub user_id: i64,
    pub stock_id: i64,
    pub offer_id: i64,
    pub venue_id: i64,
    pub offerer_id: i64,
    pub deposit_id: Option<i64>,
    pub quantity: i32,
    pub amount_cents: i64,
    pub token: &'a str,
    pub status: &'a str,
    pub date_created: DateTime<Utc>,
    pub date_used: Option<DateTime<Utc>>,
    pub cancellation_limit_date: Option<DateTime<Utc>>,
    pub validation_author_type: Option<&'a str>,
    pub display_as_ended: bool,
}

/// Status columns written when a booking changes state.
///
/// `None` fields are written as `NULL`, which clears them.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = booking)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct BookingStatusChange<'a> {
    pub status: &'a str,
    pub date_used: Option<DateTime<Utc>>,
    pub validation_author_type: Option<&'a str>,
    pub cancellation_date: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<&'a str>,
    pub reimbursement_date: Option<DateTime<Utc>>,
}

impl<'a> BookingStatusChange<'a> {
    /// Status columns of `booking`.
    pub fn of(booking: &'a Booking) -> Self {
        Self {
            status: booking.status.as_str(),
            date_used: booking.date_used,
            validation_author_type: booking.validation_author_type.map(|author| author.as_str()),
            cancellation_date: booking.cancellation_date,
            cancellation_reason: booking.cancellation_reason.map(|reason| reason.as_str()),
            reimbursement_date: booking.reimbursement_date,
        }
    }
}

// ---------------------------------------------------------------------------
// Offers and stocks
// ---------------------------------------------------------------------------

/// Row read from `stock`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = stock)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct StockRow {
    pub id: i64,
    pub offer_id: i64,
    pub price_cents: i64,
    pub quantity: Option<i32>,
    pub dn_booked_quantity: i32,
    pub beginning_datetime: Option<DateTime<Utc>>,
    pub booking_limit_datetime: Option<DateTime<Utc>>,
    pub is_soft_deleted: bool,
    pub id_at_providers: Option<String>,
    pub raw_provider_quantity: Option<i32>,
    pub last_provider_id: Option<i64>,
}

impl From<StockRow> for Stock {
    fn from(row: StockRow) -> Self {
        Self {
            id: StockId::new(row.id),
            offer_id: OfferId::new(row.offer_id),
            price: Cents::new(row.price_cents),
            quantity: row.quantity.map(count_from_db),
            dn_booked_quantity: count_from_db(row.dn_booked_quantity),
            beginning_datetime: row.beginning_datetime,
            booking_limit_datetime: row.booking_limit_datetime,
            is_soft_deleted: row.is_soft_deleted,
            id_at_providers: row.id_at_providers,
            raw_provider_quantity: row.raw_provider_quantity.map(count_from_db),
            last_provider_id: row.last_provider_id.map(ProviderId::new),
        }
    }
}

/// Row read from `offer`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = offer)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct OfferRow {
    pub id: i64,
    pub venue_id: i64,
    pub subcategory_id: String,
    pub name: String,
    pub is_duo: bool,
    pub is_active: bool,
    pub validation: String,
    pub url: Option<String>,
    pub ean: Option<String>,
    pub last_provider_id: Option<i64>,
    pub id_at_provider: Option<String>,
}

impl TryFrom<OfferRow> for Offer {
    type Error = String;

    fn try_from(row: OfferRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OfferId::new(row.id),
            venue_id: VenueId::new(row.venue_id),
            validation: decode(&row.validation, "offer.validation", OfferValidation::parse)?,
            subcategory_id: row.subcategory_id,
            name: row.name,
            is_duo: row.is_duo,
            is_active: row.is_active,
            url: row.url,
            ean: row.ean,
            last_provider_id: row.last_provider_id.map(ProviderId::new),
            id_at_provider: row.id_at_provider,
        })
    }
}

/// Insertable provider offer.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = offer)]
pub(crate) struct NewOfferRow<'a> {
    pub venue_id: i64,
    pub product_id: Option<i64>,
    pub subcategory_id: &'a str,
    pub name: &'a str,
    pub is_duo: bool,
    pub is_active: bool,
    pub validation: &'a str,
    pub ean: Option<&'a str>,
    pub last_provider_id: Option<i64>,
    pub id_at_provider: Option<&'a str>,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
}

/// Insertable provider stock.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = stock)]
pub(crate) struct NewStockRow<'a> {
    pub offer_id: i64,
    pub price_cents: i64,
    pub quantity: Option<i32>,
    pub dn_booked_quantity: i32,
    pub is_soft_deleted: bool,
    pub id_at_providers: Option<&'a str>,
    pub raw_provider_quantity: Option<i32>,
    pub last_provider_id: Option<i64>,
    pub date_modified: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Users and deposits
// ---------------------------------------------------------------------------

/// Row read from `users`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct UserRow {
    pub id: i64,
    pub email: String,
    pub roles: Vec<String>,
    pub birth_date: Option<NaiveDate>,
}

impl UserRow {
    /// Known roles; unknown ones are dropped.
    pub fn known_roles(&self) -> Vec<UserRole> {
        self.roles
            .iter()
            .filter_map(|role| UserRole::parse(role))
            .collect()
    }
}

/// Row read from `deposit`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = deposit)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DepositRow {
    pub id: i64,
    pub user_id: i64,
    pub deposit_type: String,
    pub version: i16,
    pub amount_cents: i64,
    pub date_created: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
}

impl DepositRow {
    /// Domain deposit carrying `recredits`.
    pub fn into_deposit(self, recredits: Vec<RecreditType>) -> Result<Deposit, String> {
        Ok(Deposit {
            id: DepositId::new(self.id),
            user_id: UserId::new(self.user_id),
            deposit_type: decode(&self.deposit_type, "deposit.type", DepositType::parse)?,
            version: u8::try_from(self.version)
                .map_err(|_| format!("unexpected deposit.version value {}", self.version))?,
            amount: Cents::new(self.amount_cents),
            date_created: self.date_created,
            expiration_date: self.expiration_date,
            recredits,
        })
    }
}

/// Insertable deposit.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = deposit)]
pub(crate) struct NewDepositRow<'a> {
    pub user_id: i64,
    pub deposit_type: &'a str,
    pub version: i16,
    pub amount_cents: i64,
    pub source: &'a str,
    pub date_created: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
}

/// Insertable recredit.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = recredit)]
pub(crate) struct NewRecreditRow<'a> {
    pub deposit_id: i64,
    pub recredit_type: &'a str,
    pub amount_cents: i64,
    pub date_created: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Finance events
// ---------------------------------------------------------------------------

/// Row read from `finance_event`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = finance_event)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct FinanceEventRow {
    pub id: i64,
    pub booking_id: Option<i64>,
    pub collective_booking_id: Option<i64>,
    pub motive: String,
    pub status: String,
    pub value_date: DateTime<Utc>,
}

impl FinanceEventRow {
    /// Domain event with the status of its pricing, if any.
    pub fn into_event(self, pricing_status: Option<&str>) -> Result<FinanceEvent, String> {
        Ok(FinanceEvent {
            id: FinanceEventId::new(self.id),
            booking_id: self.booking_id.map(BookingId::new),
            collective_booking_id: self.collective_booking_id.map(CollectiveBookingId::new),
            motive: decode(&self.motive, "finance_event.motive", FinanceEventMotive::parse)?,
            status: decode(&self.status, "finance_event.status", FinanceEventStatus::parse)?,
            value_date: self.value_date,
            pricing_status: decode_optional(pricing_status, "pricing.status", PricingStatus::parse)?,
        })
    }
}

/// Insertable finance event.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = finance_event)]
pub(crate) struct NewFinanceEventRow<'a> {
    pub booking_id: Option<i64>,
    pub collective_booking_id: Option<i64>,
    pub motive: &'a str,
    pub status: &'a str,
    pub value_date: DateTime<Utc>,
    pub creation_date: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Collective bookings
// ---------------------------------------------------------------------------

/// Row read from `collective_booking`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = collective_booking)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct CollectiveBookingRow {
    pub id: i64,
    pub collective_stock_id: i64,
    pub venue_id: i64,
    pub offerer_id: i64,
    pub educational_institution_uai: String,
    pub status: String,
    pub date_used: Option<DateTime<Utc>>,
}

impl CollectiveBookingRow {
    /// Domain booking for an event starting at `event_beginning`.
    pub fn into_booking(self, event_beginning: DateTime<Utc>) -> Result<CollectiveBooking, String> {
        Ok(CollectiveBooking {
            id: CollectiveBookingId::new(self.id),
            educational_institution_uai: self.educational_institution_uai,
            venue_id: VenueId::new(self.venue_id),
            offerer_id: OffererId::new(self.offerer_id),
            collective_stock_id: self.collective_stock_id,
            event_beginning,
            status: decode(
                &self.status,
                "collective_booking.status",
                CollectiveBookingStatus::parse,
            )?,
            date_used: self.date_used,
        })
    }
}
