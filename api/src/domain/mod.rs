//! Domain primitives, rules and services.
//!
//! Purpose: hold the booking marketplace's business logic independent of
//! PostgreSQL and Redis. Entities and rule checks are plain data and
//! functions; services orchestrate them over the traits in [`ports`].
//!
//! Public surface:
//! - Error (alias to `error::Error`): transport-agnostic failure payload.
//! - ErrorCode (alias to `error::ErrorCode`): stable error identifier.
//! - Identifier newtypes and [`Cents`].
//! - [`BookingService`], [`BookingJobs`], [`DepositService`] and
//!   [`CatalogueSyncService`].

pub mod beneficiary;
pub mod booking;
pub mod catalogue_sync;
pub mod collective;
pub mod deposit;
pub mod error;
pub mod finance;
mod ids;
pub mod indexing;
mod money;
pub mod notification;
pub mod offer;
pub mod ports;
pub mod siren;
pub mod subcategory;

mod booking_jobs;
mod booking_service;
mod catalogue_sync_service;
mod deposit_service;

pub use self::booking_jobs::{AutoUseReport, BookingJobs, BookingJobsPorts, ExpiredBookingsReport};
pub use self::booking_service::{BookingService, BookingServicePorts};
pub use self::catalogue_sync_service::{CatalogueSyncService, SyncError};
pub use self::deposit_service::DepositService;
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::ids::{
    BookingId, CollectiveBookingId, DepositId, FinanceEventId, OfferId, OffererId, ProductId,
    ProviderId, StockId, UserId, VenueId, raw_ids,
};
pub use self::money::Cents;

/// Convenient service result alias.
pub type DomainResult<T> = Result<T, Error>;
