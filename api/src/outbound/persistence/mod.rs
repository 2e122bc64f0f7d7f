//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Each repository implements one domain port on top of a shared
//! [`DbPool`] of `diesel-async` connections.
//!
//! - **Thin adapters**: repositories translate between Diesel rows and
//!   domain types. Booking rules stay in the domain.
//! - **Internal models**: row structs (`models.rs`) and table definitions
//!   (`schema.rs`) never leave this module.
//! - **Atomic writes**: every write that moves stock units runs in one
//!   transaction with the booking it belongs to.
//!
//! # Example
//!
//! ```ignore
//! use pcapi::outbound::persistence::{DbPool, DieselBookingRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/pass_culture")).await?;
//! let bookings = DieselBookingRepository::new(pool);
//! ```

mod diesel_beneficiary_repository;
mod diesel_booking_housekeeping_repository;
mod diesel_booking_repository;
mod diesel_catalogue_sync_repository;
mod diesel_collective_booking_repository;
mod diesel_deposit_repository;
mod diesel_finance_event_repository;
pub(crate) mod diesel_helpers;
mod diesel_stock_repository;
mod models;
mod pool;
mod schema;

pub use diesel_beneficiary_repository::DieselBeneficiaryRepository;
pub use diesel_booking_housekeeping_repository::DieselBookingHousekeepingRepository;
pub use diesel_booking_repository::DieselBookingRepository;
pub use diesel_catalogue_sync_repository::DieselCatalogueSyncRepository;
pub use diesel_collective_booking_repository::DieselCollectiveBookingRepository;
pub use diesel_deposit_repository::DieselDepositRepository;
pub use diesel_finance_event_repository::DieselFinanceEventRepository;
pub use diesel_stock_repository::DieselStockRepository;
pub use pool::{DbPool, PoolConfig, PoolError};
