//! Booking core of the pass Culture marketplace.
//!
//! Young beneficiaries spend a state-funded deposit on cultural offers.
//! This crate holds the booking rules, the deposit and expense checks, the
//! scheduled booking jobs and provider stock synchronisation, together with
//! the PostgreSQL and Redis adapters they run on.

pub mod config;
pub mod domain;
pub mod logging;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
