//! Test utilities for the pcapi crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`).
//! Compiled for tests and behind the `test-support` feature.

pub mod clock;
pub mod fixtures;
pub mod memory;

pub use clock::MutableClock;
