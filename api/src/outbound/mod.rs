//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: PostgreSQL repositories using Diesel ORM
//! - **redis**: reindexing signals and notification jobs on Redis
//! - **stock_file_source**: provider stock feeds read from JSON-lines files
//!
//! Adapters are thin translators between domain types and infrastructure
//! representations. They contain no business logic.

pub mod persistence;
pub mod redis;
pub mod stock_file_source;
