//! Port for fetching stock lines from a provider.

use async_trait::async_trait;

use crate::domain::catalogue_sync::{StockDetailsPage, VenueProviderLink};

use super::define_port_error;

define_port_error! {
    /// Errors raised by provider sources.
    pub enum StockDetailsSourceError {
        /// The provider could not be reached.
        Unavailable { message: String } =>
            "stock provider is unavailable: {message}",
        /// The provider answered with something unreadable.
        Malformed { message: String } =>
            "stock provider payload is malformed: {message}",
    }
}

/// Port for provider stock feeds.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StockDetailsSource: Send + Sync {
    /// Fetch one page of lines for a venue, starting at `cursor`.
    async fn fetch_page(
        &self,
        link: &VenueProviderLink,
        cursor: Option<String>,
    ) -> Result<StockDetailsPage, StockDetailsSourceError>;
}
