//! Port for reading stocks with their offers.

use async_trait::async_trait;

use crate::domain::StockId;
use crate::domain::offer::BookableStock;

use super::define_port_error;

define_port_error! {
    /// Errors raised by stock repository adapters.
    pub enum StockRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "stock repository connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } =>
            "stock repository query failed: {message}",
    }
}

/// Port for stock reads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StockRepository: Send + Sync {
    /// Load a stock with its offer and the offerer owning the venue.
    async fn find_bookable(
        &self,
        stock_id: StockId,
    ) -> Result<Option<BookableStock>, StockRepositoryError>;
}
