//! PostgreSQL-backed stock reads.

use diesel::OptionalExtension;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::offer::{BookableStock, Offer, Stock};
use crate::domain::ports::{StockRepository, StockRepositoryError};
use crate::domain::{OffererId, StockId};

use super::diesel_helpers::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{OfferRow, StockRow};
use super::pool::{DbPool, PoolError};
use super::schema::{activation_code, offer, stock, venue};

/// Diesel-backed implementation of [`StockRepository`].
#[derive(Clone)]
pub struct DieselStockRepository {
    pool: DbPool,
}

impl DieselStockRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> StockRepositoryError {
    map_basic_pool_error(error, StockRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> StockRepositoryError {
    map_basic_diesel_error(
        error,
        StockRepositoryError::query,
        StockRepositoryError::connection,
    )
}

#[async_trait::async_trait]
impl StockRepository for DieselStockRepository {
    async fn find_bookable(
        &self,
        stock_id: StockId,
    ) -> Result<Option<BookableStock>, StockRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let found: Option<(StockRow, OfferRow, i64)> = stock::table
            .inner_join(offer::table.inner_join(venue::table))
            .filter(stock::id.eq(stock_id.get()))
            .select((
                StockRow::as_select(),
                OfferRow::as_select(),
                venue::managing_offerer_id,
            ))
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        let Some((stock_row, offer_row, offerer_id)) = found else {
            return Ok(None);
        };
        let offer = Offer::try_from(offer_row).map_err(StockRepositoryError::query)?;
        let has_activation_codes = offer.is_digital()
            && diesel::select(diesel::dsl::exists(
                activation_code::table.filter(activation_code::stock_id.eq(stock_id.get())),
            ))
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(Some(BookableStock {
            stock: Stock::from(stock_row),
            offer,
            offerer_id: OffererId::new(offerer_id),
            has_activation_codes,
        }))
    }
}
