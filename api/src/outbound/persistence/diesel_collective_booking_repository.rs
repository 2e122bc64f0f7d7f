//! PostgreSQL-backed collective booking maintenance.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::collective::{CollectiveBooking, CollectiveBookingStatus};
use crate::domain::finance::{FinanceEventMotive, NewFinanceEvent};
use crate::domain::ports::{CollectiveBookingRepository, CollectiveBookingRepositoryError};

use super::diesel_finance_event_repository::insert_events;
use super::diesel_helpers::{map_basic_diesel_error, map_basic_pool_error};
use super::models::CollectiveBookingRow;
use super::pool::{DbPool, PoolError};
use super::schema::{collective_booking, collective_stock};

/// Diesel-backed implementation of [`CollectiveBookingRepository`].
#[derive(Clone)]
pub struct DieselCollectiveBookingRepository {
    pool: DbPool,
}

impl DieselCollectiveBookingRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> CollectiveBookingRepositoryError {
    map_basic_pool_error(error, CollectiveBookingRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> CollectiveBookingRepositoryError {
    map_basic_diesel_error(
        error,
        CollectiveBookingRepositoryError::query,
        CollectiveBookingRepositoryError::connection,
    )
}

/// Failures carried out of the auto-use transaction.
#[derive(Debug)]
enum AutoUseError {
    Diesel(diesel::result::Error),
    Decode(String),
}

impl From<diesel::result::Error> for AutoUseError {
    fn from(error: diesel::result::Error) -> Self {
        Self::Diesel(error)
    }
}

impl From<AutoUseError> for CollectiveBookingRepositoryError {
    fn from(error: AutoUseError) -> Self {
        match error {
            AutoUseError::Diesel(error) => map_diesel_error(error),
            AutoUseError::Decode(message) => Self::query(message),
        }
    }
}

fn decode(
    rows: Vec<CollectiveBookingRow>,
    beginnings: &HashMap<i64, DateTime<Utc>>,
) -> Result<Vec<CollectiveBooking>, AutoUseError> {
    rows.into_iter()
        .map(|row| {
            let beginning = beginnings
                .get(&row.collective_stock_id)
                .copied()
                .ok_or_else(|| {
                    AutoUseError::Decode(format!(
                        "collective stock {} vanished",
                        row.collective_stock_id
                    ))
                })?;
            row.into_booking(beginning).map_err(AutoUseError::Decode)
        })
        .collect()
}

#[async_trait::async_trait]
impl CollectiveBookingRepository for DieselCollectiveBookingRepository {
    async fn mark_used_after_event(
        &self,
        threshold: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<CollectiveBooking>, CollectiveBookingRepositoryError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let used: Result<Vec<CollectiveBooking>, AutoUseError> = conn
            .transaction(|conn| {
                async move {
                    let started = collective_stock::table
                        .filter(collective_stock::beginning_datetime.lt(threshold))
                        .select(collective_stock::id);
                    let rows: Vec<CollectiveBookingRow> = diesel::update(
                        collective_booking::table
                            .filter(
                                collective_booking::status
                                    .eq(CollectiveBookingStatus::Confirmed.as_str()),
                            )
                            .filter(collective_booking::collective_stock_id.eq_any(started)),
                    )
                    .set((
                        collective_booking::status.eq(CollectiveBookingStatus::Used.as_str()),
                        collective_booking::date_used.eq(Some(now)),
                    ))
                    .returning(CollectiveBookingRow::as_returning())
                    .get_results(conn)
                    .await?;
                    if rows.is_empty() {
                        return Ok(Vec::new());
                    }

                    let stock_ids: Vec<i64> =
                        rows.iter().map(|row| row.collective_stock_id).collect();
                    let beginnings: HashMap<i64, DateTime<Utc>> = collective_stock::table
                        .filter(collective_stock::id.eq_any(&stock_ids))
                        .select((collective_stock::id, collective_stock::beginning_datetime))
                        .load::<(i64, DateTime<Utc>)>(conn)
                        .await?
                        .into_iter()
                        .collect();
                    let bookings = decode(rows, &beginnings)?;

                    let events: Vec<NewFinanceEvent> = bookings
                        .iter()
                        .map(|booking| {
                            NewFinanceEvent::for_collective_booking(
                                FinanceEventMotive::BookingUsed,
                                booking.id,
                                booking.date_used.unwrap_or(now),
                            )
                        })
                        .collect();
                    insert_events(conn, &events, now).await?;
                    Ok(bookings)
                }
                .scope_boxed()
            })
            .await;

        used.map_err(CollectiveBookingRepositoryError::from)
    }
}
