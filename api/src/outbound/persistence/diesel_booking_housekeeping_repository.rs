//! PostgreSQL-backed set operations for the scheduled booking jobs.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{Array, BigInt, Text, Timestamptz};
use diesel_async::RunQueryDsl;

use crate::domain::booking::{
    Booking, BookingCancellationReason, BookingStatus, BookingValidationAuthorType,
};
use crate::domain::finance::{FinanceEventMotive, NewFinanceEvent};
use crate::domain::ports::{
    BookingHousekeepingError, BookingHousekeepingRepository, ExpiredBatch, ExpiryQuery,
    SoonToExpireQuery,
};
use crate::domain::{BookingId, StockId};

use super::diesel_finance_event_repository::insert_events;
use super::diesel_helpers::{map_basic_diesel_error, map_basic_pool_error};
use super::models::BookingRow;
use super::pool::{DbPool, PoolError};
use super::schema::{booking, offer, stock};

const CONFIRMED: &str = BookingStatus::Confirmed.as_str();
const CANCELLED: &str = BookingStatus::Cancelled.as_str();
const USED: &str = BookingStatus::Used.as_str();
const EXPIRED: &str = BookingCancellationReason::Expired.as_str();
const AUTO: &str = BookingValidationAuthorType::Auto.as_str();

const RECOMPUTE_BOOKED_QUANTITY_SQL: &str = r#"
UPDATE stock
SET dn_booked_quantity = COALESCE((
        SELECT SUM(b.quantity)
        FROM booking b
        WHERE b.stock_id = stock.id
          AND b.status <> 'CANCELLED'
    ), 0),
    date_modified = now()
WHERE id = ANY($1)
"#;

const ARCHIVE_BOOKINGS_SQL: &str = r#"
UPDATE booking
SET display_as_ended = true
WHERE NOT display_as_ended
  AND date_created < $1
  AND (
    (
      EXISTS (SELECT 1 FROM activation_code ac WHERE ac.booking_id = booking.id)
      AND booking.offer_id IN (SELECT o.id FROM offer o WHERE o.url IS NOT NULL)
    )
    OR booking.offer_id IN (SELECT o.id FROM offer o WHERE o.subcategory_id = ANY($2))
  )
"#;

/// Diesel-backed implementation of [`BookingHousekeepingRepository`].
#[derive(Clone)]
pub struct DieselBookingHousekeepingRepository {
    pool: DbPool,
}

impl DieselBookingHousekeepingRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> BookingHousekeepingError {
    map_basic_pool_error(error, BookingHousekeepingError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> BookingHousekeepingError {
    map_basic_diesel_error(
        error,
        BookingHousekeepingError::query,
        BookingHousekeepingError::connection,
    )
}

fn to_domain(rows: Vec<BookingRow>) -> Result<Vec<Booking>, BookingHousekeepingError> {
    rows.into_iter()
        .map(|row| Booking::try_from(row).map_err(BookingHousekeepingError::query))
        .collect()
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

impl From<AutoUseError> for BookingHousekeepingError {
    fn from(error: AutoUseError) -> Self {
        match error {
            AutoUseError::Diesel(error) => map_diesel_error(error),
            AutoUseError::Decode(message) => Self::query(message),
        }
    }
}

fn owned(ids: &[&'static str]) -> Vec<String> {
    ids.iter().map(|id| (*id).to_owned()).collect()
}

#[async_trait::async_trait]
impl BookingHousekeepingRepository for DieselBookingHousekeepingRepository {
    async fn find_expiring_booking_ids(
        &self,
        query: &ExpiryQuery,
    ) -> Result<Vec<BookingId>, BookingHousekeepingError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let ids: Vec<i64> = booking::table
            .inner_join(offer::table)
            .filter(booking::status.eq(CONFIRMED))
            .filter(
                offer::subcategory_id
                    .eq_any(owned(&query.book_subcategory_ids))
                    .and(booking::date_created.le(query.cutoffs.books_created_before))
                    .or(offer::subcategory_id
                        .eq_any(owned(&query.other_expirable_subcategory_ids))
                        .and(booking::date_created.le(query.cutoffs.others_created_before))),
            )
            .order(booking::id.asc())
            .select(booking::id)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(ids.into_iter().map(BookingId::new).collect())
    }

    async fn cancel_expired_batch(
        &self,
        ids: &[BookingId],
        now: DateTime<Utc>,
    ) -> Result<ExpiredBatch, BookingHousekeepingError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let raw_ids: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let outcome: Result<(usize, Vec<i64>), diesel::result::Error> = conn
            .transaction(|conn| {
                async move {
                    let mut stock_ids: Vec<i64> = diesel::update(
                        booking::table
                            .filter(booking::id.eq_any(&raw_ids))
                            .filter(booking::status.eq(CONFIRMED)),
                    )
                    .set((
                        booking::status.eq(CANCELLED),
                        booking::cancellation_date.eq(Some(now)),
                        booking::cancellation_reason.eq(Some(EXPIRED)),
                    ))
                    .returning(booking::stock_id)
                    .get_results(conn)
                    .await?;
                    let cancelled = stock_ids.len();

                    stock_ids.sort_unstable();
                    stock_ids.dedup();
                    if !stock_ids.is_empty() {
                        sql_query(RECOMPUTE_BOOKED_QUANTITY_SQL)
                            .bind::<Array<BigInt>, _>(&stock_ids)
                            .execute(conn)
                            .await?;
                    }
                    Ok((cancelled, stock_ids))
                }
                .scope_boxed()
            })
            .await;

        let (cancelled, stock_ids) = outcome.map_err(map_diesel_error)?;
        Ok(ExpiredBatch {
            cancelled,
            stock_ids: stock_ids.into_iter().map(StockId::new).collect(),
        })
    }

    async fn list_expired_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingHousekeepingError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = booking::table
            .filter(booking::status.eq(CANCELLED))
            .filter(booking::cancellation_reason.eq(EXPIRED))
            .filter(booking::cancellation_date.ge(start))
            .filter(booking::cancellation_date.lt(end))
            .order(booking::id.asc())
            .select(BookingRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        to_domain(rows)
    }

    async fn list_soon_to_expire(
        &self,
        query: &SoonToExpireQuery,
    ) -> Result<Vec<Booking>, BookingHousekeepingError> {
        let (books_start, books_end) = query.books_window;
        let (others_start, others_end) = query.others_window;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = booking::table
            .inner_join(offer::table)
            .filter(booking::status.eq(CONFIRMED))
            .filter(
                offer::subcategory_id
                    .eq_any(owned(&query.book_subcategory_ids))
                    .and(booking::date_created.ge(books_start))
                    .and(booking::date_created.lt(books_end))
                    .or(offer::subcategory_id
                        .eq_any(owned(&query.other_expirable_subcategory_ids))
                        .and(booking::date_created.ge(others_start))
                        .and(booking::date_created.lt(others_end))),
            )
            .order(booking::id.asc())
            .select(BookingRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        to_domain(rows)
    }

    async fn mark_event_bookings_used(
        &self,
        threshold: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingHousekeepingError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let used: Result<Vec<Booking>, AutoUseError> = conn
            .transaction(|conn| {
                async move {
                    let started_stocks = stock::table
                        .filter(stock::beginning_datetime.lt(threshold))
                        .select(stock::id);
                    let rows = diesel::update(
                        booking::table
                            .filter(booking::status.eq(CONFIRMED))
                            .filter(booking::stock_id.eq_any(started_stocks)),
                    )
                    .set((
                        booking::status.eq(USED),
                        booking::date_used.eq(Some(now)),
                        booking::validation_author_type.eq(Some(AUTO)),
                    ))
                    .returning(BookingRow::as_returning())
                    .get_results(conn)
                    .await?;
                    let bookings = rows
                        .into_iter()
                        .map(Booking::try_from)
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(AutoUseError::Decode)?;

                    let events: Vec<NewFinanceEvent> = bookings
                        .iter()
                        .map(|booking| {
                            NewFinanceEvent::for_booking(FinanceEventMotive::BookingUsed, booking, now)
                        })
                        .collect();
                    insert_events(conn, &events, now).await?;
                    Ok(bookings)
                }
                .scope_boxed()
            })
            .await;

        used.map_err(BookingHousekeepingError::from)
    }

    async fn recompute_dn_booked_quantity(
        &self,
        stock_ids: &[StockId],
    ) -> Result<usize, BookingHousekeepingError> {
        if stock_ids.is_empty() {
            return Ok(0);
        }
        let raw_ids: Vec<i64> = stock_ids.iter().map(|id| id.get()).collect();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        sql_query(RECOMPUTE_BOOKED_QUANTITY_SQL)
            .bind::<Array<BigInt>, _>(&raw_ids)
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)
    }

    async fn archive_bookings(
        &self,
        created_before: DateTime<Utc>,
        display_even_if_used_subcategory_ids: &[&'static str],
    ) -> Result<usize, BookingHousekeepingError> {
        let subcategories = owned(display_even_if_used_subcategory_ids);
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        sql_query(ARCHIVE_BOOKINGS_SQL)
            .bind::<Timestamptz, _>(created_before)
            .bind::<Array<Text>, _>(&subcategories)
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)
    }
}
