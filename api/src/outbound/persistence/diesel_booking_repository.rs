//! PostgreSQL-backed booking repository.
//!
//! Every write runs in one transaction with the stock units it moves and
//! the finance journal it carries. Reservation takes its units with a
//! conditional `UPDATE` on the stock row, so two concurrent bookings can
//! never oversell it. The beneficiary's row is locked before the offer and
//! deposit checks are replayed, so two concurrent bookings of the same user
//! are serialised.

use chrono::{DateTime, Utc};
use diesel::OptionalExtension;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Integer};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::domain::booking::{Booking, BookingStatus, NewBooking};
use crate::domain::finance::FinanceJournal;
use crate::domain::ports::{BookingRepository, BookingRepositoryError};
use crate::domain::{BookingId, Cents, OfferId, StockId, UserId, VenueId};

use super::diesel_finance_event_repository::{EventCancellation, cancel_event, insert_events};
use super::diesel_helpers::{count_for_db, map_basic_diesel_error, map_basic_pool_error};
use super::models::{BookingRow, BookingStatusChange, NewBookingRow};
use super::pool::{DbPool, PoolError};
use super::schema::{activation_code, booking, stock, users};

const CANCELLED: &str = BookingStatus::Cancelled.as_str();

const RESERVE_UNITS_SQL: &str = r#"
UPDATE stock
SET dn_booked_quantity = dn_booked_quantity + $2,
    date_modified = now()
WHERE id = $1
  AND NOT is_soft_deleted
  AND (quantity IS NULL OR quantity - dn_booked_quantity >= $2)
"#;

/// Diesel-backed implementation of [`BookingRepository`].
#[derive(Clone)]
pub struct DieselBookingRepository {
    pool: DbPool,
}

impl DieselBookingRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Failures carried out of a booking transaction.
#[derive(Debug)]
enum BookingWriteError {
    Diesel(diesel::result::Error),
    Decode(String),
    InsufficientStock(i64),
    Missing(i64),
    OfferAlreadyBooked(i64),
    DepositSpendingChanged(i64),
    NoActivationCode(i64),
    SettledPricing(i64),
}

impl From<diesel::result::Error> for BookingWriteError {
    fn from(error: diesel::result::Error) -> Self {
        Self::Diesel(error)
    }
}

impl From<BookingWriteError> for BookingRepositoryError {
    fn from(error: BookingWriteError) -> Self {
        match error {
            BookingWriteError::Diesel(error) => map_diesel_error(error),
            BookingWriteError::Decode(message) => Self::query(message),
            BookingWriteError::InsufficientStock(stock_id) => Self::insufficient_stock(stock_id),
            BookingWriteError::Missing(booking_id) => Self::missing(booking_id),
            BookingWriteError::OfferAlreadyBooked(offer_id) => Self::offer_already_booked(offer_id),
            BookingWriteError::DepositSpendingChanged(deposit_id) => {
                Self::deposit_spending_changed(deposit_id)
            }
            BookingWriteError::NoActivationCode(stock_id) => Self::no_activation_code(stock_id),
            BookingWriteError::SettledPricing(event_id) => Self::settled_pricing(event_id),
        }
    }
}

fn map_pool_error(error: PoolError) -> BookingRepositoryError {
    map_basic_pool_error(error, BookingRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> BookingRepositoryError {
    map_basic_diesel_error(
        error,
        BookingRepositoryError::query,
        BookingRepositoryError::connection,
    )
}

fn to_domain(row: BookingRow) -> Result<Booking, BookingRepositoryError> {
    Booking::try_from(row).map_err(BookingRepositoryError::query)
}

/// Cancel and append the journal's events for `booking`.
async fn apply_journal(
    conn: &mut AsyncPgConnection,
    booking: &Booking,
    journal: &FinanceJournal,
) -> Result<(), BookingWriteError> {
    if let Some(event_id) = journal.cancelled_event {
        if cancel_event(conn, event_id.get()).await? == EventCancellation::Settled {
            return Err(BookingWriteError::SettledPricing(event_id.get()));
        }
    }
    insert_events(conn, &journal.events_for(booking), journal.at).await?;
    Ok(())
}

/// Lock the beneficiary and replay the checks a concurrent booking of the
/// same user could have invalidated.
async fn recheck_user_bookings(
    conn: &mut AsyncPgConnection,
    new_booking: &NewBooking,
) -> Result<(), BookingWriteError> {
    let user_id = new_booking.user_id.get();
    let offer_id = new_booking.offer_id.get();
    users::table
        .find(user_id)
        .select(users::id)
        .for_update()
        .first::<i64>(conn)
        .await?;

    let already_booked: bool = diesel::select(diesel::dsl::exists(
        booking::table
            .filter(booking::user_id.eq(user_id))
            .filter(booking::offer_id.eq(offer_id))
            .filter(booking::status.ne(CANCELLED)),
    ))
    .get_result(conn)
    .await?;
    if already_booked {
        return Err(BookingWriteError::OfferAlreadyBooked(offer_id));
    }

    let Some(deposit_id) = new_booking.deposit_id.map(|id| id.get()) else {
        return Ok(());
    };
    let charged: Vec<(i64, i32)> = booking::table
        .filter(booking::deposit_id.eq(deposit_id))
        .filter(booking::status.ne(CANCELLED))
        .select((booking::amount_cents, booking::quantity))
        .load(conn)
        .await?;
    let spent: Cents = charged
        .into_iter()
        .map(|(amount_cents, quantity)| Cents::new(amount_cents * i64::from(quantity)))
        .sum();
    if spent > new_booking.deposit_spent {
        return Err(BookingWriteError::DepositSpendingChanged(deposit_id));
    }
    Ok(())
}

/// Attach the stock's first free, unexpired activation code to the booking.
async fn claim_activation_code(
    conn: &mut AsyncPgConnection,
    stock_id: i64,
    booking_id: i64,
    now: DateTime<Utc>,
) -> Result<(), BookingWriteError> {
    let code_id: Option<i64> = activation_code::table
        .filter(activation_code::stock_id.eq(stock_id))
        .filter(activation_code::booking_id.is_null())
        .filter(
            activation_code::expiration_date
                .is_null()
                .or(activation_code::expiration_date.gt(now)),
        )
        .order(activation_code::id.asc())
        .select(activation_code::id)
        .for_update()
        .skip_locked()
        .first(conn)
        .await
        .optional()?;
    let code_id = code_id.ok_or(BookingWriteError::NoActivationCode(stock_id))?;
    diesel::update(activation_code::table.find(code_id))
        .set(activation_code::booking_id.eq(Some(booking_id)))
        .execute(conn)
        .await?;
    Ok(())
}

fn to_insert_row(booking: &NewBooking) -> NewBookingRow<'_> {
    NewBookingRow {
        user_id: booking.user_id.get(),
        stock_id: booking.stock_id.get(),
        offer_id: booking.offer_id.get(),
        venue_id: booking.venue_id.get(),
        offerer_id: booking.offerer_id.get(),
        deposit_id: booking.deposit_id.map(|id| id.get()),
        quantity: count_for_db(booking.quantity),
        amount_cents: booking.amount.get(),
        token: booking.token.as_str(),
        status: booking.status.as_str(),
        date_created: booking.date_created,
        date_used: booking.date_used,
        cancellation_limit_date: booking.cancellation_limit_date,
        validation_author_type: booking.validation_author_type.map(|author| author.as_str()),
        display_as_ended: false,
    }
}

#[async_trait::async_trait]
impl BookingRepository for DieselBookingRepository {
    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, BookingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = booking::table
            .find(id.get())
            .select(BookingRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(to_domain).transpose()
    }

    async fn token_exists(&self, token: &str) -> Result<bool, BookingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::select(diesel::dsl::exists(
            booking::table.filter(booking::token.eq(token)),
        ))
        .get_result(&mut conn)
        .await
        .map_err(map_diesel_error)
    }

    async fn has_live_booking_for_offer(
        &self,
        user_id: UserId,
        offer_id: OfferId,
    ) -> Result<bool, BookingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::select(diesel::dsl::exists(
            booking::table
                .filter(booking::user_id.eq(user_id.get()))
                .filter(booking::offer_id.eq(offer_id.get()))
                .filter(booking::status.ne(CANCELLED)),
        ))
        .get_result(&mut conn)
        .await
        .map_err(map_diesel_error)
    }

    async fn venue_has_bookings(&self, venue_id: VenueId) -> Result<bool, BookingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::select(diesel::dsl::exists(
            booking::table.filter(booking::venue_id.eq(venue_id.get())),
        ))
        .get_result(&mut conn)
        .await
        .map_err(map_diesel_error)
    }

    async fn insert_with_reservation(
        &self,
        new_booking: &NewBooking,
        journal: &FinanceJournal,
    ) -> Result<Booking, BookingRepositoryError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let stock_id = new_booking.stock_id.get();
        let quantity = count_for_db(new_booking.quantity);
        let insert_row = to_insert_row(new_booking);
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let inserted: Result<Booking, BookingWriteError> = conn
            .transaction(|conn| {
                async move {
                    recheck_user_bookings(conn, new_booking).await?;

                    let reserved = sql_query(RESERVE_UNITS_SQL)
                        .bind::<BigInt, _>(stock_id)
                        .bind::<Integer, _>(quantity)
                        .execute(conn)
                        .await?;
                    if reserved == 0 {
                        return Err(BookingWriteError::InsufficientStock(stock_id));
                    }

                    let row: BookingRow = diesel::insert_into(booking::table)
                        .values(&insert_row)
                        .returning(BookingRow::as_returning())
                        .get_result(conn)
                        .await?;
                    if new_booking.claim_activation_code {
                        claim_activation_code(conn, stock_id, row.id, new_booking.date_created)
                            .await?;
                    }
                    let inserted = Booking::try_from(row).map_err(BookingWriteError::Decode)?;
                    apply_journal(conn, &inserted, journal).await?;
                    Ok(inserted)
                }
                .scope_boxed()
            })
            .await;

        inserted.map_err(BookingRepositoryError::from)
    }

    async fn save_status(
        &self,
        saved: &Booking,
        journal: &FinanceJournal,
    ) -> Result<(), BookingRepositoryError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let booking_id = saved.id.get();
        let change = BookingStatusChange::of(saved);
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let written: Result<(), BookingWriteError> = conn
            .transaction(|conn| {
                async move {
                    let updated = diesel::update(booking::table.find(booking_id))
                        .set(&change)
                        .execute(conn)
                        .await?;
                    if updated == 0 {
                        return Err(BookingWriteError::Missing(booking_id));
                    }
                    apply_journal(conn, saved, journal).await
                }
                .scope_boxed()
            })
            .await;

        written.map_err(BookingRepositoryError::from)
    }

    async fn save_cancellation(
        &self,
        saved: &Booking,
        journal: &FinanceJournal,
    ) -> Result<(), BookingRepositoryError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let booking_id = saved.id.get();
        let stock_id = saved.stock_id.get();
        let quantity = count_for_db(saved.quantity);
        let change = BookingStatusChange::of(saved);
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let written: Result<(), BookingWriteError> = conn.transaction(|conn| {
            async move {
                // Only a live booking releases units.
                let updated = diesel::update(
                    booking::table
                        .find(booking_id)
                        .filter(booking::status.ne(CANCELLED)),
                )
                .set(&change)
                .execute(conn)
                .await?;
                if updated == 0 {
                    return Err(BookingWriteError::Missing(booking_id));
                }

                diesel::update(stock::table.find(stock_id))
                    .set((
                        stock::dn_booked_quantity.eq(stock::dn_booked_quantity - quantity),
                        stock::date_modified.eq(diesel::dsl::now),
                    ))
                    .execute(conn)
                    .await?;

                // The code handed out is spent: the stock offers one less.
                let holds_code: bool = diesel::select(diesel::dsl::exists(
                    activation_code::table.filter(activation_code::booking_id.eq(booking_id)),
                ))
                .get_result(conn)
                .await?;
                if holds_code {
                    diesel::update(stock::table.find(stock_id))
                        .set(stock::quantity.eq(stock::quantity - 1))
                        .execute(conn)
                        .await?;
                }

                apply_journal(conn, saved, journal).await
            }
            .scope_boxed()
        })
        .await;

        written.map_err(BookingRepositoryError::from)
    }

    async fn save_uncancellation(
        &self,
        saved: &Booking,
        journal: &FinanceJournal,
    ) -> Result<(), BookingRepositoryError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let booking_id = saved.id.get();
        let stock_id = saved.stock_id.get();
        let quantity = count_for_db(saved.quantity);
        let change = BookingStatusChange::of(saved);
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let written: Result<(), BookingWriteError> = conn.transaction(|conn| {
            async move {
                let updated = diesel::update(
                    booking::table
                        .find(booking_id)
                        .filter(booking::status.eq(CANCELLED)),
                )
                .set(&change)
                .execute(conn)
                .await?;
                if updated == 0 {
                    return Err(BookingWriteError::Missing(booking_id));
                }

                diesel::update(stock::table.find(stock_id))
                    .set((
                        stock::dn_booked_quantity.eq(stock::dn_booked_quantity + quantity),
                        stock::date_modified.eq(diesel::dsl::now),
                    ))
                    .execute(conn)
                    .await?;
                apply_journal(conn, saved, journal).await
            }
            .scope_boxed()
        })
        .await;

        written.map_err(BookingRepositoryError::from)
    }

    async fn list_live_for_stock(
        &self,
        stock_id: StockId,
    ) -> Result<Vec<Booking>, BookingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<BookingRow> = booking::table
            .filter(booking::stock_id.eq(stock_id.get()))
            .filter(booking::status.ne(CANCELLED))
            .order(booking::id.asc())
            .select(BookingRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(to_domain).collect()
    }

    async fn update_cancellation_limit_dates(
        &self,
        stock_id: StockId,
        limit: DateTime<Utc>,
    ) -> Result<usize, BookingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::update(
            booking::table
                .filter(booking::stock_id.eq(stock_id.get()))
                .filter(booking::status.ne(CANCELLED)),
        )
        .set(booking::cancellation_limit_date.eq(Some(limit)))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)
    }
}

#[cfg(test)]
mod tests {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(BookingWriteError::InsufficientStock(4), BookingRepositoryError::insufficient_stock(4_i64))]
    #[case(BookingWriteError::Missing(9), BookingRepositoryError::missing(9_i64))]
    #[case(
        BookingWriteError::OfferAlreadyBooked(3),
        BookingRepositoryError::offer_already_booked(3_i64)
    )]
    #[case(
        BookingWriteError::DepositSpendingChanged(1),
        BookingRepositoryError::deposit_spending_changed(1_i64)
    )]
    #[case(
        BookingWriteError::NoActivationCode(4),
        BookingRepositoryError::no_activation_code(4_i64)
    )]
    #[case(BookingWriteError::SettledPricing(7), BookingRepositoryError::settled_pricing(7_i64))]
    #[case(
        BookingWriteError::Decode("bad status".to_owned()),
        BookingRepositoryError::query("bad status")
    )]
    #[case(
        BookingWriteError::Diesel(DieselError::NotFound),
        BookingRepositoryError::query("record not found")
    )]
    fn write_errors_map_to_port_errors(
        #[case] error: BookingWriteError,
        #[case] expected: BookingRepositoryError,
    ) {
        assert_eq!(BookingRepositoryError::from(error), expected);
    }

    #[rstest]
    fn closed_connection_maps_to_connection_error() {
        let error = DieselError::DatabaseError(
            DatabaseErrorKind::ClosedConnection,
            Box::new("gone".to_owned()),
        );
        assert!(matches!(
            map_diesel_error(error),
            BookingRepositoryError::Connection { .. }
        ));
    }

    #[rstest]
    fn reservation_requires_free_units() {
        assert!(RESERVE_UNITS_SQL.contains("quantity - dn_booked_quantity >= $2"));
        assert!(RESERVE_UNITS_SQL.contains("NOT is_soft_deleted"));
    }
}
