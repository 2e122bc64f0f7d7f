//! PostgreSQL-backed finance event repository.
//!
//! Reads go through [`DieselFinanceEventRepository`]. Writes are the
//! connection-level helpers below, which the booking adapters call inside
//! their own transactions.

use chrono::{DateTime, Utc};
use diesel::OptionalExtension;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::domain::BookingId;
use crate::domain::finance::{FinanceEvent, FinanceEventStatus, NewFinanceEvent, PricingStatus};
use crate::domain::ports::{FinanceEventRepository, FinanceEventRepositoryError};

use super::diesel_helpers::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{FinanceEventRow, NewFinanceEventRow};
use super::pool::{DbPool, PoolError};
use super::schema::{finance_event, pricing};

const CANCELLED: &str = FinanceEventStatus::Cancelled.as_str();

/// Pricings not yet part of a cashflow, which a cancellation may drop.
const VALIDATED_PRICING: &str = PricingStatus::Validated.as_str();

/// Pricings a cancellation must leave alone.
const SETTLED_PRICINGS: [&str; 2] = [
    PricingStatus::Processed.as_str(),
    PricingStatus::Invoiced.as_str(),
];

/// Diesel-backed implementation of [`FinanceEventRepository`].
#[derive(Clone)]
pub struct DieselFinanceEventRepository {
    pool: DbPool,
}

impl DieselFinanceEventRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> FinanceEventRepositoryError {
    map_basic_pool_error(error, FinanceEventRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> FinanceEventRepositoryError {
    map_basic_diesel_error(
        error,
        FinanceEventRepositoryError::query,
        FinanceEventRepositoryError::connection,
    )
}

fn to_insert_row(event: &NewFinanceEvent, created_at: DateTime<Utc>) -> NewFinanceEventRow<'static> {
    NewFinanceEventRow {
        booking_id: event.booking_id.map(|id| id.get()),
        collective_booking_id: event.collective_booking_id.map(|id| id.get()),
        motive: event.motive.as_str(),
        status: event.status.as_str(),
        value_date: event.value_date,
        creation_date: created_at,
    }
}

/// Append `events` on an open connection.
pub(crate) async fn insert_events(
    conn: &mut AsyncPgConnection,
    events: &[NewFinanceEvent],
    created_at: DateTime<Utc>,
) -> QueryResult<()> {
    if events.is_empty() {
        return Ok(());
    }
    let rows: Vec<NewFinanceEventRow<'static>> = events
        .iter()
        .map(|event| to_insert_row(event, created_at))
        .collect();
    diesel::insert_into(finance_event::table)
        .values(&rows)
        .execute(conn)
        .await?;
    Ok(())
}

/// Result of [`cancel_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventCancellation {
    /// The event is cancelled and its validated pricing dropped.
    Cancelled,
    /// A settled pricing holds the event; nothing was written.
    Settled,
}

/// Cancel an event and drop its validated pricing on an open connection.
///
/// The event row is locked first so a concurrent pricing run cannot settle
/// it between the check and the update.
pub(crate) async fn cancel_event(
    conn: &mut AsyncPgConnection,
    event_id: i64,
) -> QueryResult<EventCancellation> {
    finance_event::table
        .find(event_id)
        .select(finance_event::id)
        .for_update()
        .first::<i64>(conn)
        .await?;
    let settled: bool = diesel::select(diesel::dsl::exists(
        pricing::table
            .filter(pricing::event_id.eq(event_id))
            .filter(pricing::status.eq_any(SETTLED_PRICINGS)),
    ))
    .get_result(conn)
    .await?;
    if settled {
        return Ok(EventCancellation::Settled);
    }

    diesel::delete(
        pricing::table
            .filter(pricing::event_id.eq(event_id))
            .filter(pricing::status.eq(VALIDATED_PRICING)),
    )
    .execute(conn)
    .await?;
    diesel::update(finance_event::table.find(event_id))
        .set(finance_event::status.eq(CANCELLED))
        .execute(conn)
        .await?;
    Ok(EventCancellation::Cancelled)
}


#[async_trait::async_trait]
impl FinanceEventRepository for DieselFinanceEventRepository {
    async fn find_latest_active_event(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<FinanceEvent>, FinanceEventRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let found: Option<(FinanceEventRow, Option<String>)> = finance_event::table
            .left_join(pricing::table)
            .filter(finance_event::booking_id.eq(booking_id.get()))
            .filter(finance_event::status.ne(CANCELLED))
            .order((finance_event::creation_date.desc(), finance_event::id.desc()))
            .select((FinanceEventRow::as_select(), pricing::status.nullable()))
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        found
            .map(|(row, pricing_status)| row.into_event(pricing_status.as_deref()))
            .transpose()
            .map_err(FinanceEventRepositoryError::query)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;
    use crate::domain::finance::FinanceEventMotive;
    use crate::domain::CollectiveBookingId;

    #[rstest]
    fn insert_rows_carry_the_journal_instant() {
        let at = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).single().expect("valid instant");
        let event = NewFinanceEvent::for_collective_booking(
            FinanceEventMotive::BookingUsed,
            CollectiveBookingId::new(4),
            at,
        );

        let row = to_insert_row(&event, at);

        assert_eq!(row.creation_date, at);
        assert_eq!(row.collective_booking_id, Some(4));
        assert_eq!(row.motive, FinanceEventMotive::BookingUsed.as_str());
    }

    #[rstest]
    fn only_validated_pricings_are_dropped() {
        assert_eq!(VALIDATED_PRICING, "validated");
        assert_eq!(SETTLED_PRICINGS, ["processed", "invoiced"]);
    }
}
