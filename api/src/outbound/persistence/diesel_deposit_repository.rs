//! PostgreSQL-backed deposit repository.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::deposit::{Deposit, GrantedDeposit, RecreditType};
use crate::domain::ports::{DepositRepository, DepositRepositoryError};
use crate::domain::{DepositId, UserId};

use super::diesel_beneficiary_repository::load_recredits;
use super::diesel_helpers::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{DepositRow, NewDepositRow, NewRecreditRow};
use super::pool::{DbPool, PoolError};
use super::schema::{deposit, recredit};

/// Diesel-backed implementation of [`DepositRepository`].
#[derive(Clone)]
pub struct DieselDepositRepository {
    pool: DbPool,
}

impl DieselDepositRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> DepositRepositoryError {
    map_basic_pool_error(error, DepositRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> DepositRepositoryError {
    map_basic_diesel_error(
        error,
        DepositRepositoryError::query,
        DepositRepositoryError::connection,
    )
}

#[async_trait::async_trait]
impl DepositRepository for DieselDepositRepository {
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Deposit>, DepositRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<DepositRow> = deposit::table
            .filter(deposit::user_id.eq(user_id.get()))
            .order((deposit::date_created.desc(), deposit::id.desc()))
            .select(DepositRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let mut deposits = Vec::with_capacity(rows.len());
        for row in rows {
            let recredits = load_recredits(&mut conn, row.id)
                .await
                .map_err(map_diesel_error)?;
            deposits.push(
                row.into_deposit(recredits)
                    .map_err(DepositRepositoryError::query)?,
            );
        }
        Ok(deposits)
    }

    async fn insert(
        &self,
        user_id: UserId,
        granted: &GrantedDeposit,
        source: &str,
        now: DateTime<Utc>,
    ) -> Result<Deposit, DepositRepositoryError> {
        let new_row = NewDepositRow {
            user_id: user_id.get(),
            deposit_type: granted.deposit_type.as_str(),
            version: i16::from(granted.version),
            amount_cents: granted.amount.get(),
            source,
            date_created: now,
            expiration_date: Some(granted.expiration_date),
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = diesel::insert_into(deposit::table)
            .values(&new_row)
            .returning(DepositRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row.into_deposit(Vec::new())
            .map_err(DepositRepositoryError::query)
    }

    async fn update_expiration(
        &self,
        deposit_id: DepositId,
        expiration_date: DateTime<Utc>,
    ) -> Result<(), DepositRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(deposit::table.find(deposit_id.get()))
            .set(deposit::expiration_date.eq(Some(expiration_date)))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if updated == 0 {
            return Err(DepositRepositoryError::query(format!(
                "deposit {deposit_id} not found"
            )));
        }
        Ok(())
    }

    async fn add_recredit(
        &self,
        deposit_id: DepositId,
        recredit_type: RecreditType,
        now: DateTime<Utc>,
    ) -> Result<(), DepositRepositoryError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let amount_cents = recredit_type.amount().get();
        let new_row = NewRecreditRow {
            deposit_id: deposit_id.get(),
            recredit_type: recredit_type.as_str(),
            amount_cents,
            date_created: now,
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        // The recredit row and the balance move together.
        let written: Result<(), diesel::result::Error> = conn
            .transaction(|conn| {
                async move {
                    diesel::insert_into(recredit::table)
                        .values(&new_row)
                        .execute(conn)
                        .await?;
                    diesel::update(deposit::table.find(new_row.deposit_id))
                        .set(deposit::amount_cents.eq(deposit::amount_cents + amount_cents))
                        .execute(conn)
                        .await?;
                    Ok(())
                }
                .scope_boxed()
            })
            .await;

        written.map_err(map_diesel_error)
    }
}
