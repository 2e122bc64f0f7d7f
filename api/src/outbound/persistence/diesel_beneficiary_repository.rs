//! PostgreSQL-backed beneficiary reads.

use diesel::OptionalExtension;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::domain::beneficiary::Beneficiary;
use crate::domain::booking::BookingStatus;
use crate::domain::deposit::{Deposit, ExpenseLine, RecreditType};
use crate::domain::ports::{BeneficiaryRepository, BeneficiaryRepositoryError};
use crate::domain::{Cents, DepositId, UserId};

use super::diesel_helpers::{count_from_db, map_basic_diesel_error, map_basic_pool_error};
use super::models::{DepositRow, UserRow};
use super::pool::{DbPool, PoolError};
use super::schema::{booking, deposit, offer, recredit, users};

/// Diesel-backed implementation of [`BeneficiaryRepository`].
#[derive(Clone)]
pub struct DieselBeneficiaryRepository {
    pool: DbPool,
}

impl DieselBeneficiaryRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> BeneficiaryRepositoryError {
    map_basic_pool_error(error, BeneficiaryRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> BeneficiaryRepositoryError {
    map_basic_diesel_error(
        error,
        BeneficiaryRepositoryError::query,
        BeneficiaryRepositoryError::connection,
    )
}

/// Recredit types of a deposit, oldest first.
pub(crate) async fn load_recredits(
    conn: &mut AsyncPgConnection,
    deposit_id: i64,
) -> Result<Vec<RecreditType>, diesel::result::Error> {
    let raw: Vec<String> = recredit::table
        .filter(recredit::deposit_id.eq(deposit_id))
        .order((recredit::date_created.asc(), recredit::id.asc()))
        .select(recredit::recredit_type)
        .load(conn)
        .await?;
    // Recredit kinds this crate does not model do not change the balance
    // rules and are skipped.
    Ok(raw
        .iter()
        .filter_map(|value| RecreditType::parse(value))
        .collect())
}

async fn latest_deposit(
    conn: &mut AsyncPgConnection,
    user_id: i64,
) -> Result<Option<Deposit>, BeneficiaryRepositoryError> {
    let row: Option<DepositRow> = deposit::table
        .filter(deposit::user_id.eq(user_id))
        .order((deposit::date_created.desc(), deposit::id.desc()))
        .select(DepositRow::as_select())
        .first(conn)
        .await
        .optional()
        .map_err(map_diesel_error)?;
    let Some(row) = row else {
        return Ok(None);
    };
    let recredits = load_recredits(conn, row.id).await.map_err(map_diesel_error)?;
    row.into_deposit(recredits)
        .map(Some)
        .map_err(BeneficiaryRepositoryError::query)
}

#[async_trait::async_trait]
impl BeneficiaryRepository for DieselBeneficiaryRepository {
    async fn find_by_id(
        &self,
        user_id: UserId,
    ) -> Result<Option<Beneficiary>, BeneficiaryRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<UserRow> = users::table
            .find(user_id.get())
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let deposit = latest_deposit(&mut conn, row.id).await?;
        Ok(Some(Beneficiary {
            id: UserId::new(row.id),
            roles: row.known_roles(),
            email: row.email,
            birth_date: row.birth_date,
            deposit,
        }))
    }

    async fn list_expense_lines(
        &self,
        deposit_id: DepositId,
    ) -> Result<Vec<ExpenseLine>, BeneficiaryRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<(i64, i32, String, bool)> = booking::table
            .inner_join(offer::table)
            .filter(booking::deposit_id.eq(deposit_id.get()))
            .filter(booking::status.ne(BookingStatus::Cancelled.as_str()))
            .select((
                booking::amount_cents,
                booking::quantity,
                offer::subcategory_id,
                offer::url.is_not_null(),
            ))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(rows
            .into_iter()
            .map(
                |(amount_cents, quantity, subcategory_id, is_digital_offer)| ExpenseLine {
                    amount: Cents::new(amount_cents),
                    quantity: count_from_db(quantity),
                    subcategory_id,
                    is_digital_offer,
                },
            )
            .collect())
    }
}

