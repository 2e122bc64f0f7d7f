//! Deposit granting and lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mockable::Clock;
use serde_json::json;
use tracing::info;

use super::booking_service::{map_beneficiary_repository_error, map_deposit_repository_error};
use crate::domain::beneficiary::Beneficiary;
use crate::domain::deposit::{
    Deposit, DepositError, Eligibility, RecreditType, age_on, compute_granted_deposit,
    recredits_due,
};
use crate::domain::ports::{BeneficiaryRepository, DepositRepository};
use crate::domain::{Error, ErrorCode, UserId};

impl From<DepositError> for Error {
    fn from(value: DepositError) -> Self {
        let code = match value {
            DepositError::UserNotGrantable => ErrorCode::Forbidden,
            DepositError::DepositTypeAlreadyGranted(_)
            | DepositError::UserHasAlreadyActiveDeposit => ErrorCode::Conflict,
        };
        let message = value.to_string();
        Self::new(code, message.clone()).with_details(json!({ "deposit": [message] }))
    }
}

/// Grants deposits and keeps them current.
#[derive(Clone)]
pub struct DepositService {
    beneficiaries: Arc<dyn BeneficiaryRepository>,
    deposits: Arc<dyn DepositRepository>,
    clock: Arc<dyn Clock>,
}

impl DepositService {
    /// Build the service.
    pub fn new(
        beneficiaries: Arc<dyn BeneficiaryRepository>,
        deposits: Arc<dyn DepositRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            beneficiaries,
            deposits,
            clock,
        }
    }

    /// Grant the deposit matching `eligibility`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown user, `Conflict` when a deposit of
    /// the same type exists or another deposit is still active, and
    /// `Forbidden` when the user's age does not match the eligibility.
    pub async fn grant_deposit(
        &self,
        user_id: UserId,
        eligibility: Eligibility,
        age_at_registration: Option<u32>,
        source: &str,
    ) -> Result<Deposit, Error> {
        let now = self.clock.utc();
        let user = self.find_user(user_id).await?;
        let existing = self.list_deposits(user_id).await?;

        let granted =
            compute_granted_deposit(eligibility, age_at_registration, user.birth_date, now)?;
        if existing
            .iter()
            .any(|deposit| deposit.deposit_type == granted.deposit_type)
        {
            return Err(DepositError::DepositTypeAlreadyGranted(granted.deposit_type.as_str()).into());
        }
        if existing.iter().any(|deposit| !deposit.is_expired(now)) {
            return Err(DepositError::UserHasAlreadyActiveDeposit.into());
        }

        let mut deposit = self
            .deposits
            .insert(user_id, &granted, source, now)
            .await
            .map_err(map_deposit_repository_error)?;
        info!(
            user_id = %user_id,
            deposit_id = %deposit.id,
            deposit_type = deposit.deposit_type.as_str(),
            amount = %deposit.amount,
            source,
            "deposit granted"
        );

        // A user validated at 15 whose file is processed after a birthday
        // is owed the birthday credits straight away.
        let current_age = user
            .birth_date
            .and_then(|birth_date| age_on(birth_date, now.date_naive()));
        if let (Some(age_at_registration), Some(current_age)) = (age_at_registration, current_age) {
            for recredit in recredits_due(&deposit, age_at_registration, current_age) {
                self.recredit(&deposit, recredit, now).await?;
                deposit.amount = deposit.amount + recredit.amount();
                deposit.recredits.push(recredit);
            }
        }
        Ok(deposit)
    }

    /// Expire the user's most recent deposit one second ago.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the user has no deposit.
    pub async fn expire_current_deposit(&self, user_id: UserId) -> Result<(), Error> {
        let deposit = self.current_deposit(user_id).await?;
        let expiration = self.clock.utc() - Duration::seconds(1);
        self.deposits
            .update_expiration(deposit.id, expiration)
            .await
            .map_err(map_deposit_repository_error)?;
        info!(user_id = %user_id, deposit_id = %deposit.id, %expiration, "deposit expired");
        Ok(())
    }

    /// Add the birthday recredits the user's underage deposit is owed.
    /// Returns the recredits applied.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown user or one without deposit, and
    /// `Forbidden` when the birth date is unknown.
    pub async fn apply_recredits(
        &self,
        user_id: UserId,
        age_at_registration: u32,
    ) -> Result<Vec<RecreditType>, Error> {
        let now = self.clock.utc();
        let user = self.find_user(user_id).await?;
        let current_age = user
            .birth_date
            .and_then(|birth_date| age_on(birth_date, now.date_naive()))
            .ok_or_else(|| Error::from(DepositError::UserNotGrantable))?;
        let deposit = self.current_deposit(user_id).await?;
        if deposit.is_expired(now) {
            return Ok(Vec::new());
        }

        let due = recredits_due(&deposit, age_at_registration, current_age);
        for recredit in &due {
            self.recredit(&deposit, *recredit, now).await?;
        }
        Ok(due)
    }

    async fn recredit(
        &self,
        deposit: &Deposit,
        recredit: RecreditType,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.deposits
            .add_recredit(deposit.id, recredit, now)
            .await
            .map_err(map_deposit_repository_error)?;
        info!(
            user_id = %deposit.user_id,
            deposit_id = %deposit.id,
            recredit = recredit.as_str(),
            "deposit recredited"
        );
        Ok(())
    }

    async fn find_user(&self, user_id: UserId) -> Result<Beneficiary, Error> {
        self.beneficiaries
            .find_by_id(user_id)
            .await
            .map_err(map_beneficiary_repository_error)?
            .ok_or_else(|| {
                Error::not_found(format!("user {user_id} not found"))
                    .with_details(json!({ "userId": ["Utilisateur introuvable"] }))
            })
    }

    async fn list_deposits(&self, user_id: UserId) -> Result<Vec<Deposit>, Error> {
        self.deposits
            .list_for_user(user_id)
            .await
            .map_err(map_deposit_repository_error)
    }

    async fn current_deposit(&self, user_id: UserId) -> Result<Deposit, Error> {
        self.list_deposits(user_id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("user {user_id} has no deposit")))
    }
}

#[cfg(test)]
#[path = "deposit_service_tests.rs"]
mod tests;
