//! Port for deposit persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::deposit::{Deposit, GrantedDeposit, RecreditType};
use crate::domain::{DepositId, UserId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by deposit repository adapters.
    pub enum DepositRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "deposit repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "deposit repository query failed: {message}",
    }
}

/// Port for deposit reads and writes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DepositRepository: Send + Sync {
    /// Every deposit ever granted to a user, most recent first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Deposit>, DepositRepositoryError>;

    /// Insert a deposit.
    async fn insert(
        &self,
        user_id: UserId,
        granted: &GrantedDeposit,
        source: &str,
        now: DateTime<Utc>,
    ) -> Result<Deposit, DepositRepositoryError>;

    /// Set a deposit's expiration date.
    async fn update_expiration(
        &self,
        deposit_id: DepositId,
        expiration_date: DateTime<Utc>,
    ) -> Result<(), DepositRepositoryError>;

    /// Add a birthday recredit and its amount to the deposit.
    async fn add_recredit(
        &self,
        deposit_id: DepositId,
        recredit: RecreditType,
        now: DateTime<Utc>,
    ) -> Result<(), DepositRepositoryError>;
}
