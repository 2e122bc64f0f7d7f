//! Port for loading users with their wallet.

use async_trait::async_trait;

use crate::domain::beneficiary::Beneficiary;
use crate::domain::deposit::ExpenseLine;
use crate::domain::{DepositId, UserId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by beneficiary repository adapters.
    pub enum BeneficiaryRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "beneficiary repository connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } =>
            "beneficiary repository query failed: {message}",
    }
}

/// Port for beneficiary reads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BeneficiaryRepository: Send + Sync {
    /// Load a user with their most recent deposit.
    async fn find_by_id(
        &self,
        user_id: UserId,
    ) -> Result<Option<Beneficiary>, BeneficiaryRepositoryError>;

    /// Non-cancelled bookings charged to a deposit.
    async fn list_expense_lines(
        &self,
        deposit_id: DepositId,
    ) -> Result<Vec<ExpenseLine>, BeneficiaryRepositoryError>;
}
