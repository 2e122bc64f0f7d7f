//! Users as seen by the booking rules.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::deposit::{Deposit, DepositType};
use crate::domain::UserId;

/// Roles relevant to booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// Holder of an 18-year-old grant.
    Beneficiary,
    /// Holder of a 15-17 grant.
    UnderageBeneficiary,
    /// Member of an offerer.
    Pro,
    /// Back office staff.
    Admin,
}

impl UserRole {
    /// Parse the database representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "BENEFICIARY" => Some(Self::Beneficiary),
            "UNDERAGE_BENEFICIARY" => Some(Self::UnderageBeneficiary),
            "PRO" => Some(Self::Pro),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// A user together with their current deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beneficiary {
    /// User id.
    pub id: UserId,
    /// Contact email.
    pub email: String,
    /// Granted roles.
    pub roles: Vec<UserRole>,
    /// Declared or verified birth date.
    pub birth_date: Option<NaiveDate>,
    /// Most recent deposit, if any.
    pub deposit: Option<Deposit>,
}

impl Beneficiary {
    /// Whether the user holds any beneficiary role.
    pub fn is_beneficiary(&self) -> bool {
        self.roles
            .iter()
            .any(|role| matches!(role, UserRole::Beneficiary | UserRole::UnderageBeneficiary))
    }

    /// Whether the user is booking on an underage grant.
    pub fn is_underage_beneficiary(&self) -> bool {
        self.roles.contains(&UserRole::UnderageBeneficiary)
            || self
                .deposit
                .as_ref()
                .is_some_and(|deposit| deposit.deposit_type == DepositType::Grant15To17)
    }

    /// Free offers are only open to beneficiaries.
    pub fn can_book_free_offers(&self) -> bool {
        self.is_beneficiary()
    }

    /// Whether the user has a deposit that can still be spent.
    pub fn has_active_deposit(&self, now: DateTime<Utc>) -> bool {
        self.deposit
            .as_ref()
            .is_some_and(|deposit| !deposit.is_expired(now))
    }
}
