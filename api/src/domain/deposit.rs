//! Deposits granted to beneficiaries and the spending rules attached to them.

use chrono::{DateTime, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::subcategory;
use crate::domain::{Cents, DepositId, UserId};

/// Validity of an 18-year-old grant.
const GRANT_18_VALIDITY: Months = Months::new(24);
/// Current version of the 18-year-old grant.
pub const GRANT_18_CURRENT_VERSION: u8 = 2;

/// Kind of grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepositType {
    /// Grant for 15 to 17 year olds, credited in steps until 18.
    #[serde(rename = "GRANT_15_17")]
    Grant15To17,
    /// Grant for 18 year olds.
    #[serde(rename = "GRANT_18")]
    Grant18,
}

impl DepositType {
    /// Database representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Grant15To17 => "GRANT_15_17",
            Self::Grant18 => "GRANT_18",
        }
    }

    /// Parse the database representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "GRANT_15_17" => Some(Self::Grant15To17),
            "GRANT_18" => Some(Self::Grant18),
            _ => None,
        }
    }
}

/// Eligibility established by identity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Eligibility {
    /// 15 to 17 years old.
    Underage,
    /// 18 years old.
    Age18,
}

/// Birthday top-ups for underage grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecreditType {
    /// Credit received on the 16th birthday.
    #[serde(rename = "RECREDIT_16")]
    Recredit16,
    /// Credit received on the 17th birthday.
    #[serde(rename = "RECREDIT_17")]
    Recredit17,
}

impl RecreditType {
    /// Age at which the credit is due.
    pub const fn age(self) -> u32 {
        match self {
            Self::Recredit16 => 16,
            Self::Recredit17 => 17,
        }
    }

    /// Amount credited.
    pub const fn amount(self) -> Cents {
        Cents::euros(30)
    }

    /// Database representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recredit16 => "RECREDIT_16",
            Self::Recredit17 => "RECREDIT_17",
        }
    }

    /// Parse the database representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "RECREDIT_16" => Some(Self::Recredit16),
            "RECREDIT_17" => Some(Self::Recredit17),
            _ => None,
        }
    }
}

/// Spending caps on top of the deposit balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecificCaps {
    /// Maximum spent on online offers of capped subcategories.
    pub digital: Option<Cents>,
    /// Maximum spent on physical goods of capped subcategories.
    pub physical: Option<Cents>,
}

/// Money granted to a beneficiary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    /// Deposit id.
    pub id: DepositId,
    /// Beneficiary.
    pub user_id: UserId,
    /// Grant kind.
    pub deposit_type: DepositType,
    /// Grant rules version.
    pub version: u8,
    /// Amount credited so far, recredits included.
    pub amount: Cents,
    /// Creation date.
    pub date_created: DateTime<Utc>,
    /// End of validity.
    pub expiration_date: Option<DateTime<Utc>>,
    /// Recredits already applied.
    pub recredits: Vec<RecreditType>,
}

impl Deposit {
    /// Whether the deposit can no longer be spent.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|expiration| expiration < now)
    }

    /// Caps applying to this grant.
    pub const fn specific_caps(&self) -> SpecificCaps {
        match (self.deposit_type, self.version) {
            (DepositType::Grant18, 1) => SpecificCaps {
                digital: Some(Cents::euros(200)),
                physical: Some(Cents::euros(200)),
            },
            (DepositType::Grant18, _) => SpecificCaps {
                digital: Some(Cents::euros(100)),
                physical: None,
            },
            (DepositType::Grant15To17, _) => SpecificCaps {
                digital: None,
                physical: None,
            },
        }
    }
}

/// One non-cancelled booking charged to a deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseLine {
    /// Unit amount.
    pub amount: Cents,
    /// Booked units.
    pub quantity: u32,
    /// Subcategory of the booked offer.
    pub subcategory_id: String,
    /// Whether the booked offer is online.
    pub is_digital_offer: bool,
}

/// Buckets an offer's price is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpenseDomain {
    /// Every booking.
    All,
    /// Online offers of digitally capped subcategories.
    Digital,
    /// Physical goods of physically capped subcategories.
    Physical,
}

/// Domains an offer of `subcategory_id` counts in.
pub fn expense_domains(subcategory_id: &str, is_digital_offer: bool) -> Vec<ExpenseDomain> {
    let mut domains = vec![ExpenseDomain::All];
    if let Some(sub) = subcategory::find(subcategory_id) {
        if is_digital_offer && sub.is_digital_deposit {
            domains.push(ExpenseDomain::Digital);
        }
        if !is_digital_offer && sub.is_physical_deposit {
            domains.push(ExpenseDomain::Physical);
        }
    }
    domains
}

/// Money spent from a deposit, per domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expenses {
    /// Total spent.
    pub all: Cents,
    /// Spent on digitally capped offers.
    pub digital: Cents,
    /// Spent on physically capped goods.
    pub physical: Cents,
}

impl Expenses {
    /// Sum expense lines into domain totals.
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a ExpenseLine>) -> Self {
        let mut expenses = Self::default();
        for line in lines {
            let total = line.amount.times(line.quantity);
            for domain in expense_domains(&line.subcategory_id, line.is_digital_offer) {
                match domain {
                    ExpenseDomain::All => expenses.all = expenses.all + total,
                    ExpenseDomain::Digital => expenses.digital = expenses.digital + total,
                    ExpenseDomain::Physical => expenses.physical = expenses.physical + total,
                }
            }
        }
        expenses
    }
}

/// Reasons a deposit cannot be granted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DepositError {
    /// The user's age does not match the requested eligibility.
    #[error("user is not grantable for this eligibility")]
    UserNotGrantable,
    /// A deposit of the same type already exists.
    #[error("deposit type {0} already granted")]
    DepositTypeAlreadyGranted(&'static str),
    /// The user still has a deposit that has not expired.
    #[error("user already has an active deposit")]
    UserHasAlreadyActiveDeposit,
}

/// Deposit contents computed before insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantedDeposit {
    /// Grant kind.
    pub deposit_type: DepositType,
    /// Grant rules version.
    pub version: u8,
    /// Amount credited on creation.
    pub amount: Cents,
    /// End of validity.
    pub expiration_date: DateTime<Utc>,
}

const fn underage_amount(age: u32) -> Option<Cents> {
    match age {
        15 => Some(Cents::euros(20)),
        16 | 17 => Some(Cents::euros(30)),
        _ => None,
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn end_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_micro_opt(23, 59, 59, 999_999)
        .map(|value| Utc.from_utc_datetime(&value))
}

/// Compute the deposit a user receives for `eligibility`.
pub fn compute_granted_deposit(
    eligibility: Eligibility,
    age_at_registration: Option<u32>,
    birth_date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Result<GrantedDeposit, DepositError> {
    match eligibility {
        Eligibility::Underage => {
            let age = age_at_registration.ok_or(DepositError::UserNotGrantable)?;
            let amount = underage_amount(age).ok_or(DepositError::UserNotGrantable)?;
            let eighteenth_birthday = birth_date
                .and_then(|birth| birth.checked_add_months(Months::new(18 * 12)))
                .ok_or(DepositError::UserNotGrantable)?;
            Ok(GrantedDeposit {
                deposit_type: DepositType::Grant15To17,
                version: 1,
                amount,
                expiration_date: midnight(eighteenth_birthday),
            })
        }
        Eligibility::Age18 => {
            if age_at_registration.is_some_and(|age| age != 18) {
                return Err(DepositError::UserNotGrantable);
            }
            let expiration_date = now
                .date_naive()
                .checked_add_months(GRANT_18_VALIDITY)
                .and_then(end_of_day)
                .ok_or(DepositError::UserNotGrantable)?;
            Ok(GrantedDeposit {
                deposit_type: DepositType::Grant18,
                version: GRANT_18_CURRENT_VERSION,
                amount: Cents::euros(300),
                expiration_date,
            })
        }
    }
}

/// Age in whole years on `date`.
pub fn age_on(birth_date: NaiveDate, date: NaiveDate) -> Option<u32> {
    date.years_since(birth_date)
}

/// Birthday recredits due to an underage deposit and not yet applied.
///
/// A user validated at 15 who is now 17 receives both the 16 and the 17
/// credits; a user validated at 16 never receives the 16 credit.
pub fn recredits_due(deposit: &Deposit, age_at_registration: u32, current_age: u32) -> Vec<RecreditType> {
    if deposit.deposit_type != DepositType::Grant15To17 {
        return Vec::new();
    }
    [RecreditType::Recredit16, RecreditType::Recredit17]
        .into_iter()
        .filter(|recredit| {
            recredit.age() > age_at_registration
                && recredit.age() <= current_age
                && !deposit.recredits.contains(recredit)
        })
        .collect()
}

#[cfg(test)]
#[path = "deposit_tests.rs"]
mod tests;
