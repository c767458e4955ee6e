use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::{EmployeeId, Role};
use crate::reports::period::DateRange;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub i64);

/// One recorded day of work for one employee. `amount_details` is plaintext here; the
/// storage layer keeps it encrypted at rest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub date: NaiveDate,
    pub employee_id: EmployeeId,
    pub employee_name: Option<String>,
    pub quantity: u32,
    pub total_amount: Decimal,
    pub amount_details: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub employee_id: EmployeeId,
    pub quantity: u32,
    pub total_amount: Decimal,
    pub amount_details: String,
}

/// Filters for listing transactions. `limit` caps the result, newest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub range: Option<DateRange>,
    pub employee_id: Option<EmployeeId>,
    pub limit: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub username: String,
    pub real_name: String,
    pub role: Role,
    pub is_active: bool,
    pub is_demo: bool,
    pub created_at: DateTime<Utc>,
}

impl Employee {
    /// Exact match on display name or login name.
    pub fn answers_to(&self, name: &str) -> bool {
        let name = name.trim();
        !name.is_empty() && (self.real_name == name || self.username == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEmployee {
    pub username: String,
    pub real_name: String,
    pub role: Role,
    pub is_demo: bool,
}
