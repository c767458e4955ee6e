use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmployeeId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Worker,
    Staff,
    Manager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::Staff => "staff",
            Self::Manager => "manager",
        }
    }

    /// Worker and staff callers are scoped to their own records and to today.
    pub fn is_restricted(&self) -> bool {
        !matches!(self, Self::Manager)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "worker" => Ok(Self::Worker),
            "staff" => Ok(Self::Staff),
            "manager" => Ok(Self::Manager),
            other => Err(DomainError::InvariantViolation(format!(
                "unsupported role `{other}` (expected worker|staff|manager)"
            ))),
        }
    }
}

/// The authenticated principal behind one request. Immutable for the request lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub user_id: EmployeeId,
    pub role: Role,
    pub is_demo: bool,
}

impl ActorContext {
    pub fn new(user_id: EmployeeId, role: Role, is_demo: bool) -> Self {
        Self { user_id, role, is_demo }
    }

    pub fn is_manager(&self) -> bool {
        matches!(self.role, Role::Manager)
    }
}
