use serde::{Deserialize, Serialize};

/// Classified purpose of one user message. Exactly one per request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CreateTransaction,
    QueryTransactions,
    DailyReport,
    WeeklyReport,
    MonthlyReport,
    YearlyReport,
    ManagementReport,
    EmployeeList,
    Chat,
    Unknown,
    SecurityBlocked,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateTransaction => "create_transaction",
            Self::QueryTransactions => "query_transactions",
            Self::DailyReport => "daily_report",
            Self::WeeklyReport => "weekly_report",
            Self::MonthlyReport => "monthly_report",
            Self::YearlyReport => "yearly_report",
            Self::ManagementReport => "management_report",
            Self::EmployeeList => "employee_list",
            Self::Chat => "chat",
            Self::Unknown => "unknown",
            Self::SecurityBlocked => "security_blocked",
        }
    }

    /// Intents that reach the store during dispatch.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::Chat | Self::Unknown | Self::SecurityBlocked)
    }

    pub fn is_report(&self) -> bool {
        matches!(
            self,
            Self::DailyReport
                | Self::WeeklyReport
                | Self::MonthlyReport
                | Self::YearlyReport
                | Self::ManagementReport
        )
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Intent;

    #[test]
    fn serializes_as_snake_case_tag() {
        let encoded = serde_json::to_string(&Intent::ManagementReport).expect("serialize");
        assert_eq!(encoded, "\"management_report\"");
        assert_eq!(Intent::SecurityBlocked.as_str(), "security_blocked");
    }

    #[test]
    fn chat_unknown_and_blocked_are_not_actionable() {
        assert!(!Intent::Chat.is_actionable());
        assert!(!Intent::Unknown.is_actionable());
        assert!(!Intent::SecurityBlocked.is_actionable());
        assert!(Intent::EmployeeList.is_actionable());
    }
}
