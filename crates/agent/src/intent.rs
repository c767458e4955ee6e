use flowmaster_core::domain::intent::Intent;

/// Keyword table in evaluation order. The sets overlap, so the first hit wins.
const RULES: &[(Intent, &[&str])] = &[
    (Intent::CreateTransaction, &["录入", "添加", "创建", "新增", "record a", "add", "create"]),
    (Intent::QueryTransactions, &["查询", "显示", "列表", "记录", "query", "list", "show"]),
    (Intent::DailyReport, &["日报", "每日", "今天", "daily", "today"]),
    (Intent::WeeklyReport, &["周报", "每周", "本周", "weekly", "this week"]),
    (Intent::MonthlyReport, &["月报", "每月", "本月", "monthly", "this month"]),
    (Intent::YearlyReport, &["年报", "每年", "今年", "yearly", "annual", "this year"]),
    (Intent::ManagementReport, &["管理", "综合", "指标", "management", "kpi", "overview"]),
    (Intent::EmployeeList, &["员工", "人员", "employees", "staff"]),
];

/// Rule-based, auditable intent resolution. No learned model.
#[derive(Clone, Debug, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> Intent {
        let text = text.trim();
        if text.is_empty() {
            return Intent::Unknown;
        }

        let lowered = text.to_lowercase();
        RULES
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|keyword| mentions(&lowered, keyword)))
            .map(|(intent, _)| *intent)
            .unwrap_or(Intent::Chat)
    }
}

/// CJK keywords match as substrings. ASCII keywords must stand as whole words, so "address"
/// does not count as "add".
fn mentions(text: &str, keyword: &str) -> bool {
    if !keyword.is_ascii() {
        return text.contains(keyword);
    }
    let is_word = |ch: char| ch.is_ascii_alphanumeric() || ch == '_';
    text.match_indices(keyword).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + keyword.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}
