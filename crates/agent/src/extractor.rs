use std::sync::OnceLock;

use chrono::{Datelike, Duration, Local, NaiveDate};
use regex::Regex;

use flowmaster_core::domain::actor::{EmployeeId, Role};
use flowmaster_core::domain::intent::Intent;
use flowmaster_core::domain::parameters::{validate, ParameterSet};

const QUANTITY_MARKERS: &[&str] = &["数量", "quantity", "qty"];
const AMOUNT_MARKERS: &[&str] = &["金额", "总额", "total_amount", "amount"];

/// Verbs and fillers that can precede a possessive name ("查询张三的流水").
const NAME_PREFIXES: &[&str] = &[
    "帮我", "请", "给我", "查询", "查看", "显示", "统计", "列出", "录入", "添加", "新增", "看看", "看",
    "一下", "最近", "所有", "全部",
];
const NAME_SUFFIXES: &[&str] =
    &["今天", "今日", "昨天", "昨日", "明天", "明日", "本周", "本月", "今年", "最近"];
/// Possessive subjects that never name another employee ("我的流水", "大家的记录").
const NOT_NAMES: &[&str] =
    &["我", "我们", "你", "你们", "本人", "自己", "大家", "所有人", "全部", "所有", "最近", "全店"];

struct Patterns {
    date: Regex,
    number: Regex,
    year: Regex,
    month: Regex,
    week: Regex,
    details: Regex,
    calendar: Regex,
    employee_id: Regex,
    employee_marker: Regex,
    possessive: Regex,
    english_possessive: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        date: Regex::new(
            r"(?P<y>\d{4})[-/](?P<m>\d{1,2})[-/](?P<d>\d{1,2})|(?P<sm>\d{1,2})/(?P<sd>\d{1,2})|(?P<rel>今天|今日|昨天|昨日|明天|明日|today|yesterday|tomorrow)",
        )
        .expect("static date pattern"),
        number: Regex::new(r"\d+(?:\.\d+)?").expect("static number pattern"),
        year: Regex::new(r"(\d{4})\s*年|year\s*(\d{4})").expect("static year pattern"),
        month: Regex::new(r"(\d{1,2})\s*月|month\s*(\d{1,2})").expect("static month pattern"),
        week: Regex::new(r"第\s*(\d{1,2})\s*周|week\s*(\d{1,2})").expect("static week pattern"),
        details: Regex::new(r"(?i)(?:明细|details)\s*[：:]").expect("static details pattern"),
        calendar: Regex::new(r"第\s*\d+\s*周|\d+\s*[年月日号周]").expect("static calendar pattern"),
        employee_id: Regex::new(r"(?:员工\s*(?:id|编号)|employee[_\s]?id)\s*[：:=]?\s*(\d+)")
            .expect("static employee id pattern"),
        employee_marker: Regex::new(r"(?:员工|employee)\s*[：:]\s*([^\s,，。;；:：]+)")
            .expect("static employee marker pattern"),
        possessive: Regex::new(r"([^\s,，。;；:：]+?)\s*的").expect("static possessive pattern"),
        english_possessive: Regex::new(r"([a-z][a-z0-9_.-]*)'s\b")
            .expect("static english possessive pattern"),
    })
}

/// Pulls typed parameters out of sanitized text.
///
/// Every candidate goes through [`validate`]; rejected values are omitted. Only managers may
/// reference another employee. For everyone else `employee_id` is overwritten with their own id.
#[derive(Clone, Debug, Default)]
pub struct ParameterExtractor;

impl ParameterExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(
        &self,
        text: &str,
        intent: Intent,
        role: Role,
        user_id: EmployeeId,
    ) -> ParameterSet {
        self.extract_on(text, intent, role, user_id, Local::now().date_naive())
    }

    /// Same as [`Self::extract`] with relative dates resolved against `today`.
    pub fn extract_on(
        &self,
        text: &str,
        intent: Intent,
        role: Role,
        user_id: EmployeeId,
        today: NaiveDate,
    ) -> ParameterSet {
        let mut parameters = ParameterSet::default();
        if intent == Intent::SecurityBlocked {
            return parameters;
        }

        let lowered = text.to_lowercase();

        let (dates, absolute) = extract_dates(&lowered, today);
        parameters.date = dates.first().copied();
        if let [first, second, ..] = absolute.as_slice() {
            parameters.start_date = Some(*first.min(second));
            parameters.end_date = Some(*first.max(second));
        }

        let patterns = patterns();
        parameters.year = first_capture(&patterns.year, &lowered)
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(validate::year);
        parameters.month = first_capture(&patterns.month, &lowered)
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(validate::month);
        parameters.week = first_capture(&patterns.week, &lowered)
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(validate::week);

        parameters.quantity =
            number_after_marker(&lowered, QUANTITY_MARKERS).and_then(validate::quantity);
        parameters.total_amount =
            number_after_marker(&lowered, AMOUNT_MARKERS).and_then(validate::total_amount);

        parameters.amount_details = patterns
            .details
            .find(text)
            .and_then(|found| text.get(found.end()..))
            .and_then(validate::text);

        if role == Role::Manager {
            extract_employee_reference(text, &lowered, &mut parameters);
        } else {
            parameters.employee_id = Some(user_id);
            parameters.employee_name = None;
            parameters.date.get_or_insert(today);
        }

        parameters
    }
}

/// All resolved dates in order of appearance, plus the absolute ones on their own.
fn extract_dates(lowered: &str, today: NaiveDate) -> (Vec<NaiveDate>, Vec<NaiveDate>) {
    let mut dates = Vec::new();
    let mut absolute = Vec::new();

    for captures in patterns().date.captures_iter(lowered) {
        let resolved = if let Some(relative) = captures.name("rel") {
            resolve_relative(relative.as_str(), today)
        } else if let (Some(year), Some(month), Some(day)) =
            (captures.name("y"), captures.name("m"), captures.name("d"))
        {
            iso_candidate(year.as_str(), month.as_str(), day.as_str()).and_then(|raw| {
                let date = validate::date(&raw);
                if let Some(date) = date {
                    absolute.push(date);
                }
                date
            })
        } else if let (Some(month), Some(day)) = (captures.name("sm"), captures.name("sd")) {
            iso_candidate(&today.year().to_string(), month.as_str(), day.as_str()).and_then(
                |raw| {
                    let date = validate::date(&raw);
                    if let Some(date) = date {
                        absolute.push(date);
                    }
                    date
                },
            )
        } else {
            None
        };

        if let Some(date) = resolved {
            dates.push(date);
        }
    }

    (dates, absolute)
}

fn resolve_relative(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    match token {
        "今天" | "今日" | "today" => Some(today),
        "昨天" | "昨日" | "yesterday" => today.checked_sub_signed(Duration::days(1)),
        "明天" | "明日" | "tomorrow" => today.checked_add_signed(Duration::days(1)),
        _ => None,
    }
}

fn iso_candidate(year: &str, month: &str, day: &str) -> Option<String> {
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    Some(format!("{year}-{month:02}-{day:02}"))
}

fn first_capture<'t>(pattern: &Regex, text: &'t str) -> Option<&'t str> {
    let captures = pattern.captures(text)?;
    captures.iter().skip(1).flatten().next().map(|found| found.as_str())
}

/// First number that follows the earliest of `markers`. No marker, no number.
fn number_after_marker<'t>(lowered: &'t str, markers: &[&str]) -> Option<&'t str> {
    let marker_end = markers
        .iter()
        .filter_map(|marker| lowered.find(marker).map(|start| (start, start + marker.len())))
        .min_by_key(|(start, _)| *start)
        .map(|(_, end)| end)?;

    patterns().number.find_at(lowered, marker_end).map(|found| found.as_str())
}

fn extract_employee_reference(text: &str, lowered: &str, parameters: &mut ParameterSet) {
    let patterns = patterns();

    if let Some(id) = first_capture(&patterns.employee_id, lowered)
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(validate::employee_id)
    {
        parameters.employee_id = Some(id);
        return;
    }

    let candidate = patterns
        .employee_marker
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str().to_string())
        .or_else(|| {
            patterns
                .possessive
                .captures_iter(text)
                .filter_map(|captures| captures.get(1))
                .find_map(|found| strip_name_noise(found.as_str()))
        })
        .or_else(|| {
            patterns
                .english_possessive
                .captures(lowered)
                .and_then(|captures| captures.get(1))
                .map(|found| found.as_str().to_string())
        });

    parameters.employee_name = candidate.as_deref().and_then(validate::text);
}

fn strip_name_noise(raw: &str) -> Option<String> {
    let without_calendar = patterns().calendar.replace_all(raw, "");
    let mut name = without_calendar.trim();
    loop {
        let before = name;
        for prefix in NAME_PREFIXES {
            name = name.strip_prefix(prefix).unwrap_or(name);
        }
        for suffix in NAME_SUFFIXES {
            name = name.strip_suffix(suffix).unwrap_or(name);
        }
        if name == before {
            break;
        }
    }
    let name = name.trim();
    (!name.is_empty()
        && !NOT_NAMES.contains(&name)
        && !name.chars().all(|ch| ch.is_ascii_digit() || ch == '-' || ch == '/'))
        .then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use flowmaster_core::domain::actor::{EmployeeId, Role};
    use flowmaster_core::domain::intent::Intent;

    use super::ParameterExtractor;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 15).expect("valid date")
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn extract(text: &str, role: Role) -> flowmaster_core::domain::parameters::ParameterSet {
        ParameterExtractor::new().extract_on(
            text,
            Intent::CreateTransaction,
            role,
            EmployeeId(7),
            today(),
        )
    }

    #[test]
    fn worker_create_gets_own_id_and_today() {
        let parameters = extract("录入：数量50，金额1000", Role::Worker);

        assert_eq!(parameters.quantity, Some(50));
        assert_eq!(parameters.total_amount, Some(Decimal::new(1000, 0)));
        assert_eq!(parameters.employee_id, Some(EmployeeId(7)));
        assert_eq!(parameters.date, Some(today()));
        assert!(parameters.missing_for_create().is_empty());
    }

    #[test]
    fn non_managers_cannot_name_another_employee() {
        for role in [Role::Worker, Role::Staff] {
            let parameters = extract("员工：张三 员工ID: 3 张三的数量5", role);
            assert_eq!(parameters.employee_id, Some(EmployeeId(7)));
            assert_eq!(parameters.employee_name, None);
        }
    }

    #[test]
    fn numbers_without_markers_are_ignored() {
        let parameters = extract("录入 50 1000", Role::Manager);
        assert_eq!(parameters.quantity, None);
        assert_eq!(parameters.total_amount, None);
    }

    #[test]
    fn english_markers_are_recognised() {
        let parameters = extract("record quantity 12 amount 340.50", Role::Worker);
        assert_eq!(parameters.quantity, Some(12));
        assert_eq!(parameters.total_amount, Some(Decimal::new(34050, 2)));
    }

    #[test]
    fn quantity_boundary() {
        assert_eq!(extract("数量1000000", Role::Worker).quantity, Some(1_000_000));
        assert_eq!(extract("数量1000001", Role::Worker).quantity, None);
        assert_eq!(extract("数量2.5", Role::Worker).quantity, None);
    }

    #[test]
    fn amount_above_ceiling_is_dropped() {
        assert_eq!(extract("金额100000001", Role::Worker).total_amount, None);
        assert_eq!(
            extract("金额100000000", Role::Worker).total_amount,
            Some(Decimal::new(100_000_000, 0))
        );
    }

    #[test]
    fn absolute_and_relative_dates() {
        assert_eq!(extract("2025-01-05 的流水", Role::Manager).date, Some(date(2025, 1, 5)));
        assert_eq!(extract("2025/1/5", Role::Manager).date, Some(date(2025, 1, 5)));
        assert_eq!(extract("3/9 的流水", Role::Manager).date, Some(date(2025, 3, 9)));
        assert_eq!(extract("昨天的流水", Role::Manager).date, Some(date(2025, 3, 14)));
        assert_eq!(extract("明日", Role::Manager).date, Some(date(2025, 3, 16)));
        assert_eq!(extract("yesterday", Role::Manager).date, Some(date(2025, 3, 14)));
    }

    #[test]
    fn iso_date_round_trips_through_extraction() {
        for raw in ["2024-02-29", "1999-12-31", "2025-03-01"] {
            let parameters = extract(raw, Role::Manager);
            let formatted = parameters.date.map(|value| value.format("%Y-%m-%d").to_string());
            assert_eq!(formatted.as_deref(), Some(raw));
        }
    }

    #[test]
    fn impossible_dates_are_dropped() {
        assert_eq!(extract("2025-02-30", Role::Manager).date, None);
        assert_eq!(extract("2025-13-01", Role::Manager).date, None);
    }

    #[test]
    fn two_dates_form_an_ordered_range() {
        let parameters = extract("2025-03-10 到 2025-03-01", Role::Manager);
        assert_eq!(parameters.date, Some(date(2025, 3, 10)));
        assert_eq!(parameters.start_date, Some(date(2025, 3, 1)));
        assert_eq!(parameters.end_date, Some(date(2025, 3, 10)));
    }

    #[test]
    fn year_month_and_week() {
        let parameters = extract("2024年第10周", Role::Manager);
        assert_eq!(parameters.year, Some(2024));
        assert_eq!(parameters.week, Some(10));

        let parameters = extract("2024年3月月报", Role::Manager);
        assert_eq!(parameters.year, Some(2024));
        assert_eq!(parameters.month, Some(3));

        let parameters = extract("第60周 13月", Role::Manager);
        assert_eq!(parameters.week, None);
        assert_eq!(parameters.month, None);
    }

    #[test]
    fn details_are_sanitised_free_text() {
        let parameters = extract("录入：数量5，金额100，明细：微信80, 现金20'; DROP", Role::Worker);
        assert_eq!(parameters.amount_details.as_deref(), Some("微信80, 现金20 DROP"));
    }

    #[test]
    fn manager_names_employee_with_marker() {
        let parameters = extract("录入 员工：张三 数量5 金额100", Role::Manager);
        assert_eq!(parameters.employee_name.as_deref(), Some("张三"));
        assert_eq!(parameters.employee_id, None);
        assert_eq!(parameters.date, None);
    }

    #[test]
    fn manager_names_employee_with_possessive() {
        let parameters = ParameterExtractor::new().extract_on(
            "查询李四今天的流水",
            Intent::QueryTransactions,
            Role::Manager,
            EmployeeId(1),
            today(),
        );
        assert_eq!(parameters.employee_name.as_deref(), Some("李四"));
        assert_eq!(parameters.date, Some(today()));
    }

    #[test]
    fn details_marker_survives_case_folding_that_changes_byte_length() {
        let parameters = extract("İ 录入 数量5 金额100 明细：微信80", Role::Worker);
        assert_eq!(parameters.amount_details.as_deref(), Some("微信80"));

        let parameters = extract("录入 数量5 金额100 DETAILS: cash 20", Role::Worker);
        assert_eq!(parameters.amount_details.as_deref(), Some("cash 20"));
    }

    #[test]
    fn possessive_fillers_are_not_employee_names() {
        for text in ["查询我的流水", "显示最近的记录", "查询3月的流水", "统计第2周的流水", "看看大家的记录"] {
            let parameters = ParameterExtractor::new().extract_on(
                text,
                Intent::QueryTransactions,
                Role::Manager,
                EmployeeId(1),
                today(),
            );
            assert_eq!(parameters.employee_name, None, "{text}");
        }
    }

    #[test]
    fn possessive_name_is_found_behind_fillers() {
        for (text, expected) in [
            ("给我看一下张三的记录", "张三"),
            ("查询李四3月的流水", "李四"),
        ] {
            let parameters = ParameterExtractor::new().extract_on(
                text,
                Intent::QueryTransactions,
                Role::Manager,
                EmployeeId(1),
                today(),
            );
            assert_eq!(parameters.employee_name.as_deref(), Some(expected), "{text}");
        }
    }

    #[test]
    fn manager_names_employee_in_english() {
        let parameters = extract("show alice's records", Role::Manager);
        assert_eq!(parameters.employee_name.as_deref(), Some("alice"));
    }

    #[test]
    fn manager_can_reference_employee_by_id() {
        let parameters = extract("员工ID: 12 数量3 金额30", Role::Manager);
        assert_eq!(parameters.employee_id, Some(EmployeeId(12)));
        assert_eq!(parameters.employee_name, None);
    }

    #[test]
    fn blocked_intent_extracts_nothing() {
        let parameters = ParameterExtractor::new().extract_on(
            "数量5",
            Intent::SecurityBlocked,
            Role::Worker,
            EmployeeId(7),
            today(),
        );
        assert_eq!(parameters, Default::default());
    }
}
