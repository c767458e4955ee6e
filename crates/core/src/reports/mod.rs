//! Aggregation of transactions into role-scoped reports.
//!
//! Builders here are pure: callers fetch the transactions for a [`DateRange`] (already
//! scoped to the actor) and get back a serializable report.

pub mod payment;
pub mod period;

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::actor::EmployeeId;
use crate::domain::transaction::Transaction;

pub use payment::{PaymentBreakdown, PaymentMethod};
pub use period::DateRange;

const UNKNOWN_EMPLOYEE: &str = "未知";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmployeeTotals {
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub quantity: u64,
    pub total_amount: Decimal,
    pub transaction_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_quantity: u64,
    pub total_amount: Decimal,
    pub employee_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub summary: Summary,
    pub by_employee: Vec<EmployeeTotals>,
    pub payment_methods: PaymentBreakdown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WeeklyReport {
    pub year: i32,
    pub week: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub summary: Summary,
    pub by_employee: Vec<EmployeeTotals>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonthlyEmployeeTotals {
    #[serde(flatten)]
    pub totals: EmployeeTotals,
    pub daily_avg: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonthlySummary {
    #[serde(flatten)]
    pub totals: Summary,
    pub days_in_month: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonthlyReport {
    pub year: i32,
    pub month: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub summary: MonthlySummary,
    pub by_employee: Vec<MonthlyEmployeeTotals>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PeriodTotals {
    pub quantity: u64,
    pub total_amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct YearlyEmployeeTotals {
    #[serde(flatten)]
    pub totals: EmployeeTotals,
    pub monthly: BTreeMap<u32, PeriodTotals>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct YearlyReport {
    pub year: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub summary: Summary,
    pub by_employee: Vec<YearlyEmployeeTotals>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ManagementSummary {
    pub total_transactions: usize,
    pub total_quantity: u64,
    pub total_amount: Decimal,
    pub avg_daily_amount: Decimal,
    pub avg_per_transaction: Decimal,
    pub growth_rate: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ManagementEmployeeTotals {
    #[serde(flatten)]
    pub totals: EmployeeTotals,
    pub avg_per_transaction: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DayTotals {
    pub date: NaiveDate,
    pub quantity: u64,
    pub total_amount: Decimal,
    pub transaction_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Trends {
    pub highest_day: Option<NaiveDate>,
    pub lowest_day: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ManagementReport {
    pub period: Period,
    pub summary: ManagementSummary,
    pub by_employee: Vec<ManagementEmployeeTotals>,
    pub ranking: Vec<ManagementEmployeeTotals>,
    pub daily_stats: Vec<DayTotals>,
    pub payment_methods: PaymentBreakdown,
    pub trends: Trends,
}

/// Per-employee totals ordered by employee id.
pub fn group_by_employee(transactions: &[Transaction]) -> Vec<EmployeeTotals> {
    let mut grouped: BTreeMap<EmployeeId, EmployeeTotals> = BTreeMap::new();
    for transaction in transactions {
        let entry = grouped.entry(transaction.employee_id).or_insert_with(|| EmployeeTotals {
            employee_id: transaction.employee_id,
            employee_name: transaction
                .employee_name
                .clone()
                .unwrap_or_else(|| UNKNOWN_EMPLOYEE.to_string()),
            quantity: 0,
            total_amount: Decimal::ZERO,
            transaction_count: 0,
        });
        entry.quantity += u64::from(transaction.quantity);
        entry.total_amount += transaction.total_amount;
        entry.transaction_count += 1;
    }
    grouped.into_values().collect()
}

fn summarize(by_employee: &[EmployeeTotals]) -> Summary {
    Summary {
        total_quantity: by_employee.iter().map(|totals| totals.quantity).sum(),
        total_amount: by_employee.iter().map(|totals| totals.total_amount).sum(),
        employee_count: by_employee.len(),
    }
}

fn average(total: Decimal, count: i64) -> Decimal {
    if count <= 0 {
        return Decimal::ZERO;
    }
    (total / Decimal::from(count)).round_dp(2)
}

fn payment_breakdown(transactions: &[Transaction]) -> PaymentBreakdown {
    payment::breakdown(transactions.iter().map(|transaction| transaction.amount_details.as_str()))
}

impl DailyReport {
    pub fn build(date: NaiveDate, transactions: &[Transaction]) -> Self {
        let by_employee = group_by_employee(transactions);
        Self {
            date,
            summary: summarize(&by_employee),
            payment_methods: payment_breakdown(transactions),
            by_employee,
        }
    }
}

impl WeeklyReport {
    pub fn build(year: i32, week: u32, range: DateRange, transactions: &[Transaction]) -> Self {
        let by_employee = group_by_employee(transactions);
        Self {
            year,
            week,
            start_date: range.start,
            end_date: range.end,
            summary: summarize(&by_employee),
            by_employee,
        }
    }
}

impl MonthlyReport {
    pub fn build(year: i32, month: u32, range: DateRange, transactions: &[Transaction]) -> Self {
        let grouped = group_by_employee(transactions);
        let days_in_month = range.days();
        Self {
            year,
            month,
            start_date: range.start,
            end_date: range.end,
            summary: MonthlySummary { totals: summarize(&grouped), days_in_month },
            by_employee: grouped
                .into_iter()
                .map(|totals| MonthlyEmployeeTotals {
                    daily_avg: average(totals.total_amount, days_in_month),
                    totals,
                })
                .collect(),
        }
    }
}

impl YearlyReport {
    pub fn build(year: i32, range: DateRange, transactions: &[Transaction]) -> Self {
        let grouped = group_by_employee(transactions);
        let summary = summarize(&grouped);

        let mut monthly: BTreeMap<EmployeeId, BTreeMap<u32, PeriodTotals>> = BTreeMap::new();
        for transaction in transactions {
            let bucket = monthly
                .entry(transaction.employee_id)
                .or_default()
                .entry(transaction.date.month())
                .or_default();
            bucket.quantity += u64::from(transaction.quantity);
            bucket.total_amount += transaction.total_amount;
        }

        Self {
            year,
            start_date: range.start,
            end_date: range.end,
            summary,
            by_employee: grouped
                .into_iter()
                .map(|totals| YearlyEmployeeTotals {
                    monthly: monthly.remove(&totals.employee_id).unwrap_or_default(),
                    totals,
                })
                .collect(),
        }
    }
}

impl ManagementReport {
    /// `previous` holds the transactions of `range.preceding()` for the growth rate.
    pub fn build(range: DateRange, transactions: &[Transaction], previous: &[Transaction]) -> Self {
        let days = range.days();
        let total_transactions = transactions.len();
        let total_quantity: u64 =
            transactions.iter().map(|transaction| u64::from(transaction.quantity)).sum();
        let total_amount: Decimal =
            transactions.iter().map(|transaction| transaction.total_amount).sum();
        let previous_amount: Decimal =
            previous.iter().map(|transaction| transaction.total_amount).sum();

        let growth_rate = if previous_amount > Decimal::ZERO {
            ((total_amount - previous_amount) / previous_amount * Decimal::ONE_HUNDRED).round_dp(2)
        } else {
            Decimal::ZERO
        };

        let by_employee: Vec<ManagementEmployeeTotals> = group_by_employee(transactions)
            .into_iter()
            .map(|totals| ManagementEmployeeTotals {
                avg_per_transaction: average(
                    totals.total_amount,
                    i64::from(totals.transaction_count),
                ),
                totals,
            })
            .collect();

        let mut ranking = by_employee.clone();
        ranking.sort_by(|left, right| {
            right
                .totals
                .total_amount
                .cmp(&left.totals.total_amount)
                .then(left.totals.employee_id.cmp(&right.totals.employee_id))
        });

        let daily_stats = daily_totals(transactions);
        let trends = Trends {
            highest_day: extreme_day(&daily_stats, |candidate, best| candidate > best),
            lowest_day: extreme_day(&daily_stats, |candidate, best| candidate < best),
        };

        Self {
            period: Period { start_date: range.start, end_date: range.end, days },
            summary: ManagementSummary {
                total_transactions,
                total_quantity,
                total_amount,
                avg_daily_amount: average(total_amount, days),
                avg_per_transaction: average(total_amount, total_transactions as i64),
                growth_rate,
            },
            by_employee,
            ranking,
            daily_stats,
            payment_methods: payment_breakdown(transactions),
            trends,
        }
    }
}

fn daily_totals(transactions: &[Transaction]) -> Vec<DayTotals> {
    let mut days: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();
    for transaction in transactions {
        let entry = days.entry(transaction.date).or_insert_with(|| DayTotals {
            date: transaction.date,
            quantity: 0,
            total_amount: Decimal::ZERO,
            transaction_count: 0,
        });
        entry.quantity += u64::from(transaction.quantity);
        entry.total_amount += transaction.total_amount;
        entry.transaction_count += 1;
    }
    days.into_values().collect()
}

/// First day (in date order) whose amount wins `better` against every other day.
fn extreme_day(
    days: &[DayTotals],
    better: impl Fn(Decimal, Decimal) -> bool,
) -> Option<NaiveDate> {
    let mut best: Option<&DayTotals> = None;
    for day in days {
        match best {
            Some(current) if !better(day.total_amount, current.total_amount) => {}
            _ => best = Some(day),
        }
    }
    best.map(|day| day.date)
}
