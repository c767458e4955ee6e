use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Inclusive calendar range `[start, end]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// `None` when `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn single_day(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    /// ISO-8601 week: Monday start, week 1 holds the year's first Thursday.
    pub fn iso_week(year: i32, week: u32) -> Option<Self> {
        let start = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
        let end = NaiveDate::from_isoywd_opt(year, week, Weekday::Sun)?;
        Some(Self { start, end })
    }

    pub fn month(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next_month_start = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self { start, end: next_month_start.pred_opt()? })
    }

    pub fn year(year: i32) -> Option<Self> {
        Some(Self {
            start: NaiveDate::from_ymd_opt(year, 1, 1)?,
            end: NaiveDate::from_ymd_opt(year, 12, 31)?,
        })
    }

    /// `today` and the `days` days before it.
    pub fn trailing(today: NaiveDate, days: i64) -> Self {
        Self { start: today - Duration::days(days), end: today }
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// The period of equal length ending the day before `start`.
    pub fn preceding(&self) -> Self {
        let end = self.start - Duration::days(1);
        Self { start: end - (self.end - self.start), end }
    }
}

/// ISO year and week number `today` falls in.
pub fn current_iso_week(today: NaiveDate) -> (i32, u32) {
    let week = today.iso_week();
    (week.year(), week.week())
}
