use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::EmployeeId;

pub const MAX_QUANTITY: u32 = 1_000_000;
pub const MAX_TOTAL_AMOUNT: i64 = 100_000_000;
pub const MAX_TEXT_PARAM_CHARS: usize = 200;

const STRIPPED_SEQUENCES: &[&str] = &["--", "/*", "*/", "'", "\"", ";", "<", ">", "&", "|"];

/// Typed, validated parameters pulled from one message.
///
/// Every populated field has passed the matching check in [`validate`]; values that fail
/// are left as `None` rather than replaced with a default.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<EmployeeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_details: Option<String>,
}

impl ParameterSet {
    /// Names of the fields `create_transaction` needs that are still absent.
    pub fn missing_for_create(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.date.is_none() {
            missing.push("date");
        }
        if self.employee_id.is_none() {
            missing.push("employee_id");
        }
        if self.quantity.is_none() {
            missing.push("quantity");
        }
        if self.total_amount.is_none() {
            missing.push("total_amount");
        }
        missing
    }
}

/// Per-type checks. Each returns `None` for a value that must be dropped.
pub mod validate {
    use super::*;

    pub fn date(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        let bytes = raw.as_bytes();
        let shaped = bytes.len() == 10
            && bytes[4] == b'-'
            && bytes[7] == b'-'
            && bytes.iter().enumerate().all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
        if !shaped {
            return None;
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    }

    pub fn year(value: i64) -> Option<i32> {
        (1900..=9999).contains(&value).then_some(value as i32)
    }

    pub fn week(value: i64) -> Option<u32> {
        (1..=53).contains(&value).then_some(value as u32)
    }

    pub fn month(value: i64) -> Option<u32> {
        (1..=12).contains(&value).then_some(value as u32)
    }

    /// Integral quantity in `0..=1_000_000`. Fractional input is rejected, not truncated.
    pub fn quantity(raw: &str) -> Option<u32> {
        let value = Decimal::from_str(raw.trim()).ok()?;
        if !value.fract().is_zero() || value.is_sign_negative() {
            return None;
        }
        let whole = value.to_u32()?;
        (whole <= MAX_QUANTITY).then_some(whole)
    }

    pub fn total_amount(raw: &str) -> Option<Decimal> {
        let value = Decimal::from_str(raw.trim()).ok()?;
        if value.is_sign_negative() || value > Decimal::from(MAX_TOTAL_AMOUNT) {
            return None;
        }
        Some(value.normalize())
    }

    pub fn employee_id(value: i64) -> Option<EmployeeId> {
        (value >= 1).then_some(EmployeeId(value))
    }

    /// Structured free-text parameter: strips quoting and statement metacharacters,
    /// bounds to 200 characters, drops empty results.
    pub fn text(raw: &str) -> Option<String> {
        let mut cleaned = raw.to_string();
        for sequence in STRIPPED_SEQUENCES {
            cleaned = cleaned.replace(sequence, "");
        }
        let bounded: String = cleaned.trim().chars().take(MAX_TEXT_PARAM_CHARS).collect();
        let bounded = bounded.trim().to_string();
        (!bounded.is_empty()).then_some(bounded)
    }
}
