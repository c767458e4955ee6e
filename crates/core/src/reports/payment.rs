use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Wechat,
    Alipay,
    Cash,
}

impl PaymentMethod {
    fn detect(segment: &str) -> Option<Self> {
        let lowered = segment.to_lowercase();
        if lowered.contains("微信") || lowered.contains("wechat") {
            Some(Self::Wechat)
        } else if lowered.contains("支付宝") || lowered.contains("alipay") {
            Some(Self::Alipay)
        } else if lowered.contains("现金") || lowered.contains("cash") {
            Some(Self::Cash)
        } else {
            None
        }
    }
}

pub type PaymentBreakdown = BTreeMap<PaymentMethod, Decimal>;

fn amount_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("static amount pattern"))
}

/// Sums payment methods found in amount detail text such as `微信80, 支付宝100，现金20`.
/// Segments without a recognised method or amount are ignored.
pub fn breakdown<'a>(details: impl IntoIterator<Item = &'a str>) -> PaymentBreakdown {
    let mut totals = PaymentBreakdown::new();
    for detail in details {
        for segment in detail.split([',', '，', ';', '；', '、']) {
            let Some(method) = PaymentMethod::detect(segment) else {
                continue;
            };
            let Some(amount) = amount_pattern()
                .find(segment)
                .and_then(|found| Decimal::from_str(found.as_str()).ok())
            else {
                continue;
            };
            *totals.entry(method).or_insert(Decimal::ZERO) += amount;
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{breakdown, PaymentMethod};

    #[test]
    fn sums_methods_across_transactions() {
        let totals = breakdown(["微信80, 支付宝100", "现金20，微信12.5", "备注: 无"]);
        assert_eq!(totals.get(&PaymentMethod::Wechat), Some(&Decimal::new(925, 1)));
        assert_eq!(totals.get(&PaymentMethod::Alipay), Some(&Decimal::new(100, 0)));
        assert_eq!(totals.get(&PaymentMethod::Cash), Some(&Decimal::new(20, 0)));
    }

    #[test]
    fn english_labels_and_missing_amounts() {
        let totals = breakdown(["WeChat 30; cash", ""]);
        assert_eq!(totals.get(&PaymentMethod::Wechat), Some(&Decimal::new(30, 0)));
        assert!(!totals.contains_key(&PaymentMethod::Cash));
    }
}
