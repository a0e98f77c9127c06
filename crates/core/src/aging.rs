//! Accounts-receivable aging.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::round_money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgingBucket {
    #[serde(rename = "current")]
    Current,
    #[serde(rename = "1-30")]
    Days1To30,
    #[serde(rename = "31-60")]
    Days31To60,
    #[serde(rename = "61-90")]
    Days61To90,
    #[serde(rename = "over-90")]
    Over90,
}

impl AgingBucket {
    pub const ALL: [AgingBucket; 5] = [
        Self::Current,
        Self::Days1To30,
        Self::Days31To60,
        Self::Days61To90,
        Self::Over90,
    ];

    pub fn for_days_past_due(days: i64) -> Self {
        match days {
            i64::MIN..=0 => Self::Current,
            1..=30 => Self::Days1To30,
            31..=60 => Self::Days31To60,
            61..=90 => Self::Days61To90,
            _ => Self::Over90,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Days1To30 => "1-30",
            Self::Days31To60 => "31-60",
            Self::Days61To90 => "61-90",
            Self::Over90 => "over-90",
        }
    }
}

/// An open invoice as seen by the aging report.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenBalance {
    pub due_date: NaiveDate,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgingReport {
    pub current: Decimal,
    pub days_1_30: Decimal,
    pub days_31_60: Decimal,
    pub days_61_90: Decimal,
    pub over_90: Decimal,
    pub total: Decimal,
    pub invoice_count: u32,
}

impl AgingReport {
    /// Bucket every positive balance by days past its due date.
    pub fn build<'a>(today: NaiveDate, balances: impl IntoIterator<Item = &'a OpenBalance>) -> Self {
        let mut report = Self::default();
        for open in balances {
            if open.balance <= Decimal::ZERO {
                continue;
            }
            let days = (today - open.due_date).num_days();
            *report.bucket_mut(AgingBucket::for_days_past_due(days)) += open.balance;
            report.total += open.balance;
            report.invoice_count += 1;
        }
        for bucket in AgingBucket::ALL {
            let slot = report.bucket_mut(bucket);
            *slot = round_money(*slot);
        }
        report.total = round_money(report.total);
        report
    }

    pub fn bucket(&self, bucket: AgingBucket) -> Decimal {
        match bucket {
            AgingBucket::Current => self.current,
            AgingBucket::Days1To30 => self.days_1_30,
            AgingBucket::Days31To60 => self.days_31_60,
            AgingBucket::Days61To90 => self.days_61_90,
            AgingBucket::Over90 => self.over_90,
        }
    }

    fn bucket_mut(&mut self, bucket: AgingBucket) -> &mut Decimal {
        match bucket {
            AgingBucket::Current => &mut self.current,
            AgingBucket::Days1To30 => &mut self.days_1_30,
            AgingBucket::Days31To60 => &mut self.days_31_60,
            AgingBucket::Days61To90 => &mut self.days_61_90,
            AgingBucket::Over90 => &mut self.over_90,
        }
    }

    /// Sum of the five buckets; equals `total`.
    pub fn bucket_sum(&self) -> Decimal {
        AgingBucket::ALL.iter().map(|b| self.bucket(*b)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn bucket_edges() {
        assert_eq!(AgingBucket::for_days_past_due(-5), AgingBucket::Current);
        assert_eq!(AgingBucket::for_days_past_due(0), AgingBucket::Current);
        assert_eq!(AgingBucket::for_days_past_due(1), AgingBucket::Days1To30);
        assert_eq!(AgingBucket::for_days_past_due(30), AgingBucket::Days1To30);
        assert_eq!(AgingBucket::for_days_past_due(31), AgingBucket::Days31To60);
        assert_eq!(AgingBucket::for_days_past_due(60), AgingBucket::Days31To60);
        assert_eq!(AgingBucket::for_days_past_due(61), AgingBucket::Days61To90);
        assert_eq!(AgingBucket::for_days_past_due(90), AgingBucket::Days61To90);
        assert_eq!(AgingBucket::for_days_past_due(91), AgingBucket::Over90);
    }

    #[test]
    fn buckets_partition_the_total() {
        let today = date("2024-06-30");
        let open = vec![
            OpenBalance { due_date: date("2024-07-15"), balance: d("100.10") },
            OpenBalance { due_date: date("2024-06-30"), balance: d("0.01") },
            OpenBalance { due_date: date("2024-06-01"), balance: d("250.00") },
            OpenBalance { due_date: date("2024-05-15"), balance: d("75.55") },
            OpenBalance { due_date: date("2024-04-15"), balance: d("12.34") },
            OpenBalance { due_date: date("2023-12-31"), balance: d("999.99") },
        ];
        let report = AgingReport::build(today, &open);
        assert_eq!(report.current, d("100.11"));
        assert_eq!(report.days_1_30, d("250.00"));
        assert_eq!(report.days_31_60, d("75.55"));
        assert_eq!(report.days_61_90, d("12.34"));
        assert_eq!(report.over_90, d("999.99"));
        assert_eq!(report.total, d("1437.99"));
        assert_eq!(report.bucket_sum(), report.total);
        assert_eq!(report.invoice_count, 6);
    }

    #[test]
    fn settled_and_credit_balances_are_ignored() {
        let today = date("2024-06-30");
        let open = vec![
            OpenBalance { due_date: date("2024-01-01"), balance: Decimal::ZERO },
            OpenBalance { due_date: date("2024-01-01"), balance: d("-20") },
        ];
        let report = AgingReport::build(today, &open);
        assert_eq!(report, AgingReport::default());
    }

    #[test]
    fn bucket_labels_serialize() {
        let json = serde_json::to_string(&AgingBucket::Over90).unwrap();
        assert_eq!(json, "\"over-90\"");
    }
}
