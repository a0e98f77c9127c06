//! Recurring payment schedules.

use std::fmt;
use std::str::FromStr;

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Semiannually,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Semiannually => "semiannually",
            Self::Yearly => "yearly",
        }
    }

    /// Occurrences per year, used to normalize amounts to a monthly figure.
    pub fn per_year(&self) -> u32 {
        match self {
            Self::Weekly => 52,
            Self::Biweekly => 26,
            Self::Monthly => 12,
            Self::Quarterly => 4,
            Self::Semiannually => 2,
            Self::Yearly => 1,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let freq = match key.as_str() {
            "weekly" | "week" | "every1week" | "1week" => Self::Weekly,
            "biweekly" | "fortnightly" | "every2weeks" | "2weeks" => Self::Biweekly,
            "monthly" | "month" | "every1month" => Self::Monthly,
            "quarterly" | "quarter" | "every3months" | "3months" => Self::Quarterly,
            "semiannually" | "semiannual" | "biannual" | "every6months" | "6months" => {
                Self::Semiannually
            }
            "yearly" | "year" | "annually" | "annual" | "every12months" => Self::Yearly,
            _ => return Err(CoreError::UnknownFrequency(s.to_string())),
        };
        Ok(freq)
    }
}

/// Date of the `n`-th occurrence (0-based), computed from `start` so that
/// month-end clamping never drifts.
pub fn occurrence_date(start: NaiveDate, frequency: Frequency, n: u32) -> Option<NaiveDate> {
    match frequency {
        Frequency::Weekly => start.checked_add_days(Days::new(7 * u64::from(n))),
        Frequency::Biweekly => start.checked_add_days(Days::new(14 * u64::from(n))),
        Frequency::Monthly => start.checked_add_months(Months::new(n)),
        Frequency::Quarterly => start.checked_add_months(Months::new(3 * n)),
        Frequency::Semiannually => start.checked_add_months(Months::new(6 * n)),
        Frequency::Yearly => start.checked_add_months(Months::new(12 * n)),
    }
}

/// The schedule part of a recurring payment record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurringSchedule {
    pub start: NaiveDate,
    pub frequency: Frequency,
    /// Total number of occurrences; `None` runs until cancelled.
    pub limit: Option<u32>,
    pub completed: u32,
}

impl RecurringSchedule {
    pub fn is_complete(&self) -> bool {
        self.limit.is_some_and(|limit| self.completed >= limit)
    }

    pub fn remaining(&self) -> Option<u32> {
        self.limit.map(|limit| limit.saturating_sub(self.completed))
    }

    /// Date of the next unprocessed occurrence.
    pub fn next_date(&self) -> Option<NaiveDate> {
        if self.is_complete() {
            return None;
        }
        occurrence_date(self.start, self.frequency, self.completed)
    }

    /// Up to `count` upcoming dates, stopping at the occurrence limit.
    pub fn upcoming(&self, count: u32) -> Vec<NaiveDate> {
        let end = match self.remaining() {
            Some(remaining) => self.completed + remaining.min(count),
            None => self.completed.saturating_add(count),
        };
        (self.completed..end)
            .filter_map(|n| occurrence_date(self.start, self.frequency, n))
            .collect()
    }

    /// Mark the next occurrence as processed and return its date.
    pub fn advance(&mut self) -> Option<NaiveDate> {
        let date = self.next_date()?;
        self.completed += 1;
        Some(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn parses_aliases() {
        assert_eq!("Monthly".parse::<Frequency>().unwrap(), Frequency::Monthly);
        assert_eq!("bi-weekly".parse::<Frequency>().unwrap(), Frequency::Biweekly);
        assert_eq!("Every 2 weeks".parse::<Frequency>().unwrap(), Frequency::Biweekly);
        assert_eq!("semi-annual".parse::<Frequency>().unwrap(), Frequency::Semiannually);
        assert_eq!(" Annual ".parse::<Frequency>().unwrap(), Frequency::Yearly);
        assert!("daily".parse::<Frequency>().is_err());
    }

    #[test]
    fn month_end_clamps_without_drift() {
        let start = date("2024-01-31");
        assert_eq!(occurrence_date(start, Frequency::Monthly, 1), Some(date("2024-02-29")));
        assert_eq!(occurrence_date(start, Frequency::Monthly, 2), Some(date("2024-03-31")));
        assert_eq!(occurrence_date(start, Frequency::Quarterly, 1), Some(date("2024-04-30")));
        assert_eq!(occurrence_date(start, Frequency::Yearly, 1), Some(date("2025-01-31")));
    }

    #[test]
    fn weekly_steps() {
        let start = date("2024-03-01");
        assert_eq!(occurrence_date(start, Frequency::Weekly, 2), Some(date("2024-03-15")));
        assert_eq!(occurrence_date(start, Frequency::Biweekly, 2), Some(date("2024-03-29")));
    }

    #[test]
    fn upcoming_stops_at_limit() {
        let schedule = RecurringSchedule {
            start: date("2024-01-15"),
            frequency: Frequency::Monthly,
            limit: Some(3),
            completed: 1,
        };
        assert_eq!(schedule.remaining(), Some(2));
        assert_eq!(
            schedule.upcoming(12),
            vec![date("2024-02-15"), date("2024-03-15")]
        );
    }

    #[test]
    fn open_ended_schedule() {
        let schedule = RecurringSchedule {
            start: date("2024-01-15"),
            frequency: Frequency::Weekly,
            limit: None,
            completed: 0,
        };
        assert_eq!(schedule.remaining(), None);
        assert_eq!(schedule.upcoming(3).len(), 3);
        assert!(!schedule.is_complete());
    }

    #[test]
    fn advance_completes_at_limit() {
        let mut schedule = RecurringSchedule {
            start: date("2024-01-01"),
            frequency: Frequency::Quarterly,
            limit: Some(2),
            completed: 0,
        };
        assert_eq!(schedule.advance(), Some(date("2024-01-01")));
        assert_eq!(schedule.advance(), Some(date("2024-04-01")));
        assert!(schedule.is_complete());
        assert_eq!(schedule.next_date(), None);
        assert_eq!(schedule.advance(), None);
        assert_eq!(schedule.completed, 2);
    }
}
