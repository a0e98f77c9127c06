//! Pay periods and worked hours.
//!
//! Pay periods are fixed-length runs of whole weeks. Their end dates are
//! `anchor_end + k * weeks * 7` days for every integer `k`, so a Friday anchor
//! gives Friday period ends.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, TimeDelta, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::money::round_money;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayPeriodRule {
    pub weeks: u32,
    pub anchor_end: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PayPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

impl PayPeriodRule {
    pub fn new(weeks: u32, anchor_end: NaiveDate) -> Result<Self, CoreError> {
        if weeks == 0 {
            return Err(CoreError::InvalidPayPeriod);
        }
        Ok(Self { weeks, anchor_end })
    }

    fn len_days(&self) -> i64 {
        i64::from(self.weeks) * 7
    }

    /// The period whose range includes `date`.
    pub fn period_containing(&self, date: NaiveDate) -> PayPeriod {
        let len = self.len_days();
        let offset = (date - self.anchor_end).num_days();
        let k = (offset + len - 1).div_euclid(len);
        let end = self.anchor_end + TimeDelta::days(k * len);
        PayPeriod {
            start: end - TimeDelta::days(len - 1),
            end,
        }
    }

    /// The most recent period that ended strictly before `today`.
    pub fn last_completed(&self, today: NaiveDate) -> PayPeriod {
        let current = self.period_containing(today);
        if current.end < today {
            return current;
        }
        self.period_containing(current.start - TimeDelta::days(1))
    }
}

/// Most recent `weekday` strictly before `date` (`strtotime("last friday")`).
pub fn last_weekday_before(date: NaiveDate, weekday: Weekday) -> NaiveDate {
    let back = (date.weekday().num_days_from_monday() + 7 - weekday.num_days_from_monday()) % 7;
    let back = if back == 0 { 7 } else { back };
    date - Days::new(u64::from(back))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftRecord {
    pub clock_in: NaiveDateTime,
    pub clock_out: Option<NaiveDateTime>,
    pub breaks: Vec<BreakInterval>,
}

/// Shift length minus the part of each break that falls inside the shift.
pub fn worked_duration(
    clock_in: NaiveDateTime,
    clock_out: NaiveDateTime,
    breaks: &[BreakInterval],
) -> TimeDelta {
    if clock_out <= clock_in {
        return TimeDelta::zero();
    }
    let mut worked = clock_out - clock_in;
    for b in breaks {
        let start = b.start.max(clock_in);
        let end = b.end.min(clock_out);
        if end > start {
            worked -= end - start;
        }
    }
    worked.max(TimeDelta::zero())
}

/// Hours as a 2-place decimal.
pub fn hours(delta: TimeDelta) -> Decimal {
    round_money(Decimal::from(delta.num_seconds()) / Decimal::from(3600))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayHours {
    pub date: NaiveDate,
    pub hours: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timesheet {
    pub period: PayPeriod,
    pub days: Vec<DayHours>,
    pub total_hours: Decimal,
    pub regular_hours: Decimal,
    pub overtime_hours: Decimal,
    /// Entries still clocked in; not counted.
    pub open_entries: u32,
}

impl Timesheet {
    /// Attribute each closed shift to the day it started on, then split each
    /// 7-day week of the period into regular and overtime hours.
    pub fn build(period: PayPeriod, shifts: &[ShiftRecord], overtime_threshold_hours: u32) -> Self {
        let day_count = period.days().count();
        let mut per_day = vec![TimeDelta::zero(); day_count];
        let mut open_entries = 0;

        for shift in shifts {
            let day = shift.clock_in.date();
            if !period.contains(day) {
                continue;
            }
            let Some(clock_out) = shift.clock_out else {
                open_entries += 1;
                continue;
            };
            let idx = (day - period.start).num_days() as usize;
            per_day[idx] += worked_duration(shift.clock_in, clock_out, &shift.breaks);
        }

        let threshold = TimeDelta::hours(i64::from(overtime_threshold_hours));
        let mut total = TimeDelta::zero();
        let mut overtime = TimeDelta::zero();
        for week in per_day.chunks(7) {
            let week_total = week.iter().fold(TimeDelta::zero(), |acc, d| acc + *d);
            total += week_total;
            if week_total > threshold {
                overtime += week_total - threshold;
            }
        }

        let days = period
            .days()
            .zip(per_day.iter())
            .map(|(date, worked)| DayHours {
                date,
                hours: hours(*worked),
            })
            .collect();

        Self {
            period,
            days,
            total_hours: hours(total),
            regular_hours: hours(total - overtime),
            overtime_hours: hours(overtime),
            open_entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn weekly() -> PayPeriodRule {
        // 2024-01-05 is a Friday.
        PayPeriodRule::new(1, date("2024-01-05")).unwrap()
    }

    #[test]
    fn zero_week_rule_is_rejected() {
        assert_eq!(
            PayPeriodRule::new(0, date("2024-01-05")),
            Err(CoreError::InvalidPayPeriod)
        );
    }

    #[test]
    fn weekly_period_ends_on_friday() {
        let rule = weekly();
        let p = rule.period_containing(date("2024-03-13")); // Wednesday
        assert_eq!(p.start, date("2024-03-09"));
        assert_eq!(p.end, date("2024-03-15"));
        assert_eq!(p.end.weekday(), Weekday::Fri);

        let p = rule.period_containing(date("2024-03-15")); // the Friday itself
        assert_eq!(p.end, date("2024-03-15"));

        let p = rule.period_containing(date("2023-12-30")); // before the anchor
        assert_eq!(p.end, date("2024-01-05"));
        assert_eq!(p.start, date("2023-12-30"));
    }

    #[test]
    fn biweekly_periods_follow_anchor() {
        let rule = PayPeriodRule::new(2, date("2024-01-05")).unwrap();
        let p = rule.period_containing(date("2024-01-10"));
        assert_eq!(p.start, date("2024-01-06"));
        assert_eq!(p.end, date("2024-01-19"));
        assert_eq!(p.days().count(), 14);
    }

    #[test]
    fn last_completed_matches_last_friday() {
        let rule = weekly();
        // Saturday: the period that ended yesterday.
        let p = rule.last_completed(date("2024-03-16"));
        assert_eq!(p.end, date("2024-03-15"));
        // Friday: today's period is still open, use the previous one.
        let p = rule.last_completed(date("2024-03-15"));
        assert_eq!(p.end, date("2024-03-08"));
        assert_eq!(p.end, last_weekday_before(date("2024-03-15"), Weekday::Fri));
        assert_eq!(
            rule.last_completed(date("2024-03-16")).end,
            last_weekday_before(date("2024-03-16"), Weekday::Fri)
        );
    }

    #[test]
    fn breaks_are_clipped_to_the_shift() {
        let breaks = vec![
            BreakInterval { start: at("2024-03-11 12:00"), end: at("2024-03-11 12:30") },
            // Starts before clock-in: only 15 minutes count.
            BreakInterval { start: at("2024-03-11 07:45"), end: at("2024-03-11 08:15") },
            // Entirely outside the shift.
            BreakInterval { start: at("2024-03-11 18:00"), end: at("2024-03-11 19:00") },
        ];
        let worked = worked_duration(at("2024-03-11 08:00"), at("2024-03-11 17:00"), &breaks);
        assert_eq!(worked, TimeDelta::minutes(9 * 60 - 45));
        assert_eq!(hours(worked), d("8.25"));
    }

    #[test]
    fn inverted_shift_is_zero() {
        assert_eq!(
            worked_duration(at("2024-03-11 17:00"), at("2024-03-11 08:00"), &[]),
            TimeDelta::zero()
        );
    }

    #[test]
    fn timesheet_splits_overtime_per_week() {
        let rule = weekly();
        let period = rule.period_containing(date("2024-03-11"));
        let mut shifts: Vec<ShiftRecord> = (0..5)
            .map(|i| {
                let day = date("2024-03-11") + TimeDelta::days(i);
                ShiftRecord {
                    clock_in: day.and_hms_opt(8, 0, 0).unwrap(),
                    clock_out: Some(day.and_hms_opt(18, 0, 0).unwrap()),
                    breaks: vec![],
                }
            })
            .collect();
        shifts.push(ShiftRecord {
            clock_in: at("2024-03-15 19:00"),
            clock_out: None,
            breaks: vec![],
        });
        // Outside the period.
        shifts.push(ShiftRecord {
            clock_in: at("2024-03-20 08:00"),
            clock_out: Some(at("2024-03-20 12:00")),
            breaks: vec![],
        });

        let sheet = Timesheet::build(period, &shifts, 40);
        assert_eq!(sheet.days.len(), 7);
        assert_eq!(sheet.total_hours, d("50"));
        assert_eq!(sheet.regular_hours, d("40"));
        assert_eq!(sheet.overtime_hours, d("10"));
        assert_eq!(sheet.open_entries, 1);
        assert_eq!(sheet.days[2].date, date("2024-03-11"));
        assert_eq!(sheet.days[2].hours, d("10"));
    }
}
