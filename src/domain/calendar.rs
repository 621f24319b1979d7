//! Lookback window resolution.
//!
//! Turns an end date and a count into the period-end dates of a lookback
//! window, newest first. The boundary rules live behind the [`Calendar`]
//! trait; [`WeekdayCalendar`] is the rule set used by default (Friday weeks,
//! calendar month ends, calendar quarter ends).

use crate::domain::error::PitcalcError;
use crate::ports::config_port::ConfigPort;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use std::fmt;
use std::str::FromStr;

/// Sampling frequency of a market lookback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Weeks,
    Months,
}

/// Any period a calendar knows the boundaries of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Week,
    Month,
    Quarter,
}

impl From<Frequency> for Period {
    fn from(freq: Frequency) -> Self {
        match freq {
            Frequency::Weeks => Period::Week,
            Frequency::Months => Period::Month,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Weeks => write!(f, "weeks"),
            Frequency::Months => write!(f, "months"),
        }
    }
}

impl FromStr for Frequency {
    type Err = PitcalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weeks" | "week" | "w" => Ok(Frequency::Weeks),
            "months" | "month" | "m" => Ok(Frequency::Months),
            other => Err(PitcalcError::invalid_range(format!(
                "unsupported frequency '{}' (expected weeks or months)",
                other
            ))),
        }
    }
}

pub trait Calendar {
    /// The latest boundary of `period` on or before `date`.
    fn latest_boundary(&self, date: NaiveDate, period: Period) -> Option<NaiveDate>;

    fn is_boundary(&self, date: NaiveDate, period: Period) -> bool {
        self.latest_boundary(date, period) == Some(date)
    }

    /// `count` boundaries of `period`, strictly decreasing, the first being
    /// the latest boundary on or before `end`.
    fn resolve_periods(
        &self,
        end: NaiveDate,
        count: usize,
        period: Period,
    ) -> Result<Vec<NaiveDate>, PitcalcError> {
        if count < 1 {
            return Err(PitcalcError::invalid_range(
                "lookback count must be at least 1",
            ));
        }

        let mut dates = Vec::with_capacity(count);
        let mut cursor = end;
        while dates.len() < count {
            let boundary = self.latest_boundary(cursor, period).ok_or_else(|| {
                PitcalcError::invalid_range(format!("no {:?} boundary on or before {}", period, cursor))
            })?;
            dates.push(boundary);
            if dates.len() < count {
                cursor = boundary.pred_opt().ok_or_else(|| {
                    PitcalcError::invalid_range(format!("date range exhausted before {}", boundary))
                })?;
            }
        }
        Ok(dates)
    }

    fn resolve(
        &self,
        end: NaiveDate,
        count: usize,
        freq: Frequency,
    ) -> Result<Vec<NaiveDate>, PitcalcError> {
        self.resolve_periods(end, count, freq.into())
    }

    fn quarter_ends(&self, end: NaiveDate, count: usize) -> Result<Vec<NaiveDate>, PitcalcError> {
        self.resolve_periods(end, count, Period::Quarter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonthEndRule {
    /// Last calendar day of the month.
    #[default]
    Calendar,
    /// Last Monday-to-Friday day of the month.
    Business,
}

impl FromStr for MonthEndRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "calendar" => Ok(MonthEndRule::Calendar),
            "business" => Ok(MonthEndRule::Business),
            other => Err(format!(
                "unknown month end rule '{}' (expected calendar or business)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekdayCalendar {
    pub week_anchor: Weekday,
    pub month_end: MonthEndRule,
}

impl Default for WeekdayCalendar {
    fn default() -> Self {
        Self {
            week_anchor: Weekday::Fri,
            month_end: MonthEndRule::Calendar,
        }
    }
}

impl WeekdayCalendar {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PitcalcError> {
        let mut calendar = Self::default();

        if let Some(anchor) = config.get_string("calendar", "week_anchor") {
            calendar.week_anchor =
                anchor
                    .trim()
                    .parse::<Weekday>()
                    .map_err(|_| PitcalcError::ConfigInvalid {
                        section: "calendar".into(),
                        key: "week_anchor".into(),
                        reason: format!("'{}' is not a weekday", anchor.trim()),
                    })?;
        }

        if let Some(rule) = config.get_string("calendar", "month_end") {
            calendar.month_end = rule
                .parse::<MonthEndRule>()
                .map_err(|reason| PitcalcError::ConfigInvalid {
                    section: "calendar".into(),
                    key: "month_end".into(),
                    reason,
                })?;
        }

        Ok(calendar)
    }

    fn latest_week_anchor(&self, date: NaiveDate) -> Option<NaiveDate> {
        let days_back = (date.weekday().num_days_from_monday() + 7
            - self.week_anchor.num_days_from_monday())
            % 7;
        date.checked_sub_days(Days::new(days_back as u64))
    }

    fn month_end_of(&self, year: i32, month: u32) -> Option<NaiveDate> {
        let last = last_day_of_month(year, month)?;
        match self.month_end {
            MonthEndRule::Calendar => Some(last),
            MonthEndRule::Business => {
                let back = match last.weekday() {
                    Weekday::Sat => 1,
                    Weekday::Sun => 2,
                    _ => 0,
                };
                last.checked_sub_days(Days::new(back))
            }
        }
    }

    fn latest_month_end(&self, date: NaiveDate) -> Option<NaiveDate> {
        let this_month = self.month_end_of(date.year(), date.month())?;
        if this_month <= date {
            return Some(this_month);
        }
        let prev = date.with_day(1)?.pred_opt()?;
        self.month_end_of(prev.year(), prev.month())
    }

    fn latest_quarter_end(&self, date: NaiveDate) -> Option<NaiveDate> {
        let quarter_month = date.month0() / 3 * 3 + 3;
        let this_quarter = last_day_of_month(date.year(), quarter_month)?;
        if this_quarter <= date {
            return Some(this_quarter);
        }
        NaiveDate::from_ymd_opt(date.year(), quarter_month - 2, 1)?.pred_opt()
    }
}

impl Calendar for WeekdayCalendar {
    fn latest_boundary(&self, date: NaiveDate, period: Period) -> Option<NaiveDate> {
        match period {
            Period::Week => self.latest_week_anchor(date),
            Period::Month => self.latest_month_end(date),
            Period::Quarter => self.latest_quarter_end(date),
        }
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    first_of_next.pred_opt()
}
