//! Store records and the point-in-time rules shared by the data adapters.
//!
//! - Market: the value for date `d` is the latest observation dated on or
//!   before `d`, and no older than the staleness limit.
//! - Fundamental: the figure for quarter `q` as of `t` is the latest report
//!   for `q` whose report date is on or before `t`. Later restatements and
//!   quarters not yet reported are invisible.
//! - Universe: a membership row is active from `start_date` through
//!   `end_date` inclusive; an open end means still a member.

use crate::domain::cross_section::SecurityId;
use chrono::NaiveDate;

pub const DEFAULT_MAX_STALENESS_DAYS: u32 = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct MarketObservation {
    pub security_id: SecurityId,
    pub item: String,
    pub date: NaiveDate,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FundamentalReport {
    pub security_id: SecurityId,
    pub item: String,
    pub period_end: NaiveDate,
    pub report_date: NaiveDate,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub universe: String,
    pub security_id: SecurityId,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl Membership {
    pub fn is_active(&self, as_of: NaiveDate) -> bool {
        self.start_date <= as_of && self.end_date.is_none_or(|end| as_of <= end)
    }
}

/// Earliest observation date still visible for `date`.
pub fn staleness_floor(date: NaiveDate, max_staleness_days: u32) -> NaiveDate {
    date.checked_sub_days(chrono::Days::new(max_staleness_days as u64))
        .unwrap_or(NaiveDate::MIN)
}

/// As-of join over one security's observations sorted by ascending date.
pub fn as_of_value(
    observations: &[(NaiveDate, Option<f64>)],
    date: NaiveDate,
    max_staleness_days: u32,
) -> Option<f64> {
    let visible = observations.partition_point(|(d, _)| *d <= date);
    let (observed, value) = observations[..visible].last()?;
    if *observed < staleness_floor(date, max_staleness_days) {
        return None;
    }
    *value
}

/// Latest figure for `period_end` reported on or before `as_of`.
pub fn reported_value<'a, I>(reports: I, period_end: NaiveDate, as_of: NaiveDate) -> Option<f64>
where
    I: IntoIterator<Item = &'a FundamentalReport>,
{
    reports
        .into_iter()
        .filter(|r| r.period_end == period_end && r.report_date <= as_of)
        .max_by_key(|r| r.report_date)
        .and_then(|r| r.value)
}
