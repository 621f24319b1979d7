//! CSV directory data adapter.
//!
//! Loads three tables from a directory into memory:
//!
//! ```text
//! market.csv       security_id,item,date,value
//! fundamental.csv  security_id,item,period_end,report_date,value
//! universe.csv     name,security_id,start_date,end_date
//! ```
//!
//! Dates are `YYYY-MM-DD`; an empty `value` is missing and an empty
//! `end_date` is an open membership.

use crate::domain::config_validation::max_staleness_days;
use crate::domain::cross_section::{CrossSection, SecurityId};
use crate::domain::error::PitcalcError;
use crate::domain::point_in_time::{
    DEFAULT_MAX_STALENESS_DAYS, FundamentalReport, MarketObservation, Membership, as_of_value,
    reported_value,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

pub const MARKET_FILE: &str = "market.csv";
pub const FUNDAMENTAL_FILE: &str = "fundamental.csv";
pub const UNIVERSE_FILE: &str = "universe.csv";

type Series = Vec<(NaiveDate, Option<f64>)>;

pub struct CsvAdapter {
    market: HashMap<String, HashMap<SecurityId, Series>>,
    fundamental: HashMap<String, HashMap<SecurityId, Vec<FundamentalReport>>>,
    memberships: Vec<Membership>,
    max_staleness_days: u32,
}

impl CsvAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PitcalcError> {
        let dir = config
            .get_string("csv", "dir")
            .ok_or_else(|| PitcalcError::ConfigMissing {
                section: "csv".into(),
                key: "dir".into(),
            })?;
        let staleness = max_staleness_days(config)?;
        Ok(Self::load(PathBuf::from(dir))?.with_max_staleness_days(staleness))
    }

    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, PitcalcError> {
        let dir = dir.as_ref();
        let market = read_rows(&dir.join(MARKET_FILE), parse_market)?;
        let fundamentals = read_rows(&dir.join(FUNDAMENTAL_FILE), parse_fundamental)?;
        let memberships = read_rows(&dir.join(UNIVERSE_FILE), parse_membership)?;

        tracing::debug!(
            dir = %dir.display(),
            market = market.len(),
            fundamental = fundamentals.len(),
            universe = memberships.len(),
            "loaded csv store"
        );
        Ok(Self::from_records(market, fundamentals, memberships))
    }

    pub fn from_records(
        market: Vec<MarketObservation>,
        fundamentals: Vec<FundamentalReport>,
        memberships: Vec<Membership>,
    ) -> Self {
        let mut by_item: HashMap<String, HashMap<SecurityId, Series>> = HashMap::new();
        for obs in market {
            by_item
                .entry(obs.item)
                .or_default()
                .entry(obs.security_id)
                .or_default()
                .push((obs.date, obs.value));
        }
        for series in by_item.values_mut().flat_map(|m| m.values_mut()) {
            series.sort_by_key(|(d, _)| *d);
            // a later row for the same date replaces an earlier one
            series.reverse();
            series.dedup_by_key(|(d, _)| *d);
            series.reverse();
        }

        let mut reports: HashMap<String, HashMap<SecurityId, Vec<FundamentalReport>>> =
            HashMap::new();
        for report in fundamentals {
            reports
                .entry(report.item.clone())
                .or_default()
                .entry(report.security_id.clone())
                .or_default()
                .push(report);
        }

        Self {
            market: by_item,
            fundamental: reports,
            memberships,
            max_staleness_days: DEFAULT_MAX_STALENESS_DAYS,
        }
    }

    pub fn with_max_staleness_days(mut self, days: u32) -> Self {
        self.max_staleness_days = days;
        self
    }
}

impl DataPort for CsvAdapter {
    fn universe_members(
        &self,
        universe: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<SecurityId>, PitcalcError> {
        let members: BTreeSet<&SecurityId> = self
            .memberships
            .iter()
            .filter(|m| m.universe == universe && m.is_active(as_of))
            .map(|m| &m.security_id)
            .collect();
        Ok(members.into_iter().cloned().collect())
    }

    fn market_lookup(
        &self,
        item: &str,
        dates: &[NaiveDate],
        ids: &BTreeSet<SecurityId>,
    ) -> Result<Vec<CrossSection>, PitcalcError> {
        let by_security = self
            .market
            .get(item)
            .ok_or_else(|| PitcalcError::data_access(format!("unknown market item '{item}'")))?;

        Ok(dates
            .iter()
            .map(|&date| {
                ids.iter()
                    .filter_map(|id| {
                        let series = by_security.get(id)?;
                        Some((id.clone(), as_of_value(series, date, self.max_staleness_days)))
                    })
                    .collect()
            })
            .collect())
    }

    fn fundamental_lookup(
        &self,
        item: &str,
        quarters: &[NaiveDate],
        as_of: NaiveDate,
        ids: &BTreeSet<SecurityId>,
    ) -> Result<Vec<CrossSection>, PitcalcError> {
        let by_security = self.fundamental.get(item).ok_or_else(|| {
            PitcalcError::data_access(format!("unknown fundamental item '{item}'"))
        })?;

        Ok(quarters
            .iter()
            .map(|&quarter| {
                ids.iter()
                    .filter_map(|id| {
                        let reports = by_security.get(id)?;
                        Some((id.clone(), reported_value(reports, quarter, as_of)))
                    })
                    .collect()
            })
            .collect())
    }
}

fn read_rows<T>(
    path: &Path,
    parse: fn(&csv::StringRecord) -> Result<T, String>,
) -> Result<Vec<T>, PitcalcError> {
    let content = fs::read_to_string(path).map_err(|e| {
        PitcalcError::data_access(format!("failed to read {}: {}", path.display(), e))
    })?;

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let mut rows = Vec::new();

    for (index, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| {
            PitcalcError::data_access(format!("{}: CSV parse error: {}", path.display(), e))
        })?;
        let row = parse(&record).map_err(|reason| {
            // header is line 1
            PitcalcError::data_access(format!("{}:{}: {}", path.display(), index + 2, reason))
        })?;
        rows.push(row);
    }

    Ok(rows)
}

fn field<'r>(record: &'r csv::StringRecord, index: usize, name: &str) -> Result<&'r str, String> {
    record
        .get(index)
        .ok_or_else(|| format!("missing {name} column"))
}

fn text(record: &csv::StringRecord, index: usize, name: &str) -> Result<String, String> {
    let value = field(record, index, name)?;
    if value.is_empty() {
        return Err(format!("empty {name}"));
    }
    Ok(value.to_string())
}

fn date(record: &csv::StringRecord, index: usize, name: &str) -> Result<NaiveDate, String> {
    let value = field(record, index, name)?;
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| format!("invalid {name} '{value}': {e}"))
}

fn optional_date(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
) -> Result<Option<NaiveDate>, String> {
    match record.get(index) {
        None | Some("") => Ok(None),
        Some(_) => date(record, index, name).map(Some),
    }
}

fn value(record: &csv::StringRecord, index: usize) -> Result<Option<f64>, String> {
    match field(record, index, "value")? {
        "" => Ok(None),
        raw => raw
            .parse::<f64>()
            .map(|v| v.is_finite().then_some(v))
            .map_err(|e| format!("invalid value '{raw}': {e}")),
    }
}

fn parse_market(record: &csv::StringRecord) -> Result<MarketObservation, String> {
    Ok(MarketObservation {
        security_id: text(record, 0, "security_id")?,
        item: text(record, 1, "item")?,
        date: date(record, 2, "date")?,
        value: value(record, 3)?,
    })
}

fn parse_fundamental(record: &csv::StringRecord) -> Result<FundamentalReport, String> {
    Ok(FundamentalReport {
        security_id: text(record, 0, "security_id")?,
        item: text(record, 1, "item")?,
        period_end: date(record, 2, "period_end")?,
        report_date: date(record, 3, "report_date")?,
        value: value(record, 4)?,
    })
}

fn parse_membership(record: &csv::StringRecord) -> Result<Membership, String> {
    Ok(Membership {
        universe: text(record, 0, "name")?,
        security_id: text(record, 1, "security_id")?,
        start_date: date(record, 2, "start_date")?,
        end_date: optional_date(record, 3, "end_date")?,
    })
}
