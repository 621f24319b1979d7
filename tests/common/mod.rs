#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use pitcalc::domain::cross_section::{CrossSection, SecurityId};
use pitcalc::domain::error::PitcalcError;
use pitcalc::domain::point_in_time::{
    as_of_value, reported_value, FundamentalReport, MarketObservation, Membership,
    DEFAULT_MAX_STALENESS_DAYS,
};
use pitcalc::ports::data_port::DataPort;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};

/// In-memory store with call counters and injectable per-item errors.
pub struct MockDataPort {
    pub members: HashMap<String, Vec<SecurityId>>,
    pub market: HashMap<(String, SecurityId), Vec<(NaiveDate, Option<f64>)>>,
    pub fundamentals: Vec<FundamentalReport>,
    pub errors: HashMap<String, String>,
    pub universe_calls: Cell<usize>,
    pub market_calls: Cell<usize>,
    pub fundamental_calls: Cell<usize>,
    /// Every `(item, dates)` the engine asked for, in call order.
    pub requested: RefCell<Vec<(String, Vec<NaiveDate>)>>,
    /// Every as-of date passed to `fundamental_lookup`.
    pub fundamental_as_of: RefCell<Vec<NaiveDate>>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            members: HashMap::new(),
            market: HashMap::new(),
            fundamentals: Vec::new(),
            errors: HashMap::new(),
            universe_calls: Cell::new(0),
            market_calls: Cell::new(0),
            fundamental_calls: Cell::new(0),
            requested: RefCell::new(Vec::new()),
            fundamental_as_of: RefCell::new(Vec::new()),
        }
    }

    pub fn with_members(mut self, universe: &str, ids: &[&str]) -> Self {
        self.members.insert(
            universe.to_string(),
            ids.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn with_market(self, item: &str, id: &str, date: NaiveDate, value: f64) -> Self {
        self.with_market_value(item, id, date, Some(value))
    }

    pub fn with_market_value(
        mut self,
        item: &str,
        id: &str,
        date: NaiveDate,
        value: Option<f64>,
    ) -> Self {
        let series = self
            .market
            .entry((item.to_string(), id.to_string()))
            .or_default();
        series.push((date, value));
        series.sort_by_key(|(d, _)| *d);
        self
    }

    /// Weekly observations, oldest first, the last one on `last`.
    pub fn with_weekly(mut self, item: &str, id: &str, last: NaiveDate, values: &[f64]) -> Self {
        let n = values.len() as u64;
        for (i, v) in values.iter().enumerate() {
            let d = last - Days::new((n - 1 - i as u64) * 7);
            self = self.with_market(item, id, d, *v);
        }
        self
    }

    pub fn with_fundamental(
        mut self,
        item: &str,
        id: &str,
        period_end: NaiveDate,
        report_date: NaiveDate,
        value: f64,
    ) -> Self {
        self.fundamentals.push(FundamentalReport {
            security_id: id.to_string(),
            item: item.to_string(),
            period_end,
            report_date,
            value: Some(value),
        });
        self
    }

    pub fn with_error(mut self, item: &str, reason: &str) -> Self {
        self.errors.insert(item.to_string(), reason.to_string());
        self
    }

    pub fn store_calls(&self) -> usize {
        self.market_calls.get() + self.fundamental_calls.get()
    }

    fn check_error(&self, item: &str) -> Result<(), PitcalcError> {
        match self.errors.get(item) {
            Some(reason) => Err(PitcalcError::data_access(reason.clone())),
            None => Ok(()),
        }
    }
}

impl DataPort for MockDataPort {
    fn universe_members(
        &self,
        universe: &str,
        _as_of: NaiveDate,
    ) -> Result<Vec<SecurityId>, PitcalcError> {
        self.universe_calls.set(self.universe_calls.get() + 1);
        Ok(self.members.get(universe).cloned().unwrap_or_default())
    }

    fn market_lookup(
        &self,
        item: &str,
        dates: &[NaiveDate],
        ids: &BTreeSet<SecurityId>,
    ) -> Result<Vec<CrossSection>, PitcalcError> {
        self.market_calls.set(self.market_calls.get() + 1);
        self.requested
            .borrow_mut()
            .push((item.to_string(), dates.to_vec()));
        self.check_error(item)?;

        Ok(dates
            .iter()
            .map(|&date| {
                ids.iter()
                    .filter_map(|id| {
                        let series = self.market.get(&(item.to_string(), id.clone()))?;
                        Some((
                            id.clone(),
                            as_of_value(series, date, DEFAULT_MAX_STALENESS_DAYS),
                        ))
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
        self.fundamental_calls.set(self.fundamental_calls.get() + 1);
        self.requested
            .borrow_mut()
            .push((item.to_string(), quarters.to_vec()));
        self.fundamental_as_of.borrow_mut().push(as_of);
        self.check_error(item)?;

        Ok(quarters
            .iter()
            .map(|&quarter| {
                ids.iter()
                    .map(|id| {
                        let reports = self
                            .fundamentals
                            .iter()
                            .filter(|r| r.item == item && &r.security_id == id);
                        (id.clone(), reported_value(reports, quarter, as_of))
                    })
                    .collect()
            })
            .collect())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn as_of() -> NaiveDate {
    date(2019, 3, 31)
}

/// The four quarter ends up to 2019-03-31, oldest first.
pub fn quarters() -> [NaiveDate; 4] {
    [
        date(2018, 6, 30),
        date(2018, 9, 30),
        date(2018, 12, 31),
        date(2019, 3, 31),
    ]
}

/// Security X: close 10 on 2019-03-29, 100 shares, net income 1..4 over the
/// last four quarters (each reported on its quarter end).
pub fn scenario_x() -> MockDataPort {
    let mut port = MockDataPort::new()
        .with_members("Backtest", &["X"])
        .with_market("close", "X", date(2019, 3, 29), 10.0)
        .with_market("shares", "X", date(2019, 3, 29), 100.0);
    for (i, q) in quarters().iter().enumerate() {
        port = port.with_fundamental("net_income", "X", *q, *q, (i + 1) as f64);
    }
    port
}

pub fn scenario_records() -> (Vec<MarketObservation>, Vec<FundamentalReport>, Vec<Membership>) {
    let market = vec![
        MarketObservation {
            security_id: "X".into(),
            item: "close".into(),
            date: date(2019, 3, 29),
            value: Some(10.0),
        },
        MarketObservation {
            security_id: "X".into(),
            item: "shares".into(),
            date: date(2019, 3, 29),
            value: Some(100.0),
        },
        MarketObservation {
            security_id: "Y".into(),
            item: "close".into(),
            date: date(2019, 3, 29),
            value: Some(4.0),
        },
        MarketObservation {
            security_id: "Y".into(),
            item: "shares".into(),
            date: date(2019, 3, 29),
            value: None,
        },
    ];
    let fundamentals = quarters()
        .iter()
        .enumerate()
        .map(|(i, q)| FundamentalReport {
            security_id: "X".into(),
            item: "net_income".into(),
            period_end: *q,
            report_date: *q,
            value: Some((i + 1) as f64),
        })
        .collect();
    let memberships = ["X", "Y"]
        .iter()
        .map(|id| Membership {
            universe: "Backtest".into(),
            security_id: id.to_string(),
            start_date: date(2018, 1, 1),
            end_date: None,
        })
        .collect();
    (market, fundamentals, memberships)
}
