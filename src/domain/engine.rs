//! Equation evaluation engine.
//!
//! Evaluates a named equation for every member of a universe as of a date
//! by walking the equation graph:
//!
//! - `Market` / `Fundamental`: resolve the lookback dates, fetch one
//!   cross-section per date, aggregate across dates
//! - `Named`: resolve against the registry, guarded by the active resolution
//!   path (cycles) and the memo table (shared sub-equations)
//! - `BinaryOp`: evaluate both operands, combine elementwise
//!
//! Every calculation gets its own [`EvalContext`]; nothing mutable is shared
//! between calculations. Structural errors abort the whole calculation.

use crate::domain::aggregate::aggregate;
use crate::domain::calendar::Calendar;
use crate::domain::cross_section::CrossSection;
use crate::domain::equation::{Equation, FundamentalRef, MarketRef};
use crate::domain::error::PitcalcError;
use crate::domain::operator;
use crate::domain::registry::EquationRegistry;
use crate::domain::universe::{Universe, resolve_universe};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalStats {
    pub store_calls: usize,
    pub memo_hits: usize,
    pub series_cache_hits: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MemoTarget {
    Named(String),
    Leaf(Equation),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    target: MemoTarget,
    as_of: NaiveDate,
    universe: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Source {
    Market,
    Fundamental,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
    source: Source,
    item: String,
    dates: Vec<NaiveDate>,
}

/// State of one top-level calculation.
pub struct EvalContext<'r> {
    as_of: NaiveDate,
    universe: Universe,
    registry: &'r EquationRegistry,
    memo: HashMap<MemoKey, CrossSection>,
    series: HashMap<SeriesKey, Rc<Vec<CrossSection>>>,
    path: Vec<String>,
    stats: EvalStats,
}

impl<'r> EvalContext<'r> {
    pub fn new(universe: Universe, registry: &'r EquationRegistry) -> Self {
        Self {
            as_of: universe.as_of,
            universe,
            registry,
            memo: HashMap::new(),
            series: HashMap::new(),
            path: Vec::new(),
            stats: EvalStats::default(),
        }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn stats(&self) -> EvalStats {
        self.stats
    }

    /// Names currently being resolved, outermost first.
    pub fn resolution_path(&self) -> &[String] {
        &self.path
    }

    fn memo_key(&self, target: MemoTarget) -> MemoKey {
        MemoKey {
            target,
            as_of: self.as_of,
            universe: self.universe.name.clone(),
        }
    }
}

/// Result of one top-level calculation.
#[derive(Debug, Clone)]
pub struct Calculation {
    pub equation: String,
    pub universe: Universe,
    pub values: CrossSection,
    pub stats: EvalStats,
}

pub struct Engine<'a> {
    registry: &'a EquationRegistry,
    data_port: &'a dyn DataPort,
    calendar: &'a dyn Calendar,
}

impl<'a> Engine<'a> {
    pub fn new(
        registry: &'a EquationRegistry,
        data_port: &'a dyn DataPort,
        calendar: &'a dyn Calendar,
    ) -> Self {
        Self {
            registry,
            data_port,
            calendar,
        }
    }

    /// Values of `equation_name` for every member of `universe_name` as of
    /// `as_of`, keyed by security id.
    pub fn calculate(
        &self,
        equation_name: &str,
        universe_name: &str,
        as_of: NaiveDate,
    ) -> Result<CrossSection, PitcalcError> {
        self.run(equation_name, universe_name, as_of)
            .map(|calc| calc.values)
    }

    pub fn run(
        &self,
        equation_name: &str,
        universe_name: &str,
        as_of: NaiveDate,
    ) -> Result<Calculation, PitcalcError> {
        if !self.registry.contains(equation_name) {
            return Err(PitcalcError::UnknownEquation {
                name: equation_name.to_string(),
            });
        }

        let universe = resolve_universe(self.data_port, universe_name, as_of)?;
        let mut ctx = EvalContext::new(universe, self.registry);
        let values = self.resolve(equation_name, &mut ctx)?;

        tracing::debug!(
            equation = equation_name,
            universe = universe_name,
            %as_of,
            members = ctx.universe.count(),
            present = values.present_count(),
            store_calls = ctx.stats.store_calls,
            memo_hits = ctx.stats.memo_hits,
            "calculation complete"
        );

        Ok(Calculation {
            equation: equation_name.to_string(),
            stats: ctx.stats,
            universe: ctx.universe,
            values,
        })
    }

    pub fn evaluate(
        &self,
        node: &Equation,
        ctx: &mut EvalContext<'_>,
    ) -> Result<CrossSection, PitcalcError> {
        match node {
            Equation::Market(m) => self.memoized_leaf(node, ctx, |engine, ctx| {
                engine.evaluate_market(m, ctx)
            }),
            Equation::Fundamental(f) => self.memoized_leaf(node, ctx, |engine, ctx| {
                engine.evaluate_fundamental(f, ctx)
            }),
            Equation::Named(r) => self.resolve(&r.name, ctx),
            Equation::BinaryOp(op) => {
                let left = self.evaluate(&op.left, ctx)?;
                let right = self.evaluate(&op.right, ctx)?;
                Ok(operator::apply(op.operator, &left, &right, &ctx.universe))
            }
        }
    }

    fn resolve(&self, name: &str, ctx: &mut EvalContext<'_>) -> Result<CrossSection, PitcalcError> {
        if let Some(start) = ctx.path.iter().position(|n| n == name) {
            let mut cycle = ctx.path[start..].to_vec();
            cycle.push(name.to_string());
            return Err(PitcalcError::CyclicReference { path: cycle });
        }

        let key = ctx.memo_key(MemoTarget::Named(name.to_string()));
        if let Some(hit) = ctx.memo.get(&key) {
            ctx.stats.memo_hits += 1;
            tracing::debug!(equation = name, "memo hit");
            return Ok(hit.clone());
        }

        let registry = ctx.registry;
        let node = registry
            .get(name)
            .ok_or_else(|| PitcalcError::UnknownEquation {
                name: name.to_string(),
            })?;

        ctx.path.push(name.to_string());
        let result = self.evaluate(node, ctx);
        ctx.path.pop();
        let values = result?;

        ctx.memo.insert(key, values.clone());
        Ok(values)
    }

    fn memoized_leaf<F>(
        &self,
        node: &Equation,
        ctx: &mut EvalContext<'_>,
        compute: F,
    ) -> Result<CrossSection, PitcalcError>
    where
        F: FnOnce(&Self, &mut EvalContext<'_>) -> Result<CrossSection, PitcalcError>,
    {
        let key = ctx.memo_key(MemoTarget::Leaf(node.clone()));
        if let Some(hit) = ctx.memo.get(&key) {
            ctx.stats.memo_hits += 1;
            return Ok(hit.clone());
        }
        let values = compute(self, ctx)?;
        ctx.memo.insert(key, values.clone());
        Ok(values)
    }

    fn evaluate_market(
        &self,
        m: &MarketRef,
        ctx: &mut EvalContext<'_>,
    ) -> Result<CrossSection, PitcalcError> {
        m.validate()?;
        let dates = self.calendar.resolve(ctx.as_of, m.periods, m.freq)?;
        let series = self.fetch(ctx, Source::Market, &m.item, dates)?;
        aggregate(&series, m.agg.into(), &ctx.universe)
    }

    fn evaluate_fundamental(
        &self,
        f: &FundamentalRef,
        ctx: &mut EvalContext<'_>,
    ) -> Result<CrossSection, PitcalcError> {
        f.validate()?;
        let quarters = self.calendar.quarter_ends(ctx.as_of, f.quarters)?;
        let series = self.fetch(ctx, Source::Fundamental, &f.item, quarters)?;
        aggregate(&series, f.agg.into(), &ctx.universe)
    }

    /// Fetches one cross-section per date, re-keyed onto the universe.
    /// Identical windows are fetched once per calculation.
    fn fetch(
        &self,
        ctx: &mut EvalContext<'_>,
        source: Source,
        item: &str,
        dates: Vec<NaiveDate>,
    ) -> Result<Rc<Vec<CrossSection>>, PitcalcError> {
        if let Some(late) = dates.iter().find(|d| **d > ctx.as_of) {
            return Err(PitcalcError::invalid_range(format!(
                "lookback date {} is after as-of date {}",
                late, ctx.as_of
            )));
        }

        let key = SeriesKey {
            source,
            item: item.to_string(),
            dates,
        };
        if let Some(hit) = ctx.series.get(&key) {
            ctx.stats.series_cache_hits += 1;
            return Ok(Rc::clone(hit));
        }

        ctx.stats.store_calls += 1;
        let ids = ctx.universe.members();
        let raw = match source {
            Source::Market => self.data_port.market_lookup(item, &key.dates, ids)?,
            Source::Fundamental => {
                self.data_port
                    .fundamental_lookup(item, &key.dates, ctx.as_of, ids)?
            }
        };

        if raw.len() != key.dates.len() {
            return Err(PitcalcError::data_access(format!(
                "{:?} lookup for '{}' returned {} periods, expected {}",
                source,
                item,
                raw.len(),
                key.dates.len()
            )));
        }

        tracing::debug!(
            source = ?source,
            item,
            periods = key.dates.len(),
            "fetched series"
        );

        let series: Rc<Vec<CrossSection>> =
            Rc::new(raw.iter().map(|cs| cs.restrict(&ctx.universe)).collect());
        ctx.series.insert(key, Rc::clone(&series));
        Ok(series)
    }
}

/// One-shot calculation with a fresh engine.
pub fn calculate(
    equation_name: &str,
    universe_name: &str,
    as_of: NaiveDate,
    registry: &EquationRegistry,
    data_port: &dyn DataPort,
    calendar: &dyn Calendar,
) -> Result<CrossSection, PitcalcError> {
    Engine::new(registry, data_port, calendar).calculate(equation_name, universe_name, as_of)
}
