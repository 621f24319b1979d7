//! Equation AST.
//!
//! An equation is one of four node kinds:
//! - `Market`: a market-table item over a weekly or monthly lookback
//! - `Fundamental`: a fundamental-table item over a quarterly lookback
//! - `Named`: a late-bound pointer to another equation in the registry
//! - `BinaryOp`: arithmetic combining two sub-equations
//!
//! Market windows aggregate with `min`/`max`, fundamental windows with
//! `sum`.

use crate::domain::aggregate::Aggregation;
use crate::domain::calendar::Frequency;
use crate::domain::error::PitcalcError;
use crate::domain::operator::Operator;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MarketAgg {
    #[default]
    None,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FundamentalAgg {
    #[default]
    None,
    Sum,
}

impl From<MarketAgg> for Aggregation {
    fn from(agg: MarketAgg) -> Self {
        match agg {
            MarketAgg::None => Aggregation::None,
            MarketAgg::Min => Aggregation::Min,
            MarketAgg::Max => Aggregation::Max,
        }
    }
}

impl From<FundamentalAgg> for Aggregation {
    fn from(agg: FundamentalAgg) -> Self {
        match agg {
            FundamentalAgg::None => Aggregation::None,
            FundamentalAgg::Sum => Aggregation::Sum,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarketRef {
    pub item: String,
    pub periods: usize,
    pub freq: Frequency,
    pub agg: MarketAgg,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FundamentalRef {
    pub item: String,
    pub quarters: usize,
    pub agg: FundamentalAgg,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryOp {
    pub operator: Operator,
    pub left: Box<Equation>,
    pub right: Box<Equation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Equation {
    Market(MarketRef),
    Fundamental(FundamentalRef),
    Named(NamedRef),
    BinaryOp(BinaryOp),
}

impl MarketRef {
    pub fn validate(&self) -> Result<(), PitcalcError> {
        validate_window(&self.item, self.periods, Aggregation::from(self.agg))
    }
}

impl FundamentalRef {
    pub fn validate(&self) -> Result<(), PitcalcError> {
        validate_window(&self.item, self.quarters, Aggregation::from(self.agg))
    }
}

/// A window of one point takes no aggregation; a longer window needs one.
fn validate_window(item: &str, count: usize, agg: Aggregation) -> Result<(), PitcalcError> {
    if item.trim().is_empty() {
        return Err(PitcalcError::invalid_range("item name must not be empty"));
    }
    if count < 1 {
        return Err(PitcalcError::invalid_range(format!(
            "{}: lookback must cover at least 1 period",
            item
        )));
    }
    match (count, agg) {
        (1, Aggregation::None) => Ok(()),
        (1, agg) => Err(PitcalcError::invalid_range(format!(
            "{}: aggregation '{}' requested over a single period",
            item, agg
        ))),
        (n, Aggregation::None) => Err(PitcalcError::invalid_range(format!(
            "{}: {} periods need an aggregation",
            item, n
        ))),
        _ => Ok(()),
    }
}

impl Equation {
    /// A single-period market item at the latest month end.
    pub fn market(item: impl Into<String>) -> Self {
        Equation::Market(MarketRef {
            item: item.into(),
            periods: 1,
            freq: Frequency::Months,
            agg: MarketAgg::None,
        })
    }

    pub fn market_window(
        item: impl Into<String>,
        periods: usize,
        freq: Frequency,
        agg: MarketAgg,
    ) -> Self {
        Equation::Market(MarketRef {
            item: item.into(),
            periods,
            freq,
            agg,
        })
    }

    pub fn fundamental(item: impl Into<String>, quarters: usize, agg: FundamentalAgg) -> Self {
        Equation::Fundamental(FundamentalRef {
            item: item.into(),
            quarters,
            agg,
        })
    }

    pub fn named(name: impl Into<String>) -> Self {
        Equation::Named(NamedRef { name: name.into() })
    }

    pub fn op(operator: Operator, left: Equation, right: Equation) -> Self {
        Equation::BinaryOp(BinaryOp {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Equation::Market(_) | Equation::Fundamental(_))
    }

    /// Names referenced anywhere below this node, in visiting order, with
    /// duplicates kept.
    pub fn references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_references(self, &mut names);
        names
    }

    /// Checks every leaf range below this node. Does not follow references.
    pub fn validate_leaves(&self) -> Result<(), PitcalcError> {
        match self {
            Equation::Market(m) => m.validate(),
            Equation::Fundamental(f) => f.validate(),
            Equation::Named(_) => Ok(()),
            Equation::BinaryOp(op) => {
                op.left.validate_leaves()?;
                op.right.validate_leaves()
            }
        }
    }
}

fn collect_references<'a>(eq: &'a Equation, names: &mut Vec<&'a str>) {
    match eq {
        Equation::Market(_) | Equation::Fundamental(_) => {}
        Equation::Named(r) => names.push(&r.name),
        Equation::BinaryOp(op) => {
            collect_references(&op.left, names);
            collect_references(&op.right, names);
        }
    }
}

impl fmt::Display for MarketAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Aggregation::from(*self).fmt(f)
    }
}

impl fmt::Display for FundamentalAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Aggregation::from(*self).fmt(f)
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Equation::Market(m) if m.periods == 1 => write!(f, "market({})", m.item),
            Equation::Market(m) => {
                write!(f, "market({}, {} {}, {})", m.item, m.periods, m.freq, m.agg)
            }
            Equation::Fundamental(fr) if fr.quarters == 1 => {
                write!(f, "fundamental({})", fr.item)
            }
            Equation::Fundamental(fr) => {
                write!(f, "fundamental({}, {} quarters, {})", fr.item, fr.quarters, fr.agg)
            }
            Equation::Named(r) => write!(f, "ref({})", r.name),
            Equation::BinaryOp(op) => write!(f, "({} {} {})", op.left, op.operator, op.right),
        }
    }
}
