//! Cross-period aggregation.
//!
//! Collapses one cross-section per period into a single cross-section.
//! Missing entries are skipped; a security with no present entry stays
//! missing, so an empty `sum` is never mistaken for zero.

use crate::domain::cross_section::CrossSection;
use crate::domain::error::PitcalcError;
use crate::domain::universe::Universe;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregation {
    None,
    Min,
    Max,
    Sum,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::None => write!(f, "none"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Sum => write!(f, "sum"),
        }
    }
}

impl Aggregation {
    /// Folds the present values of one security; `None` when nothing is present.
    pub fn fold<I>(self, values: I) -> Option<f64>
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let mut present = values.into_iter().flatten();
        let first = present.next()?;
        Some(match self {
            Aggregation::None => first,
            Aggregation::Min => present.fold(first, f64::min),
            Aggregation::Max => present.fold(first, f64::max),
            Aggregation::Sum => present.fold(first, |acc, v| acc + v),
        })
    }
}

pub fn aggregate(
    series: &[CrossSection],
    policy: Aggregation,
    universe: &Universe,
) -> Result<CrossSection, PitcalcError> {
    if series.is_empty() {
        return Err(PitcalcError::invalid_range("cannot aggregate an empty series"));
    }

    if policy == Aggregation::None {
        if series.len() != 1 {
            return Err(PitcalcError::invalid_range(format!(
                "aggregation 'none' needs exactly one period, got {}",
                series.len()
            )));
        }
        return Ok(series[0].restrict(universe));
    }

    Ok(CrossSection::from_universe(universe, |id| {
        policy.fold(series.iter().map(|cs| cs.get(id)))
    }))
}
