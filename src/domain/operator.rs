//! Elementwise binary arithmetic over cross-sections.
//!
//! The result is keyed by the universe. A security missing on either side is
//! missing in the result, and division by exactly zero is missing rather
//! than infinite.

use crate::domain::cross_section::CrossSection;
use crate::domain::error::PitcalcError;
use crate::domain::universe::Universe;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    /// Applies the operator to two present values.
    pub fn eval(self, lhs: f64, rhs: f64) -> Option<f64> {
        match self {
            Operator::Add => Some(lhs + rhs),
            Operator::Sub => Some(lhs - rhs),
            Operator::Mul => Some(lhs * rhs),
            Operator::Div => {
                if rhs == 0.0 {
                    None
                } else {
                    Some(lhs / rhs)
                }
            }
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        };
        write!(f, "{}", symbol)
    }
}

impl FromStr for Operator {
    type Err = PitcalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "+" => Ok(Operator::Add),
            "-" => Ok(Operator::Sub),
            "*" => Ok(Operator::Mul),
            "/" => Ok(Operator::Div),
            other => Err(PitcalcError::invalid_range(format!(
                "unsupported operator '{}'",
                other
            ))),
        }
    }
}

pub fn apply(
    op: Operator,
    left: &CrossSection,
    right: &CrossSection,
    universe: &Universe,
) -> CrossSection {
    CrossSection::from_universe(universe, |id| match (left.get(id), right.get(id)) {
        (Some(l), Some(r)) => op.eval(l, r),
        _ => None,
    })
}
