//! Named equation registry.
//!
//! The registry is built once and then only read. `Named` nodes are resolved
//! against it at evaluation time; [`EquationRegistry::validate`] checks the
//! whole reference graph up front so structural mistakes can be reported
//! before any data is fetched.

use crate::domain::calendar::Frequency;
use crate::domain::equation::{Equation, FundamentalAgg, MarketAgg};
use crate::domain::error::PitcalcError;
use crate::domain::operator::Operator;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct EquationRegistry {
    equations: BTreeMap<String, Equation>,
}

impl EquationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The reference equation set: market cap, trailing earnings,
    /// earnings yield and position in the 52-week range.
    pub fn standard() -> Self {
        let min_52w = || Equation::market_window("close", 52, Frequency::Weeks, MarketAgg::Min);
        let max_52w = || Equation::market_window("close", 52, Frequency::Weeks, MarketAgg::Max);

        Self::new()
            .with(
                "marketcap",
                Equation::op(
                    Operator::Mul,
                    Equation::market("close"),
                    Equation::market("shares"),
                ),
            )
            .with(
                "earnings",
                Equation::fundamental("net_income", 4, FundamentalAgg::Sum),
            )
            .with(
                "e2p",
                Equation::op(
                    Operator::Div,
                    Equation::named("earnings"),
                    Equation::named("marketcap"),
                ),
            )
            .with(
                "range_52w",
                Equation::op(
                    Operator::Div,
                    Equation::op(Operator::Sub, Equation::market("close"), min_52w()),
                    Equation::op(Operator::Sub, max_52w(), min_52w()),
                ),
            )
    }

    pub fn with(mut self, name: impl Into<String>, equation: Equation) -> Self {
        self.insert(name, equation);
        self
    }

    /// Adds or replaces an equation, returning the previous one.
    pub fn insert(&mut self, name: impl Into<String>, equation: Equation) -> Option<Equation> {
        self.equations.insert(name.into(), equation)
    }

    pub fn get(&self, name: &str) -> Option<&Equation> {
        self.equations.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.equations.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.equations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.equations.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Equation)> {
        self.equations.iter()
    }

    /// Distinct names the equation `name` references directly.
    pub fn dependencies(&self, name: &str) -> Result<BTreeSet<&str>, PitcalcError> {
        let eq = self.lookup(name)?;
        Ok(eq.references().into_iter().collect())
    }

    fn lookup(&self, name: &str) -> Result<&Equation, PitcalcError> {
        self.get(name).ok_or_else(|| PitcalcError::UnknownEquation {
            name: name.to_string(),
        })
    }

    /// Checks every equation: leaf ranges, dangling references and cycles.
    pub fn validate(&self) -> Result<(), PitcalcError> {
        let mut state: HashMap<&str, Mark> = HashMap::new();
        let mut path: Vec<&str> = Vec::new();
        for name in self.equations.keys() {
            self.visit(name, &mut state, &mut path)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        state: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), PitcalcError> {
        match state.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => return Err(cycle_error(path, name)),
            None => {}
        }

        let eq = self.lookup(name)?;
        eq.validate_leaves()?;

        state.insert(name, Mark::InProgress);
        path.push(name);
        for dep in eq.references() {
            self.visit(dep, state, path)?;
        }
        path.pop();
        state.insert(name, Mark::Done);
        Ok(())
    }

    /// Equation names ordered so that every name comes after the names it
    /// references (Kahn's algorithm over the reference graph).
    pub fn evaluation_order(&self) -> Result<Vec<&str>, PitcalcError> {
        self.validate()?;

        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (name, eq) in &self.equations {
            let deps: HashSet<&str> = eq.references().into_iter().collect();
            in_degree.insert(name.as_str(), deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(name.as_str());
            }
        }

        let mut queue: VecDeque<&str> = self
            .equations
            .keys()
            .map(String::as_str)
            .filter(|n| in_degree.get(n) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(self.equations.len());

        while let Some(name) = queue.pop_front() {
            order.push(name);
            let mut ready = Vec::new();
            for &child in dependents.get(name).map(Vec::as_slice).unwrap_or_default() {
                if let Some(deg) = in_degree.get_mut(child) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(child);
                    }
                }
            }
            ready.sort_unstable();
            queue.extend(ready);
        }

        if order.len() != self.equations.len() {
            return Err(PitcalcError::CyclicReference {
                path: self
                    .equations
                    .keys()
                    .filter(|n| !order.contains(&n.as_str()))
                    .cloned()
                    .collect(),
            });
        }
        Ok(order)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

fn cycle_error(path: &[&str], repeated: &str) -> PitcalcError {
    let start = path.iter().position(|n| *n == repeated).unwrap_or(0);
    let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
    cycle.push(repeated.to_string());
    PitcalcError::CyclicReference { path: cycle }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum NameListError {
    #[error("empty token in equation list")]
    EmptyToken,

    #[error("duplicate equation: {0}")]
    Duplicate(String),
}

/// Parses a comma separated list of equation names, keeping order.
pub fn parse_equation_names(input: &str) -> Result<Vec<String>, NameListError> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let name = token.trim();
        if name.is_empty() {
            return Err(NameListError::EmptyToken);
        }
        if !seen.insert(name.to_string()) {
            return Err(NameListError::Duplicate(name.to_string()));
        }
        names.push(name.to_string());
    }

    Ok(names)
}
