//! Per-security values for a single date.
//!
//! A `CrossSection` maps security ids to a value or an explicit missing
//! marker. Alignment between operands is always by key, never by position.

use crate::domain::universe::Universe;
use std::collections::BTreeMap;

pub type SecurityId = String;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossSection {
    values: BTreeMap<SecurityId, Option<f64>>,
}

impl CrossSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cross-section defined over exactly the universe's members.
    pub fn from_universe<F>(universe: &Universe, mut value_of: F) -> Self
    where
        F: FnMut(&str) -> Option<f64>,
    {
        let mut cs = Self::new();
        for id in universe.ids() {
            let value = value_of(id);
            cs.insert(id.clone(), value);
        }
        cs
    }

    /// Inserts a value; non-finite numbers are stored as missing.
    pub fn insert(&mut self, id: impl Into<SecurityId>, value: Option<f64>) {
        self.values
            .insert(id.into(), value.filter(|v| v.is_finite()));
    }

    /// The value for `id`, or `None` when missing or not present at all.
    pub fn get(&self, id: &str) -> Option<f64> {
        self.values.get(id).copied().flatten()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    pub fn is_missing(&self, id: &str) -> bool {
        self.get(id).is_none()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of securities with a non-missing value.
    pub fn present_count(&self) -> usize {
        self.values.values().filter(|v| v.is_some()).count()
    }

    pub fn ids(&self) -> impl Iterator<Item = &SecurityId> {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SecurityId, Option<f64>)> {
        self.values.iter().map(|(id, v)| (id, *v))
    }

    /// Re-keys onto the universe: members absent here become missing,
    /// non-members are dropped.
    pub fn restrict(&self, universe: &Universe) -> CrossSection {
        Self::from_universe(universe, |id| self.get(id))
    }
}

impl FromIterator<(SecurityId, Option<f64>)> for CrossSection {
    fn from_iter<I: IntoIterator<Item = (SecurityId, Option<f64>)>>(iter: I) -> Self {
        let mut cs = CrossSection::new();
        for (id, value) in iter {
            cs.insert(id, value);
        }
        cs
    }
}
