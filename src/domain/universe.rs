//! Universe membership fixed at the as-of date.
//!
//! Membership is fetched once per calculation and every intermediate result
//! of that calculation is keyed by exactly this set.

use crate::domain::cross_section::SecurityId;
use crate::domain::error::PitcalcError;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    pub name: String,
    pub as_of: NaiveDate,
    members: BTreeSet<SecurityId>,
}

impl Universe {
    pub fn new<I>(name: impl Into<String>, as_of: NaiveDate, members: I) -> Self
    where
        I: IntoIterator<Item = SecurityId>,
    {
        Self {
            name: name.into(),
            as_of,
            members: members.into_iter().collect(),
        }
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &SecurityId> {
        self.members.iter()
    }

    pub fn members(&self) -> &BTreeSet<SecurityId> {
        &self.members
    }
}

/// Looks up the membership of `name` as of `as_of`.
pub fn resolve_universe(
    data_port: &dyn DataPort,
    name: &str,
    as_of: NaiveDate,
) -> Result<Universe, PitcalcError> {
    let members = data_port.universe_members(name, as_of)?;
    let universe = Universe::new(name, as_of, members);

    if universe.is_empty() {
        tracing::warn!(universe = name, %as_of, "universe has no members");
    } else {
        tracing::debug!(universe = name, %as_of, members = universe.count(), "resolved universe");
    }

    Ok(universe)
}
