//! Point-in-time data access port.

use crate::domain::cross_section::{CrossSection, SecurityId};
use crate::domain::error::PitcalcError;
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Read access to the market, fundamental and universe tables.
///
/// Implementations must never expose a value before it was knowable:
/// market values are as-of joins on the requested date, fundamental figures
/// are filtered on their report date. Securities without data are returned
/// as missing (or omitted); the caller re-keys results onto the universe.
pub trait DataPort {
    /// Securities in `universe` as of `as_of`.
    fn universe_members(
        &self,
        universe: &str,
        as_of: NaiveDate,
    ) -> Result<Vec<SecurityId>, PitcalcError>;

    /// One cross-section per entry of `dates`, in the same order.
    fn market_lookup(
        &self,
        item: &str,
        dates: &[NaiveDate],
        ids: &BTreeSet<SecurityId>,
    ) -> Result<Vec<CrossSection>, PitcalcError>;

    /// One cross-section per quarter end in `quarters`, in the same order,
    /// using only figures reported on or before `as_of`.
    fn fundamental_lookup(
        &self,
        item: &str,
        quarters: &[NaiveDate],
        as_of: NaiveDate,
        ids: &BTreeSet<SecurityId>,
    ) -> Result<Vec<CrossSection>, PitcalcError>;
}
