//! Report output port trait.

use crate::domain::engine::Calculation;
use crate::domain::error::PitcalcError;
use std::io::Write;

/// Port for writing calculation results.
pub trait ReportPort {
    /// Writes one report covering every calculation, in the given order.
    fn write(&self, results: &[Calculation], out: &mut dyn Write) -> Result<(), PitcalcError>;
}
