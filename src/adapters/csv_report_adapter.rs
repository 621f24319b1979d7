//! Wide CSV report: one row per security, one column per equation.

use crate::domain::cross_section::SecurityId;
use crate::domain::engine::Calculation;
use crate::domain::error::PitcalcError;
use crate::ports::report_port::ReportPort;
use std::collections::BTreeSet;
use std::io::Write;

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn csv_err(e: csv::Error) -> PitcalcError {
    PitcalcError::data_access(format!("report write failed: {e}"))
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, results: &[Calculation], out: &mut dyn Write) -> Result<(), PitcalcError> {
        let mut writer = csv::Writer::from_writer(out);

        let mut header = vec!["security_id".to_string()];
        header.extend(results.iter().map(|r| r.equation.clone()));
        writer.write_record(&header).map_err(csv_err)?;

        let ids: BTreeSet<&SecurityId> = results.iter().flat_map(|r| r.values.ids()).collect();
        for id in ids {
            let mut row = Vec::with_capacity(results.len() + 1);
            row.push(id.clone());
            for result in results {
                row.push(result.values.get(id).map(|v| v.to_string()).unwrap_or_default());
            }
            writer.write_record(&row).map_err(csv_err)?;
        }

        writer.flush()?;
        Ok(())
    }
}
