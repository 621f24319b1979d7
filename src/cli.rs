//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::calendar::{Calendar, WeekdayCalendar};
use crate::domain::config_validation::{
    validate_calculate_config, validate_calendar_config, validate_store_config,
};
use crate::domain::engine::{Calculation, Engine};
use crate::domain::error::PitcalcError;
use crate::domain::registry::{EquationRegistry, parse_equation_names};
use crate::domain::universe::resolve_universe;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "pitcalc", about = "Point-in-time equation calculator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate equations for a universe as of a date
    Calculate {
        #[arg(short, long)]
        config: PathBuf,
        /// Equation to evaluate (repeatable; defaults to [calculate] equations)
        #[arg(short, long = "equation")]
        equations: Vec<String>,
        #[arg(short, long)]
        universe: Option<String>,
        /// As-of date, YYYY-MM-DD
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the built-in equations in dependency order
    Equations,
    /// Show universe membership as of a date
    Members {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        universe: Option<String>,
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
}

/// Everything `calculate` needs once config and overrides are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculateRequest {
    pub equations: Vec<String>,
    pub universe: String,
    pub as_of: NaiveDate,
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Calculate {
            config,
            equations,
            universe,
            date,
            output,
        } => run_calculate(&config, &equations, universe.as_deref(), date, output.as_ref()),
        Command::Equations => run_equations(),
        Command::Members {
            config,
            universe,
            date,
        } => run_members(&config, universe.as_deref(), date),
    }
}

fn fail(err: PitcalcError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(fail)
}

/// Opens the store named by the config: `[csv] dir` if set, else `[sqlite] path`.
pub fn open_data_port(config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, PitcalcError> {
    if config
        .get_string("csv", "dir")
        .is_some_and(|d| !d.trim().is_empty())
    {
        return Ok(Box::new(CsvAdapter::from_config(config)?));
    }

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        Ok(Box::new(SqliteAdapter::from_config(config)?))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        Err(PitcalcError::ConfigMissing {
            section: "csv".into(),
            key: "dir".into(),
        })
    }
}

/// Equations to evaluate: command line first, then `[calculate] equations`,
/// then every equation in the registry.
pub fn resolve_equations(
    overrides: &[String],
    config: &dyn ConfigPort,
    registry: &EquationRegistry,
) -> Result<Vec<String>, PitcalcError> {
    if !overrides.is_empty() {
        let joined = overrides.join(",");
        return parse_equation_names(&joined).map_err(|e| PitcalcError::ConfigInvalid {
            section: "calculate".into(),
            key: "equations".into(),
            reason: e.to_string(),
        });
    }

    match config.get_string("calculate", "equations") {
        Some(raw) if !raw.trim().is_empty() => {
            parse_equation_names(&raw).map_err(|e| PitcalcError::ConfigInvalid {
                section: "calculate".into(),
                key: "equations".into(),
                reason: e.to_string(),
            })
        }
        _ => Ok(registry.names().cloned().collect()),
    }
}

/// Universe and as-of date: command line first, then `[calculate]`.
pub fn resolve_target(
    config: &dyn ConfigPort,
    universe: Option<&str>,
    as_of: Option<NaiveDate>,
) -> Result<(String, NaiveDate), PitcalcError> {
    let universe = match universe {
        Some(u) => u.to_string(),
        None => config.get_string("calculate", "universe").ok_or_else(|| {
            PitcalcError::ConfigMissing {
                section: "calculate".into(),
                key: "universe".into(),
            }
        })?,
    };

    let as_of = match as_of {
        Some(d) => d,
        None => config
            .get_date("calculate", "as_of")
            .ok_or_else(|| PitcalcError::ConfigMissing {
                section: "calculate".into(),
                key: "as_of".into(),
            })?,
    };

    Ok((universe, as_of))
}

pub fn build_request(
    config: &dyn ConfigPort,
    registry: &EquationRegistry,
    equations: &[String],
    universe: Option<&str>,
    as_of: Option<NaiveDate>,
) -> Result<CalculateRequest, PitcalcError> {
    let equations = resolve_equations(equations, config, registry)?;
    for name in &equations {
        if !registry.contains(name) {
            return Err(PitcalcError::UnknownEquation { name: name.clone() });
        }
    }

    let (universe, as_of) = resolve_target(config, universe, as_of)?;

    Ok(CalculateRequest {
        equations,
        universe,
        as_of,
    })
}

/// Evaluates each equation as an independent top-level calculation.
/// The first error aborts the batch.
pub fn calculate_all(
    registry: &EquationRegistry,
    data_port: &dyn DataPort,
    calendar: &dyn Calendar,
    request: &CalculateRequest,
) -> Result<Vec<Calculation>, PitcalcError> {
    let engine = Engine::new(registry, data_port, calendar);
    request
        .equations
        .iter()
        .map(|name| engine.run(name, &request.universe, request.as_of))
        .collect()
}

fn run_calculate(
    config_path: &PathBuf,
    equations: &[String],
    universe: Option<&str>,
    as_of: Option<NaiveDate>,
    output_path: Option<&PathBuf>,
) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let validated = validate_store_config(&config)
        .and_then(|_| validate_calendar_config(&config))
        .and_then(|_| validate_calculate_config(&config));
    if let Err(e) = validated {
        return fail(e);
    }

    // Stage 2: Registry and request
    let registry = EquationRegistry::standard();
    if let Err(e) = registry.validate() {
        return fail(e);
    }

    let request = match build_request(&config, &registry, equations, universe, as_of) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    let calendar = match WeekdayCalendar::from_config(&config) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    // Stage 3: Open store
    let data_port = match open_data_port(&config) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    run_calculate_pipeline(
        &registry,
        data_port.as_ref(),
        &calendar,
        &request,
        output_path,
    )
}

pub fn run_calculate_pipeline(
    registry: &EquationRegistry,
    data_port: &dyn DataPort,
    calendar: &dyn Calendar,
    request: &CalculateRequest,
    output_path: Option<&PathBuf>,
) -> ExitCode {
    // Stage 4: Evaluate
    eprintln!(
        "Calculating {} equation(s) for {} as of {}",
        request.equations.len(),
        request.universe,
        request.as_of
    );

    let results = match calculate_all(registry, data_port, calendar, request) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    for calc in &results {
        eprintln!(
            "  {}: {}/{} values ({} store calls)",
            calc.equation,
            calc.values.present_count(),
            calc.universe.count(),
            calc.stats.store_calls
        );
    }

    // Stage 5: Report
    let report = CsvReportAdapter::new();
    let written = match output_path {
        Some(path) => fs::File::create(path)
            .map_err(PitcalcError::from)
            .and_then(|mut file| {
                report.write(&results, &mut file)?;
                file.flush()?;
                Ok(())
            }),
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            report.write(&results, &mut lock)
        }
    };

    match (written, output_path) {
        (Err(e), _) => fail(e),
        (Ok(()), Some(path)) => {
            eprintln!("Report written to: {}", path.display());
            ExitCode::SUCCESS
        }
        (Ok(()), None) => ExitCode::SUCCESS,
    }
}

fn run_equations() -> ExitCode {
    let registry = EquationRegistry::standard();
    let order = match registry.evaluation_order() {
        Ok(o) => o,
        Err(e) => return fail(e),
    };

    for name in order {
        if let Some(eq) = registry.get(name) {
            println!("{name} = {eq}");
        }
    }
    ExitCode::SUCCESS
}

fn run_members(config_path: &PathBuf, universe: Option<&str>, as_of: Option<NaiveDate>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_store_config(&config) {
        return fail(e);
    }

    let (universe, as_of) = match resolve_target(&config, universe, as_of) {
        Ok(t) => t,
        Err(e) => return fail(e),
    };

    let data_port = match open_data_port(&config) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    match resolve_universe(data_port.as_ref(), &universe, as_of) {
        Ok(universe) => {
            eprintln!(
                "{} as of {}: {} member(s)",
                universe.name,
                universe.as_of,
                universe.count()
            );
            for id in universe.ids() {
                println!("{id}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}
