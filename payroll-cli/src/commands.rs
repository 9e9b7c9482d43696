//! Subcommand bodies, kept free of process setup so they can be driven
//! from tests.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use payroll_core::{CalculationResult, PayrollTaxEngine};
use payroll_core::models::Jurisdiction;
use payroll_core::rates::RateTables;
use payroll_data::{
    ContextLoadError, CsvRateSource, RateTableLoader, bundled_engine, write_results,
};
use tracing::{info, warn};

use crate::cli::OutputFormat;
use crate::config::PayrollConfig;

/// Bundled tables, with `config.tax_year` replaced from `rates_dir` when
/// one is configured.
pub async fn build_engine(config: &PayrollConfig) -> Result<PayrollTaxEngine> {
    let engine = bundled_engine().context("bundled rate tables are invalid")?;

    if let Some(dir) = &config.rates_dir {
        let source = CsvRateSource::new(dir);
        let version = engine
            .reload(config.tax_year, &source)
            .await
            .with_context(|| format!("cannot load {} tables from '{}'", config.tax_year, dir.display()))?;
        info!(tax_year = config.tax_year, version, dir = %dir.display(), "using rate tables from disk");
    }

    Ok(engine)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Calculates every row of `input` and writes one result row each to
/// `output` (stdout when `None`). A row that cannot be read is written as
/// an error row alongside the calculated ones.
pub async fn calculate(
    engine: &PayrollTaxEngine,
    input: &Path,
    output: Option<&Path>,
    year: Option<i32>,
    workers: usize,
) -> Result<BatchSummary> {
    let rows = payroll_data::load_from_file(input)
        .with_context(|| format!("cannot load employee contexts from '{}'", input.display()))?;

    let mut contexts = Vec::with_capacity(rows.len());
    let unreadable: Vec<Option<ContextLoadError>> = rows
        .into_iter()
        .map(|row| match row {
            Ok(mut context) => {
                if let Some(year) = year {
                    context.tax_year = year;
                }
                contexts.push(context);
                None
            }
            Err(error) => Some(error),
        })
        .collect();

    let mut calculated = engine
        .calculate_batch_concurrent(contexts, workers)
        .await
        .into_iter();
    let mut outcomes: Vec<Result<CalculationResult, anyhow::Error>> =
        Vec::with_capacity(unreadable.len());
    for slot in unreadable {
        let outcome = match slot {
            Some(error) => Err(error.into()),
            None => calculated
                .next()
                .context("batch returned fewer results than rows")?
                .map_err(anyhow::Error::from),
        };
        if let Err(error) = &outcome {
            warn!(row = outcomes.len() + 1, error = %error, "row failed");
        }
        outcomes.push(outcome);
    }

    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create '{}'", path.display()))?;
            write_results(file, &outcomes)?;
        }
        None => write_results(io::stdout().lock(), &outcomes)?,
    }

    let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
    let summary = BatchSummary {
        succeeded: outcomes.len() - failed,
        failed,
    };
    info!(succeeded = summary.succeeded, failed = summary.failed, "batch complete");
    Ok(summary)
}

pub fn rates<W: Write>(
    engine: &PayrollTaxEngine,
    jurisdiction: &str,
    year: i32,
    format: OutputFormat,
    mut out: W,
) -> Result<()> {
    let rates = engine
        .get_tax_rates(&Jurisdiction::parse(jurisdiction), year)
        .with_context(|| format!("no rates for '{jurisdiction}' in {year}"))?;

    match format {
        OutputFormat::Text => write!(out, "{rates}")?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &rates)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Loads `dir` as the `year` table set and reports what it contains.
pub fn check_tables<W: Write>(
    dir: &Path,
    year: i32,
    mut out: W,
) -> Result<RateTables> {
    let tables = RateTableLoader::load_dir(year, dir)
        .with_context(|| format!("rate tables in '{}' are invalid", dir.display()))?;

    let states: Vec<&str> = tables.states().into_iter().map(|s| s.as_str()).collect();
    writeln!(out, "{} tax year {year}: OK", dir.display())?;
    writeln!(out, "  states: {} ({})", states.len(), states.join(" "))?;
    writeln!(
        out,
        "  federal wage bases: {}",
        tables.wage_bases_for(&Jurisdiction::Federal).len()
    )?;
    writeln!(out, "  reciprocity agreements: {}", tables.reciprocity().edge_count())?;
    Ok(tables)
}
