use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

use payroll_cli::cli::{Cli, Command};
use payroll_cli::commands;
use payroll_cli::config::PayrollConfig;
use payroll_cli::logging;

// ─── entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = PayrollConfig::load(cli.config.as_deref())?.with_overrides(cli.overrides());
    logging::init_logging(&config.log_level, config.log_file.as_deref())?;
    debug!(?config, "resolved configuration");

    match cli.command {
        Command::Calculate {
            input,
            output,
            year,
        } => {
            let engine = commands::build_engine(&config).await?;
            let summary =
                commands::calculate(&engine, &input, output.as_deref(), year, config.workers)
                    .await?;
            if summary.failed > 0 {
                return Ok(ExitCode::from(2));
            }
        }
        Command::Rates {
            jurisdiction,
            format,
            ..
        } => {
            let engine = commands::build_engine(&config).await?;
            commands::rates(
                &engine,
                &jurisdiction,
                config.tax_year,
                format,
                io::stdout().lock(),
            )?;
        }
        Command::CheckTables { dir, year } => {
            commands::check_tables(&dir, year, io::stdout().lock())?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
