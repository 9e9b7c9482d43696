use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::ConfigOverrides;

// ─── CLI definition ──────────────────────────────────────────────────────────

/// Payroll tax withholding calculator.
///
/// Computes federal, state and local withholding plus employee and employer
/// payroll taxes for each paycheck in a CSV file, using the bundled rate
/// tables or a directory of replacement tables.
#[derive(Debug, Parser)]
#[command(name = "payroll-tax", version)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory of `<year>/*.csv` rate tables that replace the bundled set.
    #[arg(long, global = true)]
    pub rates_dir: Option<PathBuf>,

    /// Log filter: a bare level (`info`, `debug`, ...) or an EnvFilter
    /// directive. `RUST_LOG` takes precedence.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Append log records to this file as well as stderr.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Blocking workers for batch calculation.
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Calculate every paycheck in an employee CSV.
    Calculate {
        /// Employee-context CSV.
        #[arg(long)]
        input: PathBuf,

        /// Result CSV; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Override the tax year of every row.
        #[arg(long)]
        year: Option<i32>,
    },

    /// Show every rate a jurisdiction levies.
    Rates {
        /// `US`, a state code such as `NJ`, or a local code such as `PA-PHL`.
        #[arg(long)]
        jurisdiction: String,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Load and validate a rate-table directory without installing it.
    CheckTables {
        /// Directory holding the eight table files for one year.
        #[arg(long)]
        dir: PathBuf,

        #[arg(long)]
        year: i32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// The global flags, plus the `--year` of commands that use the
    /// configured tables, as configuration overrides.
    pub fn overrides(&self) -> ConfigOverrides {
        let tax_year = match &self.command {
            Command::Calculate { year, .. } | Command::Rates { year, .. } => *year,
            Command::CheckTables { .. } => None,
        };
        ConfigOverrides {
            rates_dir: self.rates_dir.clone(),
            tax_year,
            workers: self.workers,
            log_level: self.log_level.clone(),
            log_file: self.log_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "payroll-tax",
            "rates",
            "--jurisdiction",
            "NJ",
            "--workers",
            "2",
            "--log-level",
            "debug",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(overrides.workers, Some(2));
        assert_eq!(overrides.log_level.as_deref(), Some("debug"));
        assert!(matches!(
            cli.command,
            Command::Rates {
                format: OutputFormat::Text,
                year: None,
                ..
            }
        ));
    }

    #[test]
    fn year_flag_becomes_tax_year_override() {
        let rates =
            Cli::try_parse_from(["payroll-tax", "rates", "--jurisdiction", "NJ", "--year", "2024"])
                .unwrap();
        let calculate =
            Cli::try_parse_from(["payroll-tax", "calculate", "--input", "in.csv"]).unwrap();
        let check = Cli::try_parse_from([
            "payroll-tax",
            "check-tables",
            "--dir",
            "rates/2024",
            "--year",
            "2024",
        ])
        .unwrap();

        assert_eq!(rates.overrides().tax_year, Some(2024));
        assert_eq!(calculate.overrides().tax_year, None);
        assert_eq!(check.overrides().tax_year, None);
    }

    #[test]
    fn check_tables_requires_year() {
        assert!(Cli::try_parse_from(["payroll-tax", "check-tables", "--dir", "rates/2025"]).is_err());
    }
}
