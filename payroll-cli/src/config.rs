//! `payroll-tax` configuration file.
//!
//! ```toml
//! rates_dir = "/srv/payroll/rates"   # <dir>/<year>/*.csv, overrides bundled tables
//! tax_year = 2025
//! workers = 8
//! log_level = "info"
//! log_file = "/var/log/payroll-tax.log"
//! ```
//!
//! Every key is optional. Command-line flags win over the file.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TAX_YEAR: i32 = 2025;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PayrollConfig {
    pub rates_dir: Option<PathBuf>,
    pub tax_year: i32,
    pub workers: usize,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for PayrollConfig {
    fn default() -> Self {
        Self {
            rates_dir: None,
            tax_year: DEFAULT_TAX_YEAR,
            workers: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_file: None,
        }
    }
}

/// Values given on the command line; `None` keeps the file's value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub rates_dir: Option<PathBuf>,
    pub tax_year: Option<i32>,
    pub workers: Option<usize>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl PayrollConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    /// Reads `path`, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read config file '{}'", path.display()))?;
                Self::from_toml_str(&text)
                    .with_context(|| format!("in config file '{}'", path.display()))
            }
        }
    }

    pub fn with_overrides(
        self,
        overrides: ConfigOverrides,
    ) -> Self {
        Self {
            rates_dir: overrides.rates_dir.or(self.rates_dir),
            tax_year: overrides.tax_year.unwrap_or(self.tax_year),
            workers: overrides.workers.unwrap_or(self.workers).max(1),
            log_level: overrides.log_level.unwrap_or(self.log_level),
            log_file: overrides.log_file.or(self.log_file),
        }
    }
}
