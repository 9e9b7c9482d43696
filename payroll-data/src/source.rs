//! [`RateTableSource`] implementations backed by CSV table sets.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use payroll_core::rates::{RateTableSource, RateTables, SourceError};
use tracing::debug;

use crate::builtin::bundled_files;
use crate::loader::{RateTableFiles, RateTableLoader};

/// Reads `<root>/<tax_year>/*.csv` on every fetch.
#[derive(Debug, Clone)]
pub struct CsvRateSource {
    root: PathBuf,
    name: String,
}

impl CsvRateSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = format!("csv:{}", root.display());
        Self { root, name }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn year_dir(
        &self,
        tax_year: i32,
    ) -> PathBuf {
        self.root.join(tax_year.to_string())
    }
}

#[async_trait]
impl RateTableSource for CsvRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        tax_year: i32,
    ) -> Result<RateTables, SourceError> {
        let dir = self.year_dir(tax_year);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(SourceError::NotFound(tax_year));
        }

        debug!(dir = %dir.display(), "reading rate tables");
        let files = RateTableFiles::read_dir_async(&dir).await?;
        Ok(RateTableLoader::load(tax_year, &files)?)
    }
}

/// Serves the tables compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledRateSource;

#[async_trait]
impl RateTableSource for BundledRateSource {
    fn name(&self) -> &str {
        "bundled"
    }

    async fn fetch(
        &self,
        tax_year: i32,
    ) -> Result<RateTables, SourceError> {
        let files = bundled_files(tax_year).ok_or(SourceError::NotFound(tax_year))?;
        Ok(RateTableLoader::load(tax_year, &files)?)
    }
}
