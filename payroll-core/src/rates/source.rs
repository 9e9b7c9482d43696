use async_trait::async_trait;
use thiserror::Error;

use super::{RateTableError, RateTables};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no rate tables available for tax year {0}")]
    NotFound(i32),

    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("malformed rate data: {0}")]
    Parse(String),

    #[error(transparent)]
    Invalid(#[from] RateTableError),
}

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("rate source '{source_name}' failed: {error}")]
    Source {
        source_name: String,
        #[source]
        error: SourceError,
    },

    #[error("requested tax year {requested} but source returned {returned}")]
    YearMismatch { requested: i32, returned: i32 },
}

/// Supplies fresh rate tables on request. Implemented by whatever owns
/// tax-year data acquisition.
#[async_trait]
pub trait RateTableSource: Send + Sync {
    /// Short label for logs and errors.
    fn name(&self) -> &str;

    async fn fetch(
        &self,
        tax_year: i32,
    ) -> Result<RateTables, SourceError>;
}
