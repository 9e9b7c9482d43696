//! Calculation error taxonomy.
//!
//! Every variant is synchronous and non-retryable: it indicates malformed
//! caller input or missing rate data, never a transient fault.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{FilingStatus, TaxKind};

/// Malformed or out-of-range input, rejected before any tax math runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("gross pay must be non-negative, got {0}")]
    NegativeGrossPay(Decimal),

    #[error("unrecognised filing status '{0}'")]
    InvalidFilingStatus(String),

    #[error("'{0}' is not a two-letter state code")]
    InvalidStateCode(String),

    #[error("{field} must be non-negative, got {value}")]
    NegativeAmount { field: String, value: Decimal },

    #[error("{field} exceeds the supported maximum of {limit}, got {value}")]
    AmountOutOfRange {
        field: String,
        value: Decimal,
        limit: Decimal,
    },

    #[error("earnings percent for {state} must be non-negative, got {percent}")]
    NegativeEarningsPercent { state: String, percent: Decimal },

    #[error("multistate calculation requires at least one work location")]
    MissingWorkLocations,
}

/// Rate data that the active tables do not contain.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("unknown jurisdiction '{0}'")]
    UnknownJurisdiction(String),

    #[error("no rate tables loaded for tax year {0}")]
    UnknownTaxYear(i32),

    #[error("no {filing_status} schedule for jurisdiction {jurisdiction}")]
    MissingSchedule {
        jurisdiction: String,
        filing_status: FilingStatus,
    },

    #[error("jurisdiction {jurisdiction} does not carry {kind} rates")]
    UnsupportedTaxKind { jurisdiction: String, kind: TaxKind },
}

/// A recognisable but unsupported configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnsupportedConfiguration {
    #[error("unsupported pay frequency '{0}'")]
    UnsupportedFrequency(String),
}

/// Any failure of a single calculation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalculationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedConfiguration),

    /// A concurrent batch worker stopped before returning its results.
    #[error("batch worker failed: {0}")]
    WorkerFailed(String),
}
