//! Rate tables compiled into the binary.

use std::sync::Arc;

use payroll_core::PayrollTaxEngine;
use payroll_core::rates::{RateTableStore, RateTables};

use crate::loader::{RateTableFiles, RateTableLoader, RateTableLoaderError};

/// Tax years with a bundled table set.
pub const BUNDLED_YEARS: &[i32] = &[2025];

macro_rules! bundled_files {
    ($year:literal) => {
        RateTableFiles {
            income_regimes: include_str!(concat!("../data/", $year, "/income_regimes.csv")).into(),
            income_brackets: include_str!(concat!("../data/", $year, "/income_brackets.csv")).into(),
            standard_deductions: include_str!(concat!("../data/", $year, "/standard_deductions.csv"))
                .into(),
            wage_bases: include_str!(concat!("../data/", $year, "/wage_bases.csv")).into(),
            additional_medicare: include_str!(concat!("../data/", $year, "/additional_medicare.csv"))
                .into(),
            local_taxes: include_str!(concat!("../data/", $year, "/local_taxes.csv")).into(),
            local_brackets: include_str!(concat!("../data/", $year, "/local_brackets.csv")).into(),
            reciprocity: include_str!(concat!("../data/", $year, "/reciprocity.csv")).into(),
        }
    };
}

/// The raw CSV text bundled for `tax_year`, if any.
pub fn bundled_files(tax_year: i32) -> Option<RateTableFiles> {
    match tax_year {
        2025 => Some(bundled_files!("2025")),
        _ => None,
    }
}

/// Parses the bundled tables for `tax_year`. `Ok(None)` when no table set
/// is bundled for that year.
pub fn bundled_tables(tax_year: i32) -> Result<Option<RateTables>, RateTableLoaderError> {
    bundled_files(tax_year)
        .map(|files| RateTableLoader::load(tax_year, &files))
        .transpose()
}

/// A store preloaded with every bundled tax year.
pub fn bundled_store() -> Result<RateTableStore, RateTableLoaderError> {
    let tables = BUNDLED_YEARS
        .iter()
        .filter_map(|year| bundled_tables(*year).transpose())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RateTableStore::with_tables(tables))
}

/// An engine backed by [`bundled_store`].
pub fn bundled_engine() -> Result<PayrollTaxEngine, RateTableLoaderError> {
    Ok(PayrollTaxEngine::new(Arc::new(bundled_store()?)))
}
