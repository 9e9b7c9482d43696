//! CSV loader for employee paycheck contexts.
//!
//! ## CSV Format
//!
//! Column order does **not** matter (headers are matched by name). Header
//! names are case-sensitive. A file missing a required column is rejected
//! outright. Otherwise every data row yields its own outcome: a cell that
//! fails to parse fails only its row, and enumerated cells are passed
//! through as text for the engine to reject per row.
//!
//! | Column | Required | Type | Notes |
//! |--------------------------|----------|---------|------------------------------------------|
//! | `tax_year` | yes | integer | e.g. `2025` |
//! | `gross_pay` | yes | decimal | per pay period |
//! | `filing_status` | yes | string | `single`, `married_filing_jointly`, ... or `S`, `MFJ`, `MFS`, `HOH` |
//! | `pay_frequency` | yes | string | `weekly`, `biweekly`, `semimonthly`, `monthly` |
//! | `work_state` | yes | string | two-letter code |
//! | `home_state` | yes | string | two-letter code |
//! | `ytd_gross` | no | decimal | empty means `0` |
//! | `ytd_social_security` | no | decimal | falls back to `ytd_gross` |
//! | `ytd_medicare` | no | decimal | falls back to `ytd_gross` |
//! | `ytd_futa` | no | decimal | falls back to `ytd_gross` |
//! | `ytd_suta` | no | decimal | falls back to `ytd_gross` |
//! | `ytd_sdi` | no | decimal | falls back to `ytd_gross` |
//! | `ytd_pfml` | no | decimal | falls back to `ytd_gross` |
//! | `pretax_401k` | no | decimal | reduces income-tax wages only |
//! | `pretax_section_125` | no | decimal | also reduces payroll-tax wages |
//! | `additional_withholding` | no | decimal | W-4 step 4(c), per period |
//! | `local_code` | no | string | e.g. `PA-PHL` |
//! | `is_local_resident` | no | bool | `true` / `false` |
//! | `work_locations` | no | string | `CA:60;NY:40` |
//!
//! ### Minimal example
//!
//! ```csv
//! tax_year,gross_pay,filing_status,pay_frequency,work_state,home_state
//! 2025,2000.00,single,biweekly,CA,CA
//! ```
use std::collections::BTreeMap;
use std::path::Path;

use payroll_core::models::{EmployeeTaxContext, W4Elections, WorkLocation, YtdSnapshot};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::loader::deserialize_optional_decimal;

const REQUIRED_COLUMNS: [&str; 6] = [
    "tax_year",
    "gross_pay",
    "filing_status",
    "pay_frequency",
    "work_state",
    "home_state",
];

// ---------------------------------------------------------------------------
// Serde-compatible row that mirrors the CSV layout exactly
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ContextRow {
    tax_year: i32,
    gross_pay: Decimal,
    filing_status: String,
    pay_frequency: String,
    work_state: String,
    home_state: String,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    ytd_gross: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    ytd_social_security: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    ytd_medicare: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    ytd_futa: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    ytd_suta: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    ytd_sdi: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    ytd_pfml: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pretax_401k: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pretax_section_125: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    additional_withholding: Option<Decimal>,
    #[serde(default)]
    local_code: Option<String>,
    #[serde(default)]
    is_local_resident: Option<bool>,
    #[serde(default)]
    work_locations: Option<String>,
}

// ---------------------------------------------------------------------------
// Public error type
// ---------------------------------------------------------------------------

/// Errors that can occur while loading employee contexts.
#[derive(Debug, thiserror::Error)]
pub enum ContextLoadError {
    /// The header line could not be read.
    #[error("CSV parse error: {0}")]
    Parse(#[from] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    /// A data row could not be deserialised (wrong field count, a
    /// non-numeric amount, etc.). `row` is 1-based (header = row 0).
    #[error("row {row}: {source}")]
    InvalidRow {
        row: usize,
        #[source]
        source: csv::Error,
    },

    /// A `work_locations` cell is not a `STATE:PERCENT;...` list. `row` is
    /// 1-based (header = row 0).
    #[error("malformed work_locations '{value}' on row {row}")]
    InvalidWorkLocations { value: String, row: usize },

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Core loader
// ---------------------------------------------------------------------------

/// Parses `CA:60;NY:40` into work locations. Empty segments are skipped.
pub fn parse_work_locations(value: &str) -> Option<Vec<WorkLocation>> {
    value
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (state, percent) = segment.split_once(':')?;
            let earnings_percent = percent.trim().parse::<Decimal>().ok()?;
            Some(WorkLocation {
                state: state.trim().to_string(),
                earnings_percent,
            })
        })
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Convert a single CSV row into a context.
///
/// row_number is 1-based (for error messages).
fn convert_row(
    row: ContextRow,
    row_number: usize,
) -> Result<EmployeeTaxContext, ContextLoadError> {
    let work_locations = match non_empty(row.work_locations) {
        None => None,
        Some(value) => Some(parse_work_locations(&value).ok_or(
            ContextLoadError::InvalidWorkLocations {
                value,
                row: row_number,
            },
        )?),
    };

    let mut pre_tax_deductions = BTreeMap::new();
    if let Some(amount) = row.pretax_401k {
        pre_tax_deductions.insert("401k".to_string(), amount);
    }
    if let Some(amount) = row.pretax_section_125 {
        pre_tax_deductions.insert("section_125".to_string(), amount);
    }

    Ok(EmployeeTaxContext {
        tax_year: row.tax_year,
        gross_pay: row.gross_pay,
        filing_status: row.filing_status,
        pay_frequency: row.pay_frequency,
        work_state: row.work_state,
        home_state: row.home_state,
        ytd: YtdSnapshot {
            gross: row.ytd_gross.unwrap_or(Decimal::ZERO),
            social_security: row.ytd_social_security,
            medicare: row.ytd_medicare,
            futa: row.ytd_futa,
            suta: row.ytd_suta,
            sdi: row.ytd_sdi,
            pfml: row.ytd_pfml,
        },
        pre_tax_deductions,
        w4: W4Elections {
            additional_withholding: row.additional_withholding.unwrap_or(Decimal::ZERO),
            ..Default::default()
        },
        local_code: non_empty(row.local_code),
        is_local_resident: row.is_local_resident,
        work_locations,
    })
}

/// The outcome of one data row.
pub type LoadedRow = Result<EmployeeTaxContext, ContextLoadError>;

/// Parse CSV text and return one outcome per data row, in file order.
///
/// Row-level failures ([ContextLoadError::InvalidRow],
/// [ContextLoadError::InvalidWorkLocations]) occupy their row's slot and do
/// not affect the other rows.
///
/// # Errors
///
/// * [ContextLoadError::Parse] – if the header line cannot be read.
/// * [ContextLoadError::MissingColumn] – if a required column is absent.
pub fn load_from_str(input: &str) -> Result<Vec<LoadedRow>, ContextLoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(input.as_bytes());

    let headers = reader.headers()?;
    if let Some(missing) = REQUIRED_COLUMNS
        .into_iter()
        .find(|column| !headers.iter().any(|header| header == *column))
    {
        return Err(ContextLoadError::MissingColumn(missing));
    }

    Ok(reader
        .deserialize::<ContextRow>()
        .enumerate()
        .map(|(idx, result)| {
            let row = result.map_err(|source| ContextLoadError::InvalidRow {
                row: idx + 1,
                source,
            })?;
            convert_row(row, idx + 1)
        })
        .collect())
}

/// Read a file from disk and delegate to [load_from_str].
pub fn load_from_file(path: &Path) -> Result<Vec<LoadedRow>, ContextLoadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ContextLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_from_str(&contents)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
