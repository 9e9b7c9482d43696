//! Loader for one tax year of rate tables stored as CSV files.
//!
//! A table set is a directory holding eight files. Headers are matched by
//! name, cells are trimmed, and an empty `max_income` or `annual_cap` cell
//! means the bracket or levy is unbounded.
//!
//! | File | Columns |
//! |---------------------------|---------------------------------------------------------------|
//! | `income_regimes.csv` | `jurisdiction,regime,flat_rate` |
//! | `income_brackets.csv` | `jurisdiction,filing_status,min_income,max_income,base_tax,rate` |
//! | `standard_deductions.csv` | `jurisdiction,filing_status,amount` |
//! | `wage_bases.csv` | `tax_type,jurisdiction,side,rate,annual_cap` |
//! | `additional_medicare.csv` | `filing_status,threshold,rate` |
//! | `local_taxes.csv` | `code,levy,formula,rate,resident_rate,nonresident_rate,monthly_amount,resident_only` |
//! | `local_brackets.csv` | `code,min_income,max_income,base_tax,rate` |
//! | `reciprocity.csv` | `work_state,home_state` |
//!
//! `regime` is one of `none`, `flat` or `progressive`. A progressive
//! jurisdiction with no standard-deduction rows gets a zero deduction.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use payroll_core::models::{
    FilingStatus, Jurisdiction, StateCode, TaxBracket, TaxSide, TaxType,
};
use payroll_core::rates::{
    AdditionalMedicare, BracketSchedule, IncomeTaxRegime, LevyKind, LocalFormula, LocalTax,
    ProgressiveRegime, RateTableError, RateTables, RateTablesBuilder, ScheduleError,
    SourceError, WageBaseLimit,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

pub const INCOME_REGIMES: &str = "income_regimes.csv";
pub const INCOME_BRACKETS: &str = "income_brackets.csv";
pub const STANDARD_DEDUCTIONS: &str = "standard_deductions.csv";
pub const WAGE_BASES: &str = "wage_bases.csv";
pub const ADDITIONAL_MEDICARE: &str = "additional_medicare.csv";
pub const LOCAL_TAXES: &str = "local_taxes.csv";
pub const LOCAL_BRACKETS: &str = "local_brackets.csv";
pub const RECIPROCITY: &str = "reciprocity.csv";

/// Errors that can occur when loading a rate-table directory.
#[derive(Debug, Error)]
pub enum RateTableLoaderError {
    #[error("{file}: I/O error: {message}")]
    Io { file: String, message: String },

    #[error("{file}: CSV parse error: {message}")]
    CsvParse { file: &'static str, message: String },

    #[error("{file} row {row}: {message}")]
    InvalidRecord {
        file: &'static str,
        row: usize,
        message: String,
    },

    #[error("{file}: invalid schedule for {code}: {source}")]
    Schedule {
        file: &'static str,
        code: String,
        #[source]
        source: ScheduleError,
    },

    #[error(transparent)]
    Tables(#[from] RateTableError),
}

impl From<RateTableLoaderError> for SourceError {
    fn from(err: RateTableLoaderError) -> Self {
        match err {
            RateTableLoaderError::Io { file, message } => SourceError::Io {
                path: file,
                message,
            },
            RateTableLoaderError::Tables(inner) => SourceError::Invalid(inner),
            other => SourceError::Parse(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw records, one per file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IncomeRegimeRecord {
    pub jurisdiction: String,
    pub regime: String,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub flat_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IncomeBracketRecord {
    pub jurisdiction: String,
    pub filing_status: String,
    pub min_income: Decimal,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub max_income: Option<Decimal>,
    pub base_tax: Decimal,
    pub rate: Decimal,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StandardDeductionRecord {
    pub jurisdiction: String,
    pub filing_status: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WageBaseRecord {
    pub tax_type: String,
    pub jurisdiction: String,
    pub side: String,
    pub rate: Decimal,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub annual_cap: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AdditionalMedicareRecord {
    pub filing_status: String,
    pub threshold: Decimal,
    pub rate: Decimal,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LocalTaxRecord {
    pub code: String,
    pub levy: String,
    pub formula: String,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub rate: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub resident_rate: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub nonresident_rate: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub monthly_amount: Option<Decimal>,
    #[serde(default)]
    pub resident_only: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LocalBracketRecord {
    pub code: String,
    pub min_income: Decimal,
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub max_income: Option<Decimal>,
    pub base_tax: Decimal,
    pub rate: Decimal,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReciprocityRecord {
    pub work_state: String,
    pub home_state: String,
}

pub(crate) fn deserialize_optional_decimal<'de, D>(
    deserializer: D
) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<Decimal>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// File contents
// ---------------------------------------------------------------------------

/// The text of the eight files making up one table set.
#[derive(Debug, Clone, Default)]
pub struct RateTableFiles {
    pub income_regimes: String,
    pub income_brackets: String,
    pub standard_deductions: String,
    pub wage_bases: String,
    pub additional_medicare: String,
    pub local_taxes: String,
    pub local_brackets: String,
    pub reciprocity: String,
}

impl RateTableFiles {
    /// Reads every file from `dir`.
    pub fn read_dir(dir: &Path) -> Result<Self, RateTableLoaderError> {
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|e| RateTableLoaderError::Io {
                file: path.display().to_string(),
                message: e.to_string(),
            })
        };

        Ok(Self {
            income_regimes: read(INCOME_REGIMES)?,
            income_brackets: read(INCOME_BRACKETS)?,
            standard_deductions: read(STANDARD_DEDUCTIONS)?,
            wage_bases: read(WAGE_BASES)?,
            additional_medicare: read(ADDITIONAL_MEDICARE)?,
            local_taxes: read(LOCAL_TAXES)?,
            local_brackets: read(LOCAL_BRACKETS)?,
            reciprocity: read(RECIPROCITY)?,
        })
    }

    /// Async variant of [`Self::read_dir`] for use inside a runtime.
    pub async fn read_dir_async(dir: &Path) -> Result<Self, RateTableLoaderError> {
        async fn read(
            dir: &Path,
            name: &str,
        ) -> Result<String, RateTableLoaderError> {
            let path = dir.join(name);
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| RateTableLoaderError::Io {
                    file: path.display().to_string(),
                    message: e.to_string(),
                })
        }

        Ok(Self {
            income_regimes: read(dir, INCOME_REGIMES).await?,
            income_brackets: read(dir, INCOME_BRACKETS).await?,
            standard_deductions: read(dir, STANDARD_DEDUCTIONS).await?,
            wage_bases: read(dir, WAGE_BASES).await?,
            additional_medicare: read(dir, ADDITIONAL_MEDICARE).await?,
            local_taxes: read(dir, LOCAL_TAXES).await?,
            local_brackets: read(dir, LOCAL_BRACKETS).await?,
            reciprocity: read(dir, RECIPROCITY).await?,
        })
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Turns CSV table files into a validated [`RateTables`] version.
pub struct RateTableLoader;

impl RateTableLoader {
    /// Parse the records of one file. Rows are returned in file order.
    pub fn parse<T: DeserializeOwned>(
        file: &'static str,
        text: &str,
    ) -> Result<Vec<T>, RateTableLoaderError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(false)
            .from_reader(text.as_bytes());

        reader
            .deserialize()
            .map(|result| {
                result.map_err(|e| RateTableLoaderError::CsvParse {
                    file,
                    message: e.to_string(),
                })
            })
            .collect()
    }

    /// Load the table set in `dir` for `tax_year`.
    pub fn load_dir(
        tax_year: i32,
        dir: &Path,
    ) -> Result<RateTables, RateTableLoaderError> {
        let files = RateTableFiles::read_dir(dir)?;
        Self::load(tax_year, &files)
    }

    /// Parse and validate every file of a table set.
    ///
    /// # Errors
    ///
    /// Fails on malformed CSV, unknown codes (filing status, tax type,
    /// side, levy or formula), bracket lists that do not form a valid
    /// schedule, and on any table that [`RateTablesBuilder::build`] rejects.
    pub fn load(
        tax_year: i32,
        files: &RateTableFiles,
    ) -> Result<RateTables, RateTableLoaderError> {
        let brackets = income_brackets(Self::parse(INCOME_BRACKETS, &files.income_brackets)?)?;
        let deductions =
            standard_deductions(Self::parse(STANDARD_DEDUCTIONS, &files.standard_deductions)?)?;

        let mut builder = RateTables::builder(tax_year);
        builder = income_regimes(
            builder,
            Self::parse(INCOME_REGIMES, &files.income_regimes)?,
            brackets,
            deductions,
        )?;

        for (idx, record) in Self::parse::<WageBaseRecord>(WAGE_BASES, &files.wage_bases)?
            .into_iter()
            .enumerate()
        {
            builder = builder.wage_base(wage_base(record, idx + 1)?);
        }

        let medicare: Vec<AdditionalMedicareRecord> =
            Self::parse(ADDITIONAL_MEDICARE, &files.additional_medicare)?;
        if let Some(params) = additional_medicare(medicare)? {
            builder = builder.additional_medicare(params);
        }

        let local_brackets = local_brackets(Self::parse(LOCAL_BRACKETS, &files.local_brackets)?);
        for local in local_taxes(Self::parse(LOCAL_TAXES, &files.local_taxes)?, local_brackets)? {
            builder = builder.local(local);
        }

        for (idx, record) in Self::parse::<ReciprocityRecord>(RECIPROCITY, &files.reciprocity)?
            .into_iter()
            .enumerate()
        {
            let row = idx + 1;
            builder = builder.reciprocity(
                state_code(RECIPROCITY, row, &record.work_state)?,
                state_code(RECIPROCITY, row, &record.home_state)?,
            );
        }

        let tables = builder.build()?;
        debug!(
            tax_year,
            states = tables.states().len(),
            reciprocity_edges = tables.reciprocity().edge_count(),
            "loaded rate tables"
        );
        Ok(tables)
    }
}

fn invalid(
    file: &'static str,
    row: usize,
    message: impl Into<String>,
) -> RateTableLoaderError {
    RateTableLoaderError::InvalidRecord {
        file,
        row,
        message: message.into(),
    }
}

fn filing_status(
    file: &'static str,
    row: usize,
    value: &str,
) -> Result<FilingStatus, RateTableLoaderError> {
    FilingStatus::parse(value)
        .ok_or_else(|| invalid(file, row, format!("unrecognised filing status '{value}'")))
}

fn state_code(
    file: &'static str,
    row: usize,
    value: &str,
) -> Result<StateCode, RateTableLoaderError> {
    StateCode::parse(value)
        .ok_or_else(|| invalid(file, row, format!("'{value}' is not a two-letter state code")))
}

type BracketsByStatus = BTreeMap<FilingStatus, Vec<TaxBracket>>;

/// Groups bracket rows by jurisdiction code, then filing status.
fn income_brackets(
    records: Vec<IncomeBracketRecord>
) -> Result<HashMap<String, BracketsByStatus>, RateTableLoaderError> {
    let mut grouped: HashMap<String, BracketsByStatus> = HashMap::new();

    for (idx, record) in records.into_iter().enumerate() {
        let status = filing_status(INCOME_BRACKETS, idx + 1, &record.filing_status)?;
        grouped
            .entry(Jurisdiction::parse(&record.jurisdiction).code().to_string())
            .or_default()
            .entry(status)
            .or_default()
            .push(TaxBracket {
                min_income: record.min_income,
                max_income: record.max_income,
                tax_rate: record.rate,
                base_tax: record.base_tax,
            });
    }

    Ok(grouped)
}

fn standard_deductions(
    records: Vec<StandardDeductionRecord>
) -> Result<HashMap<String, BTreeMap<FilingStatus, Decimal>>, RateTableLoaderError> {
    let mut grouped: HashMap<String, BTreeMap<FilingStatus, Decimal>> = HashMap::new();

    for (idx, record) in records.into_iter().enumerate() {
        let status = filing_status(STANDARD_DEDUCTIONS, idx + 1, &record.filing_status)?;
        grouped
            .entry(Jurisdiction::parse(&record.jurisdiction).code().to_string())
            .or_default()
            .insert(status, record.amount);
    }

    Ok(grouped)
}

fn income_regimes(
    mut builder: RateTablesBuilder,
    records: Vec<IncomeRegimeRecord>,
    mut brackets: HashMap<String, BracketsByStatus>,
    mut deductions: HashMap<String, BTreeMap<FilingStatus, Decimal>>,
) -> Result<RateTablesBuilder, RateTableLoaderError> {
    for (idx, record) in records.into_iter().enumerate() {
        let row = idx + 1;
        let jurisdiction = Jurisdiction::parse(&record.jurisdiction);
        let code = jurisdiction.code().to_string();

        let regime = match record.regime.as_str() {
            "none" => IncomeTaxRegime::NoTax,
            "flat" => {
                let rate = record
                    .flat_rate
                    .ok_or_else(|| invalid(INCOME_REGIMES, row, "flat regime needs flat_rate"))?;
                IncomeTaxRegime::Flat { rate }
            }
            "progressive" => {
                let schedules = brackets
                    .remove(&code)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(status, rows)| {
                        BracketSchedule::new(rows)
                            .map(|schedule| (status, schedule))
                            .map_err(|source| RateTableLoaderError::Schedule {
                                file: INCOME_BRACKETS,
                                code: format!("{code} {}", status.as_str()),
                                source,
                            })
                    })
                    .collect::<Result<BTreeMap<_, _>, _>>()?;
                let standard = deductions.remove(&code).unwrap_or_default();
                IncomeTaxRegime::Progressive(ProgressiveRegime::new(schedules, standard))
            }
            other => {
                return Err(invalid(
                    INCOME_REGIMES,
                    row,
                    format!("unrecognised regime '{other}'"),
                ));
            }
        };

        builder = match jurisdiction {
            Jurisdiction::Federal => builder.federal_regime(regime),
            Jurisdiction::State(state) => builder.state(state, regime),
            Jurisdiction::Local(code) => {
                return Err(invalid(
                    INCOME_REGIMES,
                    row,
                    format!("'{code}' is not a federal or state jurisdiction"),
                ));
            }
        };
    }

    // Brackets left over belong to a jurisdiction with no progressive regime
    if let Some(code) = brackets.keys().min() {
        return Err(invalid(
            INCOME_BRACKETS,
            0,
            format!("brackets for {code} but its regime is not progressive"),
        ));
    }

    Ok(builder)
}

fn wage_base(
    record: WageBaseRecord,
    row: usize,
) -> Result<WageBaseLimit, RateTableLoaderError> {
    let tax_type = TaxType::parse(&record.tax_type).ok_or_else(|| {
        invalid(WAGE_BASES, row, format!("unrecognised tax type '{}'", record.tax_type))
    })?;
    let side = TaxSide::parse(&record.side)
        .ok_or_else(|| invalid(WAGE_BASES, row, format!("unrecognised side '{}'", record.side)))?;

    Ok(WageBaseLimit {
        tax_type,
        jurisdiction: Jurisdiction::parse(&record.jurisdiction),
        side,
        rate: record.rate,
        annual_cap: record.annual_cap,
    })
}

/// `None` for an empty file; the builder then reports the omission.
fn additional_medicare(
    records: Vec<AdditionalMedicareRecord>
) -> Result<Option<AdditionalMedicare>, RateTableLoaderError> {
    let Some(rate) = records.first().map(|r| r.rate) else {
        return Ok(None);
    };

    let mut thresholds = BTreeMap::new();
    for (idx, record) in records.into_iter().enumerate() {
        let row = idx + 1;
        if record.rate != rate {
            return Err(invalid(
                ADDITIONAL_MEDICARE,
                row,
                format!("rate {} differs from {rate} on the first row", record.rate),
            ));
        }
        thresholds.insert(
            filing_status(ADDITIONAL_MEDICARE, row, &record.filing_status)?,
            record.threshold,
        );
    }

    Ok(Some(AdditionalMedicare { rate, thresholds }))
}

fn local_brackets(records: Vec<LocalBracketRecord>) -> HashMap<String, Vec<TaxBracket>> {
    let mut grouped: HashMap<String, Vec<TaxBracket>> = HashMap::new();
    for record in records {
        grouped
            .entry(record.code.to_ascii_uppercase())
            .or_default()
            .push(TaxBracket {
                min_income: record.min_income,
                max_income: record.max_income,
                tax_rate: record.rate,
                base_tax: record.base_tax,
            });
    }
    grouped
}

fn local_taxes(
    records: Vec<LocalTaxRecord>,
    mut brackets: HashMap<String, Vec<TaxBracket>>,
) -> Result<Vec<LocalTax>, RateTableLoaderError> {
    let mut taxes = Vec::with_capacity(records.len());

    for (idx, record) in records.into_iter().enumerate() {
        let row = idx + 1;
        let code = record.code.to_ascii_uppercase();
        let levy = LevyKind::parse(&record.levy)
            .ok_or_else(|| invalid(LOCAL_TAXES, row, format!("unrecognised levy '{}'", record.levy)))?;
        let required = |value: Option<Decimal>, column: &str| {
            value.ok_or_else(|| {
                invalid(
                    LOCAL_TAXES,
                    row,
                    format!("{} formula needs {column}", record.formula),
                )
            })
        };

        let formula = match record.formula.as_str() {
            "flat" => LocalFormula::Flat {
                rate: required(record.rate, "rate")?,
            },
            "differential" => LocalFormula::Differential {
                resident_rate: required(record.resident_rate, "resident_rate")?,
                nonresident_rate: required(record.nonresident_rate, "nonresident_rate")?,
            },
            "progressive" => {
                let rows = brackets.remove(&code).unwrap_or_default();
                let schedule = BracketSchedule::new(rows).map_err(|source| {
                    RateTableLoaderError::Schedule {
                        file: LOCAL_BRACKETS,
                        code: code.clone(),
                        source,
                    }
                })?;
                LocalFormula::Progressive {
                    schedule,
                    resident_only: record.resident_only.unwrap_or(false),
                }
            }
            "periodic" => LocalFormula::Periodic {
                monthly_amount: required(record.monthly_amount, "monthly_amount")?,
            },
            other => {
                return Err(invalid(
                    LOCAL_TAXES,
                    row,
                    format!("unrecognised formula '{other}'"),
                ));
            }
        };

        taxes.push(LocalTax {
            code,
            levy,
            formula,
        });
    }

    if let Some(code) = brackets.keys().min() {
        return Err(invalid(
            LOCAL_BRACKETS,
            0,
            format!("brackets for {code} but it has no progressive local tax"),
        ));
    }

    Ok(taxes)
}
