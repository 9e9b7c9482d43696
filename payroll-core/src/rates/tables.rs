//! One immutable, effective-dated version of every rate a calculation needs.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use super::{
    AdditionalMedicare, IncomeTaxRegime, LocalFormula, LocalTax, ProgressiveRegime,
    ReciprocityGraph, ScheduleError, WageBaseLimit,
};
use crate::error::LookupError;
use crate::models::{FilingStatus, Jurisdiction, StateCode, TaxKind, TaxSide, TaxType};

/// Problems found while assembling a [`RateTables`] version.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateTableError {
    #[error("federal income tax regime is missing")]
    MissingFederal,

    #[error("federal income tax must be progressive, got {0}")]
    FederalNotProgressive(&'static str),

    #[error("{jurisdiction} has no {filing_status} schedule")]
    MissingSchedule {
        jurisdiction: String,
        filing_status: FilingStatus,
    },

    #[error("invalid schedule for {jurisdiction}: {source}")]
    Schedule {
        jurisdiction: String,
        #[source]
        source: ScheduleError,
    },

    #[error("{context} rate {rate} is outside [0, 1]")]
    InvalidRate { context: String, rate: Decimal },

    #[error("{context} must be non-negative, got {value}")]
    NegativeAmount { context: String, value: Decimal },

    #[error("additional medicare parameters are missing")]
    MissingAdditionalMedicare,

    #[error("additional medicare has no {0} threshold")]
    MissingMedicareThreshold(FilingStatus),

    #[error("{0} has wage-base limits but no income tax regime")]
    UnregisteredJurisdiction(String),

    #[error("reciprocity {work_state} -> {home_state} names {missing}, which has no income tax regime")]
    UnregisteredReciprocity {
        work_state: String,
        home_state: String,
        missing: String,
    },

    #[error("duplicate {side} {tax_type} limit for {jurisdiction}")]
    DuplicateWageBase {
        tax_type: TaxType,
        jurisdiction: String,
        side: TaxSide,
    },
}

/// A rate-table entry returned by [`RateTables::get_schedule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Schedule {
    /// The jurisdiction is known but levies no tax of the requested kind.
    NoTax,
    Income(IncomeTaxRegime),
    WageBase(Vec<WageBaseLimit>),
    Local(LocalTax),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateTables {
    tax_year: i32,
    version: u32,
    effective_from: NaiveDate,
    federal: IncomeTaxRegime,
    states: HashMap<StateCode, IncomeTaxRegime>,
    wage_bases: HashMap<(TaxType, Jurisdiction, TaxSide), WageBaseLimit>,
    additional_medicare: AdditionalMedicare,
    locals: HashMap<String, LocalTax>,
    reciprocity: ReciprocityGraph,
}

impl RateTables {
    pub fn builder(tax_year: i32) -> RateTablesBuilder {
        RateTablesBuilder::new(tax_year)
    }

    pub fn tax_year(&self) -> i32 {
        self.tax_year
    }

    /// Assigned by the store on install; 0 for tables never installed.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn effective_from(&self) -> NaiveDate {
        self.effective_from
    }

    pub(crate) fn with_version(
        mut self,
        version: u32,
    ) -> Self {
        self.version = version;
        self
    }

    pub fn federal(&self) -> &IncomeTaxRegime {
        &self.federal
    }

    pub fn is_known_state(
        &self,
        state: &StateCode,
    ) -> bool {
        self.states.contains_key(state)
    }

    pub fn state_regime(
        &self,
        state: &StateCode,
    ) -> Result<&IncomeTaxRegime, LookupError> {
        self.states
            .get(state)
            .ok_or_else(|| LookupError::UnknownJurisdiction(state.to_string()))
    }

    /// Income tax regime for the federal government or a state.
    pub fn income_regime(
        &self,
        jurisdiction: &Jurisdiction,
    ) -> Result<&IncomeTaxRegime, LookupError> {
        match jurisdiction {
            Jurisdiction::Federal => Ok(&self.federal),
            Jurisdiction::State(state) => self.state_regime(state),
            Jurisdiction::Local(code) => Err(LookupError::UnknownJurisdiction(code.clone())),
        }
    }

    /// `true` for the federal government, any state with a regime, and any
    /// local code in the tables.
    pub fn knows(
        &self,
        jurisdiction: &Jurisdiction,
    ) -> bool {
        match jurisdiction {
            Jurisdiction::Federal => true,
            Jurisdiction::State(state) => self.is_known_state(state),
            Jurisdiction::Local(code) => self.locals.contains_key(code),
        }
    }

    pub fn wage_base(
        &self,
        tax_type: TaxType,
        jurisdiction: &Jurisdiction,
        side: TaxSide,
    ) -> Option<&WageBaseLimit> {
        self.wage_bases
            .get(&(tax_type, jurisdiction.clone(), side))
    }

    /// All wage-base limits levied by `jurisdiction`, ordered by tax type
    /// then side.
    pub fn wage_bases_for(
        &self,
        jurisdiction: &Jurisdiction,
    ) -> Vec<&WageBaseLimit> {
        let mut limits: Vec<_> = self
            .wage_bases
            .values()
            .filter(|limit| &limit.jurisdiction == jurisdiction)
            .collect();
        limits.sort_by_key(|limit| (limit.tax_type, limit.side));
        limits
    }

    pub fn additional_medicare(&self) -> &AdditionalMedicare {
        &self.additional_medicare
    }

    /// Case-insensitive lookup of a local tax code.
    pub fn local(
        &self,
        code: &str,
    ) -> Option<&LocalTax> {
        self.locals.get(&code.trim().to_ascii_uppercase())
    }

    pub fn reciprocity(&self) -> &ReciprocityGraph {
        &self.reciprocity
    }

    /// States with an income regime, sorted.
    pub fn states(&self) -> Vec<&StateCode> {
        let mut states: Vec<_> = self.states.keys().collect();
        states.sort();
        states
    }

    /// Looks up the rate data of `kind` levied by `jurisdiction`.
    ///
    /// # Errors
    ///
    /// * [`LookupError::UnknownJurisdiction`] when the code is absent.
    /// * [`LookupError::UnsupportedTaxKind`] when the jurisdiction level
    ///   cannot carry `kind` (e.g. federal rates requested for a state).
    ///
    /// States without an income tax, and known jurisdictions without a
    /// levy of the requested kind, return [`Schedule::NoTax`].
    pub fn get_schedule(
        &self,
        jurisdiction: &Jurisdiction,
        kind: TaxKind,
    ) -> Result<Schedule, LookupError> {
        if !self.knows(jurisdiction) {
            return Err(LookupError::UnknownJurisdiction(jurisdiction.to_string()));
        }

        let unsupported = || LookupError::UnsupportedTaxKind {
            jurisdiction: jurisdiction.to_string(),
            kind,
        };

        match (kind, jurisdiction) {
            (TaxKind::Federal, Jurisdiction::Federal) | (TaxKind::State, Jurisdiction::State(_)) => {
                match self.income_regime(jurisdiction)? {
                    IncomeTaxRegime::NoTax => Ok(Schedule::NoTax),
                    regime => Ok(Schedule::Income(regime.clone())),
                }
            }
            (TaxKind::Local, Jurisdiction::Local(code)) => self
                .local(code)
                .cloned()
                .map(Schedule::Local)
                .ok_or_else(|| LookupError::UnknownJurisdiction(code.clone())),
            (TaxKind::Federal | TaxKind::State | TaxKind::Local, _) => Err(unsupported()),
            (_, Jurisdiction::Local(_)) => Err(unsupported()),
            (kind, jurisdiction) => {
                let limits: Vec<WageBaseLimit> = self
                    .wage_bases_for(jurisdiction)
                    .into_iter()
                    .filter(|limit| kind.wage_base_types().contains(&limit.tax_type))
                    .cloned()
                    .collect();
                if limits.is_empty() {
                    Ok(Schedule::NoTax)
                } else {
                    Ok(Schedule::WageBase(limits))
                }
            }
        }
    }
}

/// Assembles and validates a [`RateTables`] version.
#[derive(Debug, Clone)]
pub struct RateTablesBuilder {
    tax_year: i32,
    effective_from: Option<NaiveDate>,
    federal: Option<IncomeTaxRegime>,
    states: HashMap<StateCode, IncomeTaxRegime>,
    wage_bases: Vec<WageBaseLimit>,
    additional_medicare: Option<AdditionalMedicare>,
    locals: Vec<LocalTax>,
    reciprocity: ReciprocityGraph,
}

impl RateTablesBuilder {
    fn new(tax_year: i32) -> Self {
        Self {
            tax_year,
            effective_from: None,
            federal: None,
            states: HashMap::new(),
            wage_bases: Vec::new(),
            additional_medicare: None,
            locals: Vec::new(),
            reciprocity: ReciprocityGraph::new(),
        }
    }

    /// Defaults to January 1 of the tax year.
    pub fn effective_from(
        mut self,
        date: NaiveDate,
    ) -> Self {
        self.effective_from = Some(date);
        self
    }

    pub fn federal(
        mut self,
        regime: ProgressiveRegime,
    ) -> Self {
        self.federal = Some(IncomeTaxRegime::Progressive(regime));
        self
    }

    pub fn federal_regime(
        mut self,
        regime: IncomeTaxRegime,
    ) -> Self {
        self.federal = Some(regime);
        self
    }

    pub fn state(
        mut self,
        state: StateCode,
        regime: IncomeTaxRegime,
    ) -> Self {
        self.states.insert(state, regime);
        self
    }

    pub fn wage_base(
        mut self,
        limit: WageBaseLimit,
    ) -> Self {
        self.wage_bases.push(limit);
        self
    }

    pub fn additional_medicare(
        mut self,
        params: AdditionalMedicare,
    ) -> Self {
        self.additional_medicare = Some(params);
        self
    }

    pub fn local(
        mut self,
        tax: LocalTax,
    ) -> Self {
        self.locals.push(tax);
        self
    }

    pub fn reciprocity(
        mut self,
        work_state: StateCode,
        home_state: StateCode,
    ) -> Self {
        self.reciprocity.add_edge(work_state, home_state);
        self
    }

    /// Validates every table and freezes them into a [`RateTables`].
    ///
    /// # Errors
    ///
    /// Returns [`RateTableError`] when the federal regime or Additional
    /// Medicare parameters are missing, a progressive regime lacks a
    /// filing-status schedule, a rate lies outside [0, 1], an amount is
    /// negative, a wage-base limit is duplicated, or a wage-base limit or
    /// reciprocity edge names a state with no income regime.
    pub fn build(self) -> Result<RateTables, RateTableError> {
        let federal = self.federal.ok_or(RateTableError::MissingFederal)?;
        match &federal {
            IncomeTaxRegime::Progressive(regime) => {
                validate_progressive(Jurisdiction::FEDERAL_CODE, regime)?
            }
            other => return Err(RateTableError::FederalNotProgressive(other.name())),
        }

        for (state, regime) in &self.states {
            validate_regime(state.as_str(), regime)?;
        }

        let mut wage_bases = HashMap::with_capacity(self.wage_bases.len());
        for limit in self.wage_bases {
            let registered = match &limit.jurisdiction {
                Jurisdiction::Federal => true,
                Jurisdiction::State(state) => self.states.contains_key(state),
                Jurisdiction::Local(_) => false,
            };
            if !registered {
                return Err(RateTableError::UnregisteredJurisdiction(
                    limit.jurisdiction.to_string(),
                ));
            }
            let context = format!("{} {} {}", limit.jurisdiction, limit.tax_type, limit.side);
            check_rate(&context, limit.rate)?;
            if let Some(cap) = limit.annual_cap {
                check_non_negative(&format!("{context} cap"), cap)?;
            }

            let key = (limit.tax_type, limit.jurisdiction.clone(), limit.side);
            if wage_bases.contains_key(&key) {
                return Err(RateTableError::DuplicateWageBase {
                    tax_type: limit.tax_type,
                    jurisdiction: limit.jurisdiction.to_string(),
                    side: limit.side,
                });
            }
            wage_bases.insert(key, limit);
        }

        for (work, home) in self.reciprocity.edges() {
            if let Some(missing) = [work, home]
                .into_iter()
                .find(|state| !self.states.contains_key(*state))
            {
                return Err(RateTableError::UnregisteredReciprocity {
                    work_state: work.to_string(),
                    home_state: home.to_string(),
                    missing: missing.to_string(),
                });
            }
        }

        let additional_medicare = self
            .additional_medicare
            .ok_or(RateTableError::MissingAdditionalMedicare)?;
        check_rate("additional medicare", additional_medicare.rate)?;
        for status in FilingStatus::ALL {
            let threshold = additional_medicare
                .threshold(status)
                .ok_or(RateTableError::MissingMedicareThreshold(status))?;
            check_non_negative(&format!("additional medicare {status} threshold"), threshold)?;
        }

        let mut locals = HashMap::with_capacity(self.locals.len());
        for mut tax in self.locals {
            tax.code = tax.code.trim().to_ascii_uppercase();
            validate_local(&tax)?;
            locals.insert(tax.code.clone(), tax);
        }

        let effective_from = self
            .effective_from
            .or_else(|| NaiveDate::from_ymd_opt(self.tax_year, 1, 1))
            .unwrap_or_default();

        Ok(RateTables {
            tax_year: self.tax_year,
            version: 0,
            effective_from,
            federal,
            states: self.states,
            wage_bases,
            additional_medicare,
            locals,
            reciprocity: self.reciprocity,
        })
    }
}

fn validate_regime(
    jurisdiction: &str,
    regime: &IncomeTaxRegime,
) -> Result<(), RateTableError> {
    match regime {
        IncomeTaxRegime::NoTax => Ok(()),
        IncomeTaxRegime::Flat { rate } => check_rate(jurisdiction, *rate),
        IncomeTaxRegime::Progressive(progressive) => validate_progressive(jurisdiction, progressive),
    }
}

fn validate_progressive(
    jurisdiction: &str,
    regime: &ProgressiveRegime,
) -> Result<(), RateTableError> {
    for status in FilingStatus::ALL {
        if regime.schedule(status).is_none() {
            return Err(RateTableError::MissingSchedule {
                jurisdiction: jurisdiction.to_string(),
                filing_status: status,
            });
        }
    }
    for (status, amount) in regime.standard_deductions() {
        check_non_negative(
            &format!("{jurisdiction} {status} standard deduction"),
            *amount,
        )?;
    }
    Ok(())
}

fn validate_local(tax: &LocalTax) -> Result<(), RateTableError> {
    match &tax.formula {
        LocalFormula::Flat { rate } => check_rate(&tax.code, *rate),
        LocalFormula::Differential {
            resident_rate,
            nonresident_rate,
        } => {
            check_rate(&format!("{} resident", tax.code), *resident_rate)?;
            check_rate(&format!("{} nonresident", tax.code), *nonresident_rate)
        }
        // Bracket schedules validate themselves on construction.
        LocalFormula::Progressive { .. } => Ok(()),
        LocalFormula::Periodic { monthly_amount } => {
            check_non_negative(&format!("{} monthly amount", tax.code), *monthly_amount)
        }
    }
}

fn check_rate(
    context: &str,
    rate: Decimal,
) -> Result<(), RateTableError> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(RateTableError::InvalidRate {
            context: context.to_string(),
            rate,
        });
    }
    Ok(())
}

fn check_non_negative(
    context: &str,
    value: Decimal,
) -> Result<(), RateTableError> {
    if value < Decimal::ZERO {
        return Err(RateTableError::NegativeAmount {
            context: context.to_string(),
            value,
        });
    }
    Ok(())
}
