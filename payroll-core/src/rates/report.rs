//! Read-only view of everything one jurisdiction levies.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use super::{
    AdditionalMedicare, BracketSchedule, IncomeTaxRegime, LocalFormula, LocalTax, RateTables,
    WageBaseLimit,
};
use crate::error::LookupError;
use crate::models::{Jurisdiction, StateCode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JurisdictionRates {
    pub jurisdiction: Jurisdiction,
    pub tax_year: i32,
    pub version: u32,
    pub effective_from: NaiveDate,
    /// `None` for local jurisdictions.
    pub income_tax: Option<IncomeTaxRegime>,
    pub wage_bases: Vec<WageBaseLimit>,
    /// Federal only.
    pub additional_medicare: Option<AdditionalMedicare>,
    /// Local only.
    pub local: Option<LocalTax>,
    /// Home states whose residents this state does not tax.
    pub reciprocity: Vec<StateCode>,
}

impl RateTables {
    /// Collects every rate `jurisdiction` levies in this version.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::UnknownJurisdiction`] if the tables do not know
    /// `jurisdiction`.
    pub fn describe(
        &self,
        jurisdiction: &Jurisdiction,
    ) -> Result<JurisdictionRates, LookupError> {
        if !self.knows(jurisdiction) {
            return Err(LookupError::UnknownJurisdiction(jurisdiction.to_string()));
        }

        let income_tax = match jurisdiction {
            Jurisdiction::Local(_) => None,
            _ => Some(self.income_regime(jurisdiction)?.clone()),
        };
        let reciprocity = match jurisdiction {
            Jurisdiction::State(state) => {
                self.reciprocity().home_states(state).into_iter().cloned().collect()
            }
            _ => Vec::new(),
        };
        let local = match jurisdiction {
            Jurisdiction::Local(code) => self.local(code).cloned(),
            _ => None,
        };

        Ok(JurisdictionRates {
            jurisdiction: jurisdiction.clone(),
            tax_year: self.tax_year(),
            version: self.version(),
            effective_from: self.effective_from(),
            income_tax,
            wage_bases: self
                .wage_bases_for(jurisdiction)
                .into_iter()
                .cloned()
                .collect(),
            additional_medicare: matches!(jurisdiction, Jurisdiction::Federal)
                .then(|| self.additional_medicare().clone()),
            local,
            reciprocity,
        })
    }
}

fn percent(rate: Decimal) -> Decimal {
    (rate * Decimal::ONE_HUNDRED).normalize()
}

fn write_schedule(
    f: &mut fmt::Formatter<'_>,
    schedule: &BracketSchedule,
) -> fmt::Result {
    for bracket in schedule.brackets() {
        let upper = bracket
            .max_income
            .map_or_else(|| "and up".to_string(), |max| max.to_string());
        writeln!(
            f,
            "    {:>12} - {:<12} {:>8}%  base {}",
            bracket.min_income,
            upper,
            percent(bracket.tax_rate),
            bracket.base_tax
        )?;
    }
    Ok(())
}

impl fmt::Display for JurisdictionRates {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        writeln!(
            f,
            "{} tax year {} (tables v{}, effective {})",
            self.jurisdiction, self.tax_year, self.version, self.effective_from
        )?;

        match &self.income_tax {
            None => {}
            Some(IncomeTaxRegime::NoTax) => writeln!(f, "income tax: none")?,
            Some(IncomeTaxRegime::Flat { rate }) => {
                writeln!(f, "income tax: flat {}%", percent(*rate))?
            }
            Some(IncomeTaxRegime::Progressive(regime)) => {
                writeln!(f, "income tax: progressive")?;
                for (status, schedule) in regime.schedules() {
                    writeln!(
                        f,
                        "  {status} (standard deduction {})",
                        regime.standard_deduction(*status)
                    )?;
                    write_schedule(f, schedule)?;
                }
            }
        }

        if !self.wage_bases.is_empty() {
            writeln!(f, "wage bases:")?;
            for limit in &self.wage_bases {
                let cap = limit
                    .annual_cap
                    .map_or_else(|| "uncapped".to_string(), |cap| format!("cap {cap}"));
                writeln!(
                    f,
                    "  {:<16} {:<9} {:>8}%  {cap}",
                    limit.tax_type,
                    limit.side,
                    percent(limit.rate)
                )?;
            }
        }

        if let Some(medicare) = &self.additional_medicare {
            writeln!(f, "additional medicare: {}% over", percent(medicare.rate))?;
            for (status, threshold) in &medicare.thresholds {
                writeln!(f, "  {status} {threshold}")?;
            }
        }

        if let Some(local) = &self.local {
            write!(f, "local {} ({}): ", local.levy.as_str(), local.formula.name())?;
            match &local.formula {
                LocalFormula::Flat { rate } => writeln!(f, "{}%", percent(*rate))?,
                LocalFormula::Differential {
                    resident_rate,
                    nonresident_rate,
                } => writeln!(
                    f,
                    "resident {}%, nonresident {}%",
                    percent(*resident_rate),
                    percent(*nonresident_rate)
                )?,
                LocalFormula::Progressive {
                    schedule,
                    resident_only,
                } => {
                    writeln!(f, "{}", if *resident_only { "residents only" } else { "all workers" })?;
                    write_schedule(f, schedule)?;
                }
                LocalFormula::Periodic { monthly_amount } => {
                    writeln!(f, "{monthly_amount} per month")?
                }
            }
        }

        if !self.reciprocity.is_empty() {
            let homes: Vec<&str> = self.reciprocity.iter().map(StateCode::as_str).collect();
            writeln!(f, "reciprocity: does not tax residents of {}", homes.join(", "))?;
        }

        Ok(())
    }
}
