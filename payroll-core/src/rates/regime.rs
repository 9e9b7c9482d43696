use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::BracketSchedule;
use crate::models::{FilingStatus, Jurisdiction, TaxSide, TaxType};

/// How a jurisdiction taxes wage income.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "regime", rename_all = "snake_case")]
pub enum IncomeTaxRegime {
    /// No wage income tax (e.g. Texas).
    NoTax,
    /// A single rate on all annualized income, with no standard deduction.
    Flat { rate: Decimal },
    Progressive(ProgressiveRegime),
}

impl IncomeTaxRegime {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoTax => "none",
            Self::Flat { .. } => "flat",
            Self::Progressive(_) => "progressive",
        }
    }
}

/// Bracket schedules and standard deductions per filing status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressiveRegime {
    schedules: BTreeMap<FilingStatus, BracketSchedule>,
    standard_deductions: BTreeMap<FilingStatus, Decimal>,
}

impl ProgressiveRegime {
    pub fn new(
        schedules: BTreeMap<FilingStatus, BracketSchedule>,
        standard_deductions: BTreeMap<FilingStatus, Decimal>,
    ) -> Self {
        Self {
            schedules,
            standard_deductions,
        }
    }

    /// The same schedule and deduction for every filing status.
    pub fn uniform(
        schedule: BracketSchedule,
        standard_deduction: Decimal,
    ) -> Self {
        let schedules = FilingStatus::ALL
            .into_iter()
            .map(|status| (status, schedule.clone()))
            .collect();
        let standard_deductions = FilingStatus::ALL
            .into_iter()
            .map(|status| (status, standard_deduction))
            .collect();
        Self::new(schedules, standard_deductions)
    }

    pub fn schedule(
        &self,
        status: FilingStatus,
    ) -> Option<&BracketSchedule> {
        self.schedules.get(&status)
    }

    /// Zero when the jurisdiction defines no deduction for `status`.
    pub fn standard_deduction(
        &self,
        status: FilingStatus,
    ) -> Decimal {
        self.standard_deductions
            .get(&status)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn schedules(&self) -> impl Iterator<Item = (&FilingStatus, &BracketSchedule)> {
        self.schedules.iter()
    }

    pub fn standard_deductions(&self) -> impl Iterator<Item = (&FilingStatus, &Decimal)> {
        self.standard_deductions.iter()
    }
}

/// Rate and annual cap for one wage-base levy on one side of the paycheck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WageBaseLimit {
    pub tax_type: TaxType,
    pub jurisdiction: Jurisdiction,
    pub side: TaxSide,
    pub rate: Decimal,
    /// `None` means every dollar is taxable (e.g. base Medicare).
    pub annual_cap: Option<Decimal>,
}

/// Additional Medicare surtax on wages above a filing-status threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalMedicare {
    pub rate: Decimal,
    pub thresholds: BTreeMap<FilingStatus, Decimal>,
}

impl AdditionalMedicare {
    /// Threshold for `status`; `None` if the tables omit it.
    pub fn threshold(
        &self,
        status: FilingStatus,
    ) -> Option<Decimal> {
        self.thresholds.get(&status).copied()
    }
}
