use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Jurisdiction, StateCode, TaxType};

/// The levy a [`TaxLine`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxLineKind {
    FederalIncome,
    StateIncome,
    Local,
    SocialSecurity,
    /// Base Medicare plus any Additional Medicare surtax.
    Medicare,
    Futa,
    Suta,
    Sdi,
    Pfml,
}

impl TaxLineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FederalIncome => "federal_income",
            Self::StateIncome => "state_income",
            Self::Local => "local",
            Self::SocialSecurity => "social_security",
            Self::Medicare => "medicare",
            Self::Futa => "futa",
            Self::Suta => "suta",
            Self::Sdi => "sdi",
            Self::Pfml => "pfml",
        }
    }
}

impl From<TaxType> for TaxLineKind {
    fn from(tax_type: TaxType) -> Self {
        match tax_type {
            TaxType::SocialSecurity => Self::SocialSecurity,
            TaxType::Medicare => Self::Medicare,
            TaxType::Futa => Self::Futa,
            TaxType::Suta => Self::Suta,
            TaxType::Sdi => Self::Sdi,
            TaxType::Pfml => Self::Pfml,
        }
    }
}

/// A single levy assessed on one side of a paycheck, rounded to cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLine {
    pub kind: TaxLineKind,
    pub jurisdiction: Jurisdiction,
    pub taxable_wages: Decimal,
    pub amount: Decimal,
}

/// How one slice of earnings was routed and taxed at the state level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAllocation {
    /// State where the earnings were performed.
    pub location: StateCode,
    /// State that taxes them after reciprocity.
    pub taxed_by: StateCode,
    pub reciprocity_applied: bool,
    pub earnings_percent: Decimal,
    pub taxable_wages: Decimal,
    pub tax: Decimal,
}

/// Gross-to-net outcome of one calculation. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub calculation_id: Uuid,
    pub calculated_at: DateTime<Utc>,
    pub tax_year: i32,
    pub rate_table_version: u32,

    pub gross_pay: Decimal,
    pub pre_tax_deductions: Decimal,
    /// Wages subject to federal and state income tax.
    pub income_taxable_wages: Decimal,
    /// Wages subject to FICA, unemployment and disability levies.
    pub payroll_taxable_wages: Decimal,

    pub employee_taxes: Vec<TaxLine>,
    pub employer_taxes: Vec<TaxLine>,
    pub state_allocations: Vec<StateAllocation>,

    pub total_state_tax: Decimal,
    pub total_employee_tax: Decimal,
    pub total_employer_tax: Decimal,
    pub net_pay: Decimal,
    /// `total_employee_tax / gross_pay`, four decimal places.
    pub effective_rate: Decimal,
}

impl CalculationResult {
    /// Sum of employee lines of `kind`.
    pub fn employee_amount(
        &self,
        kind: TaxLineKind,
    ) -> Decimal {
        sum_of(&self.employee_taxes, kind)
    }

    /// Sum of employer lines of `kind`.
    pub fn employer_amount(
        &self,
        kind: TaxLineKind,
    ) -> Decimal {
        sum_of(&self.employer_taxes, kind)
    }

    pub fn employee_line(
        &self,
        kind: TaxLineKind,
    ) -> Option<&TaxLine> {
        self.employee_taxes.iter().find(|line| line.kind == kind)
    }

    pub fn employer_line(
        &self,
        kind: TaxLineKind,
    ) -> Option<&TaxLine> {
        self.employer_taxes.iter().find(|line| line.kind == kind)
    }
}

fn sum_of(
    lines: &[TaxLine],
    kind: TaxLineKind,
) -> Decimal {
    lines
        .iter()
        .filter(|line| line.kind == kind)
        .map(|line| line.amount)
        .sum()
}
