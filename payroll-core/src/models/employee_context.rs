use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{FilingStatus, PayFrequency, TaxType};

/// Per-calculation input, owned by the caller.
///
/// Enumerated fields are carried as strings so that a malformed record can
/// still be submitted in a batch and rejected in its own result slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeTaxContext {
    pub tax_year: i32,
    pub gross_pay: Decimal,
    pub filing_status: String,
    pub pay_frequency: String,
    pub work_state: String,
    pub home_state: String,

    // Caller-supplied year-to-date wages
    #[serde(default)]
    pub ytd: YtdSnapshot,

    // Per-period deductions keyed by plan name
    #[serde(default)]
    pub pre_tax_deductions: BTreeMap<String, Decimal>,

    #[serde(default)]
    pub w4: W4Elections,

    #[serde(default)]
    pub local_code: Option<String>,
    #[serde(default)]
    pub is_local_resident: Option<bool>,

    // Multistate apportionment; `None` or empty for single-state employees
    #[serde(default)]
    pub work_locations: Option<Vec<WorkLocation>>,
}

impl EmployeeTaxContext {
    /// Builds a single-state context with no YTD history, deductions, or
    /// W-4 adjustments.
    pub fn new(
        tax_year: i32,
        gross_pay: Decimal,
        filing_status: FilingStatus,
        pay_frequency: PayFrequency,
        work_state: &str,
        home_state: &str,
    ) -> Self {
        Self {
            tax_year,
            gross_pay,
            filing_status: filing_status.name().to_string(),
            pay_frequency: pay_frequency.as_str().to_string(),
            work_state: work_state.to_string(),
            home_state: home_state.to_string(),
            ytd: YtdSnapshot::default(),
            pre_tax_deductions: BTreeMap::new(),
            w4: W4Elections::default(),
            local_code: None,
            is_local_resident: None,
            work_locations: None,
        }
    }

    pub fn is_multistate(&self) -> bool {
        self.work_locations
            .as_ref()
            .is_some_and(|locations| !locations.is_empty())
    }
}

/// Wages already paid this year that were subject to each levy.
///
/// Any per-tax figure left as `None` falls back to `gross`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YtdSnapshot {
    #[serde(default)]
    pub gross: Decimal,
    #[serde(default)]
    pub social_security: Option<Decimal>,
    #[serde(default)]
    pub medicare: Option<Decimal>,
    #[serde(default)]
    pub futa: Option<Decimal>,
    #[serde(default)]
    pub suta: Option<Decimal>,
    #[serde(default)]
    pub sdi: Option<Decimal>,
    #[serde(default)]
    pub pfml: Option<Decimal>,
}

impl YtdSnapshot {
    pub fn wages_for(
        &self,
        tax_type: TaxType,
    ) -> Decimal {
        let specific = match tax_type {
            TaxType::SocialSecurity => self.social_security,
            TaxType::Medicare => self.medicare,
            TaxType::Futa => self.futa,
            TaxType::Suta => self.suta,
            TaxType::Sdi => self.sdi,
            TaxType::Pfml => self.pfml,
        };
        specific.unwrap_or(self.gross)
    }

    /// Every populated figure with a label, for input validation.
    pub(crate) fn labelled(&self) -> Vec<(&'static str, Decimal)> {
        let mut figures = vec![("ytd.gross", self.gross)];
        let optional = [
            ("ytd.social_security", self.social_security),
            ("ytd.medicare", self.medicare),
            ("ytd.futa", self.futa),
            ("ytd.suta", self.suta),
            ("ytd.sdi", self.sdi),
            ("ytd.pfml", self.pfml),
        ];
        figures.extend(
            optional
                .into_iter()
                .filter_map(|(label, value)| value.map(|v| (label, v))),
        );
        figures
    }
}

/// Form W-4 elections that adjust federal withholding.
///
/// `other_income`, `deductions`, and `dependents_credit` are annual figures
/// (steps 4a, 4b and 3); `additional_withholding` is per pay period
/// (step 4c).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct W4Elections {
    #[serde(default)]
    pub additional_withholding: Decimal,
    #[serde(default)]
    pub other_income: Decimal,
    #[serde(default)]
    pub deductions: Decimal,
    #[serde(default)]
    pub dependents_credit: Decimal,
    #[serde(default)]
    pub exempt: bool,
}

/// A share of earnings attributed to a work state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkLocation {
    pub state: String,
    pub earnings_percent: Decimal,
}

/// Pre-tax plan names whose deductions also reduce FICA, unemployment and
/// disability wages (IRC Section 125 cafeteria plans and similar).
const CAFETERIA_PLANS: &[&str] = &[
    "section_125",
    "health",
    "dental",
    "vision",
    "fsa",
    "hsa",
    "dependent_care",
    "commuter",
];

/// Returns `true` if a deduction under `plan` reduces payroll-tax wages in
/// addition to income-tax wages. Retirement deferrals such as `401k` only
/// reduce income-tax wages.
pub fn reduces_payroll_wages(plan: &str) -> bool {
    let normalised = plan.trim().to_ascii_lowercase();
    CAFETERIA_PLANS.contains(&normalised.as_str())
}
