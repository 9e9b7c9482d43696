//! Income tax withholding against a progressive or flat regime.
//!
//! Withholding follows the annualized method:
//!
//! | Step | Description |
//! |------|-------------|
//! | 1    | Annualize the per-period taxable wages |
//! | 2    | Subtract the standard deduction for the filing status (floor 0) |
//! | 3    | Apply the bracket schedule: `base_tax + (taxable - min) × rate` |
//! | 4    | De-annualize the annual tax |
//! | 5    | Add any flat per-period extra withholding (floor 0) |
//!
//! Flat regimes skip steps 2 and 3 and multiply by the single rate.
//!
//! # Example
//!
//! ```
//! use payroll_core::calculations::{BracketResolver, WithholdingAdjustments};
//! use payroll_core::rates::{BracketSchedule, IncomeTaxRegime, ProgressiveRegime};
//! use payroll_core::{FilingStatus, Jurisdiction, PayFrequency, TaxBracket};
//! use rust_decimal_macros::dec;
//!
//! let schedule = BracketSchedule::new(vec![
//!     TaxBracket { min_income: dec!(0), max_income: Some(dec!(11925)), tax_rate: dec!(0.10), base_tax: dec!(0) },
//!     TaxBracket { min_income: dec!(11925), max_income: None, tax_rate: dec!(0.12), base_tax: dec!(1192.50) },
//! ])
//! .unwrap();
//! let regime = IncomeTaxRegime::Progressive(ProgressiveRegime::uniform(schedule, dec!(15000)));
//!
//! let resolver = BracketResolver::new(&Jurisdiction::Federal, &regime);
//! let tax = resolver
//!     .withholding(
//!         dec!(2000),
//!         FilingStatus::Single,
//!         PayFrequency::Biweekly,
//!         &WithholdingAdjustments::default(),
//!     )
//!     .unwrap();
//!
//! // (52000 - 15000) -> 1192.50 + 25075 × 0.12 = 4201.50 / 26
//! assert_eq!(tax, dec!(161.60));
//! ```

use rust_decimal::Decimal;

use crate::calculations::common::{max, round_half_up};
use crate::error::{LookupError, UnsupportedConfiguration};
use crate::models::{FilingStatus, Jurisdiction, PayFrequency, W4Elections};
use crate::rates::{BracketSchedule, IncomeTaxRegime};

/// Parses a pay frequency, rejecting anything outside the four supported
/// schedules.
pub fn resolve_frequency(value: &str) -> Result<PayFrequency, UnsupportedConfiguration> {
    PayFrequency::parse(value)
        .ok_or_else(|| UnsupportedConfiguration::UnsupportedFrequency(value.to_string()))
}

/// Per-period amount scaled to a full year.
pub fn annualize(
    per_period: Decimal,
    frequency: PayFrequency,
) -> Decimal {
    per_period * frequency.periods()
}

/// Annual amount scaled to one pay period. Unrounded.
pub fn deannualize(
    annual: Decimal,
    frequency: PayFrequency,
) -> Decimal {
    annual / frequency.periods()
}

/// Unrounded per-period tax on `per_period` wages under a bare schedule,
/// with no standard deduction.
pub fn periodic_tax(
    schedule: &BracketSchedule,
    per_period: Decimal,
    frequency: PayFrequency,
) -> Decimal {
    deannualize(schedule.tax_on(annualize(per_period, frequency)), frequency)
}

/// Employee elections that move withholding away from the table result.
///
/// Annual figures are applied around the bracket lookup; the extra amount
/// is added per period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WithholdingAdjustments {
    pub other_income: Decimal,
    pub deductions: Decimal,
    pub credits: Decimal,
    pub extra_per_period: Decimal,
    pub exempt: bool,
}

impl From<&W4Elections> for WithholdingAdjustments {
    fn from(w4: &W4Elections) -> Self {
        Self {
            other_income: w4.other_income,
            deductions: w4.deductions,
            credits: w4.dependents_credit,
            extra_per_period: w4.additional_withholding,
            exempt: w4.exempt,
        }
    }
}

/// Applies one jurisdiction's income tax regime to per-period wages.
#[derive(Debug, Clone, Copy)]
pub struct BracketResolver<'a> {
    jurisdiction: &'a Jurisdiction,
    regime: &'a IncomeTaxRegime,
}

impl<'a> BracketResolver<'a> {
    pub fn new(
        jurisdiction: &'a Jurisdiction,
        regime: &'a IncomeTaxRegime,
    ) -> Self {
        Self {
            jurisdiction,
            regime,
        }
    }

    /// Unrounded annual tax on `annual_income` after the standard deduction
    /// and `extra_deductions`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::MissingSchedule`] if a progressive regime has
    /// no schedule for `status`.
    pub fn annual_tax(
        &self,
        annual_income: Decimal,
        status: FilingStatus,
        extra_deductions: Decimal,
    ) -> Result<Decimal, LookupError> {
        match self.regime {
            IncomeTaxRegime::NoTax => Ok(Decimal::ZERO),
            IncomeTaxRegime::Flat { rate } => {
                Ok(max(annual_income - extra_deductions, Decimal::ZERO) * *rate)
            }
            IncomeTaxRegime::Progressive(regime) => {
                let schedule =
                    regime
                        .schedule(status)
                        .ok_or_else(|| LookupError::MissingSchedule {
                            jurisdiction: self.jurisdiction.to_string(),
                            filing_status: status,
                        })?;
                let taxable = max(
                    annual_income - regime.standard_deduction(status) - extra_deductions,
                    Decimal::ZERO,
                );
                Ok(schedule.tax_on(taxable))
            }
        }
    }

    /// Per-period withholding on `per_period_taxable`, rounded to cents.
    ///
    /// # Errors
    ///
    /// See [`Self::annual_tax`].
    pub fn withholding(
        &self,
        per_period_taxable: Decimal,
        status: FilingStatus,
        frequency: PayFrequency,
        adjustments: &WithholdingAdjustments,
    ) -> Result<Decimal, LookupError> {
        if adjustments.exempt {
            return Ok(Decimal::ZERO);
        }

        let annual_income = annualize(per_period_taxable, frequency) + adjustments.other_income;
        let annual_tax = self.annual_tax(annual_income, status, adjustments.deductions)?;
        let after_credits = max(annual_tax - adjustments.credits, Decimal::ZERO);

        let per_period = deannualize(after_credits, frequency) + adjustments.extra_per_period;
        Ok(round_half_up(max(per_period, Decimal::ZERO)))
    }
}
