//! City, county, school district and transit levies.

use rust_decimal::Decimal;
use tracing::debug;

use crate::calculations::brackets::periodic_tax;
use crate::calculations::common::round_half_up;
use crate::models::PayFrequency;
use crate::rates::{LocalFormula, RateTables};

const MONTHS_PER_YEAR: Decimal = Decimal::from_parts(12, 0, 0, false, 0);

#[derive(Debug, Clone, Copy)]
pub struct LocalTaxResolver<'a> {
    tables: &'a RateTables,
}

impl<'a> LocalTaxResolver<'a> {
    pub fn new(tables: &'a RateTables) -> Self {
        Self { tables }
    }

    /// Per-period local tax on `gross_pay`, rounded to cents.
    ///
    /// Local tax is opt-in per employer, so a code missing from the tables
    /// yields zero rather than an error.
    pub fn local_tax(
        &self,
        code: &str,
        gross_pay: Decimal,
        is_resident: bool,
        frequency: PayFrequency,
    ) -> Decimal {
        let Some(tax) = self.tables.local(code) else {
            debug!(code, "unknown local tax code; no local tax applied");
            return Decimal::ZERO;
        };

        let amount = match &tax.formula {
            LocalFormula::Flat { rate } => gross_pay * *rate,
            LocalFormula::Differential {
                resident_rate,
                nonresident_rate,
            } => {
                let rate = if is_resident {
                    resident_rate
                } else {
                    nonresident_rate
                };
                gross_pay * *rate
            }
            LocalFormula::Progressive {
                schedule,
                resident_only,
            } => {
                if *resident_only && !is_resident {
                    debug!(code = %tax.code, "resident-only local tax; nonresident owes nothing");
                    Decimal::ZERO
                } else {
                    periodic_tax(schedule, gross_pay, frequency)
                }
            }
            LocalFormula::Periodic { monthly_amount } => {
                *monthly_amount * MONTHS_PER_YEAR / frequency.periods()
            }
        };

        round_half_up(amount)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::rates::tables::fixtures::sample_tables;

    fn local(
        code: &str,
        gross: Decimal,
        is_resident: bool,
        frequency: PayFrequency,
    ) -> Decimal {
        let tables = sample_tables();
        LocalTaxResolver::new(&tables).local_tax(code, gross, is_resident, frequency)
    }

    #[test]
    fn flat_rate_applies_to_gross() {
        assert_eq!(
            local("OH-COL", dec!(2000), false, PayFrequency::Biweekly),
            dec!(50.00)
        );
    }

    #[test]
    fn differential_rate_depends_on_residency() {
        assert_eq!(
            local("PA-PHL", dec!(2000), true, PayFrequency::Biweekly),
            dec!(75.00)
        );
        assert_eq!(
            local("PA-PHL", dec!(2000), false, PayFrequency::Biweekly),
            dec!(68.80)
        );
    }

    #[test]
    fn progressive_local_reuses_annualized_brackets() {
        // 2000 × 26 = 52000 -> 1813.17 + 2000 × 0.03876 = 1890.69 / 26
        assert_eq!(
            local("NY-NYC", dec!(2000), true, PayFrequency::Biweekly),
            dec!(72.72)
        );
    }

    #[test]
    fn resident_only_progressive_skips_nonresidents() {
        assert_eq!(
            local("NY-NYC", dec!(2000), false, PayFrequency::Biweekly),
            Decimal::ZERO
        );
    }

    #[test]
    fn periodic_amount_is_prorated_from_monthly() {
        assert_eq!(
            local("CO-DEN", dec!(2000), false, PayFrequency::Monthly),
            dec!(5.75)
        );
        // 5.75 × 12 / 26 = 2.6538...
        assert_eq!(
            local("CO-DEN", dec!(2000), false, PayFrequency::Biweekly),
            dec!(2.65)
        );
        assert_eq!(
            local("CO-DEN", dec!(2000), false, PayFrequency::Semimonthly),
            dec!(2.88)
        );
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(
            local("oh-col", dec!(100), true, PayFrequency::Weekly),
            dec!(2.50)
        );
    }

    #[test]
    fn unknown_code_is_zero() {
        assert_eq!(
            local("ZZ-NOWHERE", dec!(2000), true, PayFrequency::Weekly),
            Decimal::ZERO
        );
    }
}
