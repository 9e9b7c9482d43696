//! Validated progressive rate schedules.
//!
//! A [`BracketSchedule`] can only be built from brackets that are
//! contiguous, ascending, start at zero, end in an open bracket, and whose
//! `base_tax` values agree (to the cent) with the tax accumulated by the
//! brackets below them. Call-time code trusts these invariants and never
//! re-derives a base tax.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculations::common::round_half_up;
use crate::models::TaxBracket;

/// Reasons a list of brackets cannot form a schedule.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("schedule has no brackets")]
    Empty,

    #[error("first bracket must start at 0, starts at {0}")]
    NonZeroStart(Decimal),

    #[error("bracket {index} starts at {actual}, expected {expected}")]
    NotContiguous {
        index: usize,
        expected: Decimal,
        actual: Decimal,
    },

    #[error("bracket {index} max {max} is not above its min {min}")]
    NotAscending {
        index: usize,
        min: Decimal,
        max: Decimal,
    },

    #[error("bracket {0} is open-ended but is not the last bracket")]
    OpenBeforeEnd(usize),

    #[error("last bracket must be open-ended")]
    ClosedFinalBracket,

    #[error("bracket {index} rate {rate} is outside [0, 1]")]
    InvalidRate { index: usize, rate: Decimal },

    #[error("bracket {index} base tax is {actual}, cumulative tax below it is {expected}")]
    InconsistentBaseTax {
        index: usize,
        expected: Decimal,
        actual: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TaxBracket>", into = "Vec<TaxBracket>")]
pub struct BracketSchedule {
    brackets: Vec<TaxBracket>,
}

impl BracketSchedule {
    pub fn new(brackets: Vec<TaxBracket>) -> Result<Self, ScheduleError> {
        let first = brackets.first().ok_or(ScheduleError::Empty)?;
        if first.min_income != Decimal::ZERO {
            return Err(ScheduleError::NonZeroStart(first.min_income));
        }
        if first.base_tax != Decimal::ZERO {
            return Err(ScheduleError::InconsistentBaseTax {
                index: 0,
                expected: Decimal::ZERO,
                actual: first.base_tax,
            });
        }

        let last_index = brackets.len() - 1;
        for (index, bracket) in brackets.iter().enumerate() {
            if bracket.tax_rate < Decimal::ZERO || bracket.tax_rate > Decimal::ONE {
                return Err(ScheduleError::InvalidRate {
                    index,
                    rate: bracket.tax_rate,
                });
            }

            let Some(max) = bracket.max_income else {
                if index != last_index {
                    return Err(ScheduleError::OpenBeforeEnd(index));
                }
                continue;
            };

            if max <= bracket.min_income {
                return Err(ScheduleError::NotAscending {
                    index,
                    min: bracket.min_income,
                    max,
                });
            }

            let Some(next) = brackets.get(index + 1) else {
                return Err(ScheduleError::ClosedFinalBracket);
            };
            if next.min_income != max {
                return Err(ScheduleError::NotContiguous {
                    index: index + 1,
                    expected: max,
                    actual: next.min_income,
                });
            }

            // Compared to the cent against the previous published base so
            // that schedules rounded per bracket do not accumulate drift.
            let expected = bracket.base_tax + (max - bracket.min_income) * bracket.tax_rate;
            if round_half_up(expected) != round_half_up(next.base_tax) {
                return Err(ScheduleError::InconsistentBaseTax {
                    index: index + 1,
                    expected,
                    actual: next.base_tax,
                });
            }
        }

        Ok(Self { brackets })
    }

    /// A one-bracket schedule taxing every dollar at `rate`.
    pub fn flat(rate: Decimal) -> Result<Self, ScheduleError> {
        Self::new(vec![TaxBracket {
            min_income: Decimal::ZERO,
            max_income: None,
            tax_rate: rate,
            base_tax: Decimal::ZERO,
        }])
    }

    pub fn brackets(&self) -> &[TaxBracket] {
        &self.brackets
    }

    /// The bracket whose range contains `taxable`, or `None` for
    /// non-positive amounts.
    ///
    /// Boundaries belong to the lower bracket; both brackets yield the same
    /// tax there because base taxes are consistent.
    pub fn bracket_for(
        &self,
        taxable: Decimal,
    ) -> Option<&TaxBracket> {
        if taxable <= Decimal::ZERO {
            return None;
        }
        let upper = self
            .brackets
            .partition_point(|bracket| bracket.min_income < taxable);
        upper.checked_sub(1).and_then(|index| self.brackets.get(index))
    }

    /// Unrounded annual tax on `taxable`.
    pub fn tax_on(
        &self,
        taxable: Decimal,
    ) -> Decimal {
        match self.bracket_for(taxable) {
            Some(bracket) => {
                bracket.base_tax + (taxable - bracket.min_income) * bracket.tax_rate
            }
            None => Decimal::ZERO,
        }
    }
}

impl TryFrom<Vec<TaxBracket>> for BracketSchedule {
    type Error = ScheduleError;

    fn try_from(brackets: Vec<TaxBracket>) -> Result<Self, Self::Error> {
        Self::new(brackets)
    }
}

impl From<BracketSchedule> for Vec<TaxBracket> {
    fn from(schedule: BracketSchedule) -> Self {
        schedule.brackets
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    fn bracket(
        min: Decimal,
        max: Option<Decimal>,
        rate: Decimal,
        base: Decimal,
    ) -> TaxBracket {
        TaxBracket {
            min_income: min,
            max_income: max,
            tax_rate: rate,
            base_tax: base,
        }
    }

    fn federal_single_2025() -> Vec<TaxBracket> {
        vec![
            bracket(dec!(0), Some(dec!(11925)), dec!(0.10), dec!(0)),
            bracket(dec!(11925), Some(dec!(48475)), dec!(0.12), dec!(1192.50)),
            bracket(dec!(48475), Some(dec!(103350)), dec!(0.22), dec!(5578.50)),
            bracket(dec!(103350), Some(dec!(197300)), dec!(0.24), dec!(17651.00)),
            bracket(dec!(197300), Some(dec!(250525)), dec!(0.32), dec!(40199.00)),
            bracket(dec!(250525), Some(dec!(626350)), dec!(0.35), dec!(57231.00)),
            bracket(dec!(626350), None, dec!(0.37), dec!(188769.75)),
        ]
    }

    // =========================================================================
    // construction
    // =========================================================================

    #[test]
    fn accepts_consistent_schedule() {
        let schedule = BracketSchedule::new(federal_single_2025()).unwrap();

        assert_eq!(schedule.brackets().len(), 7);
    }

    #[test]
    fn rejects_empty_schedule() {
        assert_eq!(BracketSchedule::new(vec![]), Err(ScheduleError::Empty));
    }

    #[test]
    fn rejects_non_zero_start() {
        let result = BracketSchedule::new(vec![bracket(dec!(100), None, dec!(0.1), dec!(0))]);

        assert_eq!(result, Err(ScheduleError::NonZeroStart(dec!(100))));
    }

    #[test]
    fn rejects_gap_between_brackets() {
        let mut brackets = federal_single_2025();
        brackets[2].min_income = dec!(48500);

        let result = BracketSchedule::new(brackets);

        assert_eq!(
            result,
            Err(ScheduleError::NotContiguous {
                index: 2,
                expected: dec!(48475),
                actual: dec!(48500),
            })
        );
    }

    #[test]
    fn rejects_closed_final_bracket() {
        let mut brackets = federal_single_2025();
        brackets[6].max_income = Some(dec!(1000000));

        assert_eq!(
            BracketSchedule::new(brackets),
            Err(ScheduleError::ClosedFinalBracket)
        );
    }

    #[test]
    fn rejects_open_bracket_in_the_middle() {
        let mut brackets = federal_single_2025();
        brackets[3].max_income = None;

        assert_eq!(
            BracketSchedule::new(brackets),
            Err(ScheduleError::OpenBeforeEnd(3))
        );
    }

    #[test]
    fn rejects_inconsistent_base_tax() {
        let mut brackets = federal_single_2025();
        brackets[1].base_tax = dec!(1200.00);

        let result = BracketSchedule::new(brackets);

        assert_eq!(
            result,
            Err(ScheduleError::InconsistentBaseTax {
                index: 1,
                expected: dec!(1192.50),
                actual: dec!(1200.00),
            })
        );
    }

    #[test]
    fn tolerates_base_tax_published_to_the_cent() {
        // 10 + 1 * 0.0125 = 10.0125, published as 10.01
        let brackets = vec![
            bracket(dec!(0), Some(dec!(1000)), dec!(0.01), dec!(0)),
            bracket(dec!(1000), Some(dec!(1001)), dec!(0.0125), dec!(10)),
            bracket(dec!(1001), None, dec!(0.02), dec!(10.01)),
        ];

        assert!(BracketSchedule::new(brackets).is_ok());
    }

    #[test]
    fn rejects_rate_above_one() {
        let result = BracketSchedule::flat(dec!(1.5));

        assert_eq!(
            result,
            Err(ScheduleError::InvalidRate {
                index: 0,
                rate: dec!(1.5),
            })
        );
    }

    // =========================================================================
    // tax_on
    // =========================================================================

    #[test]
    fn tax_on_zero_is_zero() {
        let schedule = BracketSchedule::new(federal_single_2025()).unwrap();

        assert_eq!(schedule.tax_on(dec!(0)), dec!(0));
        assert_eq!(schedule.tax_on(dec!(-500)), dec!(0));
    }

    #[test]
    fn tax_on_second_bracket() {
        let schedule = BracketSchedule::new(federal_single_2025()).unwrap();

        // 1192.50 + (30000 - 11925) * 0.12 = 3361.50
        assert_eq!(schedule.tax_on(dec!(30000)), dec!(3361.50));
    }

    #[test]
    fn tax_on_top_bracket() {
        let schedule = BracketSchedule::new(federal_single_2025()).unwrap();

        // 188769.75 + (700000 - 626350) * 0.37 = 216020.25
        assert_eq!(schedule.tax_on(dec!(700000)), dec!(216020.25));
    }

    #[test]
    fn tax_is_continuous_at_boundaries() {
        let schedule = BracketSchedule::new(federal_single_2025()).unwrap();

        for window in schedule.brackets().windows(2) {
            let boundary = window[1].min_income;
            assert_eq!(schedule.tax_on(boundary), window[1].base_tax);
        }
    }

    #[test]
    fn tax_is_non_decreasing_with_slope_equal_to_rate() {
        let schedule = BracketSchedule::new(federal_single_2025()).unwrap();
        let step = dec!(250);
        let mut income = dec!(0);
        let mut previous = schedule.tax_on(income);

        while income < dec!(800000) {
            let next_income = income + step;
            let next = schedule.tax_on(next_income);
            assert!(next >= previous, "tax decreased at {next_income}");

            // Inside a single bracket the increase is exactly step * rate.
            let lower = schedule.bracket_for(next_income).unwrap();
            if income >= lower.min_income {
                assert_eq!(next - previous, step * lower.tax_rate);
            }

            income = next_income;
            previous = next;
        }
    }
}
