//! Capped payroll levies and the Additional Medicare surtax.
//!
//! Every function here is pure: year-to-date wages come from the caller and
//! nothing is accumulated between calls.

use rust_decimal::Decimal;
use tracing::debug;

use crate::calculations::common::{max, round_half_up};
use crate::error::LookupError;
use crate::models::{FilingStatus, Jurisdiction, TaxSide, TaxType};
use crate::rates::{RateTables, WageBaseLimit};

/// Wages and tax for one levy on one side of one paycheck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WageBaseAssessment {
    pub taxable_wages: Decimal,
    pub amount: Decimal,
}

/// Portion of `gross_pay` still under the annual cap of `limit` given
/// `ytd_wages` already subject to it.
pub fn taxable_wages(
    limit: &WageBaseLimit,
    gross_pay: Decimal,
    ytd_wages: Decimal,
) -> Decimal {
    match limit.annual_cap {
        Some(cap) => {
            let remaining = max(cap - ytd_wages, Decimal::ZERO);
            gross_pay.min(remaining)
        }
        None => gross_pay,
    }
}

/// Applies the wage-base limits of one rate-table version.
#[derive(Debug, Clone, Copy)]
pub struct WageBaseAccumulator<'a> {
    tables: &'a RateTables,
}

impl<'a> WageBaseAccumulator<'a> {
    pub fn new(tables: &'a RateTables) -> Self {
        Self { tables }
    }

    /// Capped wages and rounded tax, or `None` when `jurisdiction` levies no
    /// `tax_type` on `side`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::UnknownJurisdiction`] when the tables do not
    /// know `jurisdiction` at all.
    pub fn assess(
        &self,
        tax_type: TaxType,
        jurisdiction: &Jurisdiction,
        side: TaxSide,
        gross_pay: Decimal,
        ytd_wages: Decimal,
    ) -> Result<Option<WageBaseAssessment>, LookupError> {
        if !self.tables.knows(jurisdiction) {
            return Err(LookupError::UnknownJurisdiction(jurisdiction.to_string()));
        }
        let Some(limit) = self.tables.wage_base(tax_type, jurisdiction, side) else {
            return Ok(None);
        };

        let taxable = taxable_wages(limit, gross_pay, ytd_wages);
        if taxable < gross_pay {
            debug!(
                tax_type = %tax_type,
                jurisdiction = %jurisdiction,
                side = %side,
                ytd_wages = %ytd_wages,
                taxable = %taxable,
                "wage base cap reached"
            );
        }

        Ok(Some(WageBaseAssessment {
            taxable_wages: taxable,
            amount: round_half_up(taxable * limit.rate),
        }))
    }

    /// Rounded tax on the capped wages; zero when no limit exists.
    ///
    /// # Errors
    ///
    /// See [`Self::assess`].
    pub fn taxable_amount(
        &self,
        tax_type: TaxType,
        jurisdiction: &Jurisdiction,
        side: TaxSide,
        gross_pay: Decimal,
        ytd_wages: Decimal,
    ) -> Result<Decimal, LookupError> {
        Ok(self
            .assess(tax_type, jurisdiction, side, gross_pay, ytd_wages)?
            .map_or(Decimal::ZERO, |assessment| assessment.amount))
    }

    /// Employee-side surtax on the part of this paycheck that pushes
    /// year-to-date Medicare wages past the filing-status threshold.
    pub fn additional_medicare(
        &self,
        status: FilingStatus,
        gross_pay: Decimal,
        ytd_wages: Decimal,
    ) -> Decimal {
        let params = self.tables.additional_medicare();
        let Some(threshold) = params.threshold(status) else {
            return Decimal::ZERO;
        };

        let excess = max(
            gross_pay.min(ytd_wages + gross_pay - threshold),
            Decimal::ZERO,
        );
        round_half_up(excess * params.rate)
    }
}
