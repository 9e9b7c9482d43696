//! Decides which state taxes each slice of earnings.

use rust_decimal::Decimal;
use tracing::debug;

use crate::calculations::common::round_half_up;
use crate::models::{StateAllocation, StateCode};
use crate::rates::ReciprocityGraph;

/// Where a slice of earnings was performed and who taxes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRouting {
    pub location: StateCode,
    pub taxed_by: StateCode,
    pub reciprocity_applied: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct JurisdictionResolver<'a> {
    reciprocity: &'a ReciprocityGraph,
}

impl<'a> JurisdictionResolver<'a> {
    pub fn new(reciprocity: &'a ReciprocityGraph) -> Self {
        Self { reciprocity }
    }

    /// The work state taxes unless it has a reciprocity agreement covering
    /// residents of `home`, in which case the home state does.
    pub fn resolve(
        &self,
        work: &StateCode,
        home: &StateCode,
    ) -> StateRouting {
        let reciprocity_applied = work != home && self.reciprocity.exempts(work, home);
        let taxed_by = if reciprocity_applied { home } else { work };

        debug!(
            work_state = %work,
            home_state = %home,
            taxed_by = %taxed_by,
            reciprocity_applied,
            "resolved state routing"
        );

        StateRouting {
            location: work.clone(),
            taxed_by: taxed_by.clone(),
            reciprocity_applied,
        }
    }

    /// Routes the whole of `taxable` through [`Self::resolve`] and taxes it.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `tax`.
    pub fn single<E>(
        &self,
        taxable: Decimal,
        work: &StateCode,
        home: &StateCode,
        mut tax: impl FnMut(&StateCode, Decimal) -> Result<Decimal, E>,
    ) -> Result<StateAllocation, E> {
        let routing = self.resolve(work, home);
        let amount = round_half_up(tax(&routing.taxed_by, taxable)?);
        Ok(allocation(routing, Decimal::ONE_HUNDRED, taxable, amount))
    }

    /// Splits `taxable` across `locations` by earnings percent, routes each
    /// slice with that location as the work state, and taxes it.
    ///
    /// Percentages are taken as given; they are not required to sum to 100.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `tax`.
    pub fn apportion<E>(
        &self,
        taxable: Decimal,
        locations: &[(StateCode, Decimal)],
        home: &StateCode,
        mut tax: impl FnMut(&StateCode, Decimal) -> Result<Decimal, E>,
    ) -> Result<Vec<StateAllocation>, E> {
        locations
            .iter()
            .map(|(location, percent)| {
                let slice = round_half_up(taxable * *percent / Decimal::ONE_HUNDRED);
                let routing = self.resolve(location, home);
                let amount = round_half_up(tax(&routing.taxed_by, slice)?);
                Ok(allocation(routing, *percent, slice, amount))
            })
            .collect()
    }
}

/// Sum of the (already rounded) tax across allocations.
pub fn aggregate(allocations: &[StateAllocation]) -> Decimal {
    allocations.iter().map(|allocation| allocation.tax).sum()
}

fn allocation(
    routing: StateRouting,
    earnings_percent: Decimal,
    taxable_wages: Decimal,
    tax: Decimal,
) -> StateAllocation {
    StateAllocation {
        location: routing.location,
        taxed_by: routing.taxed_by,
        reciprocity_applied: routing.reciprocity_applied,
        earnings_percent,
        taxable_wages,
        tax,
    }
}
